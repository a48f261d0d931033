//! capm: CAPM, correlation, Sharpe and max-Sharpe portfolio figures from daily closes.
//!
//! Usage:
//!   capm returns --tickers AAPL MSFT
//!   capm beta --tickers AAPL MSFT GOOGL --years 3
//!   capm beta --ticker AAPL --benchmark QQQ
//!   capm correlation --tickers AAPL MSFT --period 6mo
//!   capm sharpe --ticker AAPL --risk-free 0.045
//!   capm optimize --tickers AAPL MSFT GOOGL --csv-dir ./prices

use analysis_orchestrator::{AnalysisConfig, AnalysisOrchestrator, CsvPriceLoader};
use anyhow::{anyhow, bail, Context};
use capm_core::{Lookback, PriceLoader};
use chrono::{NaiveDate, Utc};
use polygon_client::PolygonClient;
use serde_json::json;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Returns,
    Beta,
    Correlation,
    Sharpe,
    Optimize,
}

impl Command {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "returns" => Some(Command::Returns),
            "beta" => Some(Command::Beta),
            "correlation" | "corr" => Some(Command::Correlation),
            "sharpe" => Some(Command::Sharpe),
            "optimize" => Some(Command::Optimize),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct CliArgs {
    command: Command,
    tickers: Vec<String>,
    /// Tickers came from `--ticker`, asking for one report per ticker.
    per_ticker: bool,
    lookback: Lookback,
    benchmark: Option<String>,
    risk_free: Option<f64>,
    csv_dir: Option<String>,
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

fn flag_values(args: &[String], flag: &str) -> Vec<String> {
    match args.iter().position(|a| a == flag) {
        Some(idx) => args[idx + 1..]
            .iter()
            .take_while(|a| !a.starts_with("--"))
            .cloned()
            .collect(),
        None => Vec::new(),
    }
}

fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("invalid date {:?}", raw))
}

fn parse_args(args: &[String]) -> anyhow::Result<CliArgs> {
    let name = args.get(1).ok_or_else(|| anyhow!("missing command"))?;
    let command = Command::parse(name).ok_or_else(|| anyhow!("unknown command {:?}", name))?;

    let mut tickers = flag_values(args, "--tickers");
    let single = flag_values(args, "--ticker");
    let per_ticker = tickers.is_empty() && !single.is_empty();
    tickers.extend(single);
    if tickers.is_empty() {
        bail!("no tickers given (use --tickers A B ... or --ticker A)");
    }

    let lookback = match (flag_value(args, "--start"), flag_value(args, "--end")) {
        (Some(start), Some(end)) => Lookback::Range {
            start: parse_date(start)?,
            end: parse_date(end)?,
        },
        (Some(_), None) | (None, Some(_)) => bail!("--start and --end must be given together"),
        (None, None) => match flag_value(args, "--period") {
            Some(period) => Lookback::Trailing(period.parse()?),
            None => {
                let years = match flag_value(args, "--years") {
                    Some(v) => v.parse().with_context(|| format!("invalid --years {:?}", v))?,
                    None => 1,
                };
                Lookback::Years(years)
            }
        },
    };

    let risk_free = match flag_value(args, "--risk-free") {
        Some(v) => Some(v.parse().with_context(|| format!("invalid --risk-free {:?}", v))?),
        None => None,
    };

    Ok(CliArgs {
        command,
        tickers,
        per_ticker,
        lookback,
        benchmark: flag_value(args, "--benchmark").map(str::to_string),
        risk_free,
        csv_dir: flag_value(args, "--csv-dir").map(str::to_string),
    })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  capm returns --tickers A B ...       Aligned, normalized and daily return tables");
    eprintln!("  capm beta --tickers A B ...          Beta, alpha and CAPM expected return");
    eprintln!("  capm beta --ticker A                 Regression of one ticker on the benchmark");
    eprintln!("  capm correlation --tickers A B ...   Correlation of daily returns");
    eprintln!("  capm sharpe --ticker A               Annualized Sharpe ratio");
    eprintln!("  capm optimize --tickers A B ...      Long-only max-Sharpe weights");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --years N              Lookback in years (default: 1)");
    eprintln!("  --period P             Trailing period such as 30d, 2wk, 6mo, 5y");
    eprintln!("  --start D --end D      Explicit date range (YYYY-MM-DD)");
    eprintln!("  --benchmark T          Market proxy (default: $BENCHMARK_TICKER or SPY)");
    eprintln!("  --risk-free R          Risk-free rate as a fraction for CAPM and Sharpe");
    eprintln!("                         (default: 0 for CAPM, 0.03 for Sharpe)");
    eprintln!("  --csv-dir DIR          Read <DIR>/<TICKER>.csv instead of Polygon");
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "capm=info,analysis_orchestrator=info,polygon_client=warn".into());

    // stdout carries the JSON result, so logs go to stderr.
    if json_logging {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run<L: PriceLoader>(
    orchestrator: AnalysisOrchestrator<L>,
    cli: &CliArgs,
    today: NaiveDate,
) -> anyhow::Result<serde_json::Value> {
    let lookback = &cli.lookback;
    let output = match cli.command {
        Command::Returns => {
            let report = orchestrator.capm_report(&cli.tickers, lookback, today).await?;
            json!({
                "benchmark": report.benchmark,
                "prices": report.prices,
                "normalized": report.normalized,
                "returns": report.returns,
            })
        }
        Command::Beta if cli.per_ticker => {
            let mut reports = Vec::with_capacity(cli.tickers.len());
            for ticker in &cli.tickers {
                reports.push(orchestrator.beta_report(ticker, lookback, today).await?);
            }
            if reports.len() == 1 {
                serde_json::to_value(&reports[0])?
            } else {
                serde_json::to_value(&reports)?
            }
        }
        Command::Beta => {
            let report = orchestrator.capm_report(&cli.tickers, lookback, today).await?;
            json!({
                "benchmark": report.benchmark,
                "market_return": report.market_return,
                "risk_free_rate": report.risk_free_rate,
                "estimates": report.estimates,
            })
        }
        Command::Correlation => {
            serde_json::to_value(orchestrator.correlation(&cli.tickers, lookback, today).await?)?
        }
        Command::Sharpe => {
            let mut reports = Vec::with_capacity(cli.tickers.len());
            for ticker in &cli.tickers {
                reports.push(orchestrator.sharpe(ticker, lookback, today).await?);
            }
            if reports.len() == 1 {
                serde_json::to_value(&reports[0])?
            } else {
                serde_json::to_value(&reports)?
            }
        }
        Command::Optimize => {
            serde_json::to_value(orchestrator.optimize(&cli.tickers, lookback, today).await?)?
        }
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("error: {:#}", e);
            eprintln!();
            print_usage();
            std::process::exit(2);
        }
    };

    let mut config = AnalysisConfig::from_env();
    if let Some(benchmark) = &cli.benchmark {
        config.benchmark = benchmark.clone();
    }
    if let Some(rate) = cli.risk_free {
        config = config.with_risk_free_rate(rate);
    }

    let today = Utc::now().date_naive();
    tracing::info!(
        "capm {:?}: tickers={:?}, lookback={}, benchmark={}, risk_free={}, capm_risk_free={}",
        cli.command,
        cli.tickers,
        cli.lookback,
        config.benchmark,
        config.risk_free_rate,
        config.capm_risk_free_rate,
    );

    let output = match &cli.csv_dir {
        Some(dir) => {
            let loader = CsvPriceLoader::new(dir);
            run(AnalysisOrchestrator::new(loader, &config), &cli, today).await?
        }
        None => {
            let loader = PolygonClient::from_env()
                .context("POLYGON_API_KEY must be set (or pass --csv-dir)")?;
            run(AnalysisOrchestrator::new(loader, &config), &cli, today).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        std::iter::once("capm")
            .chain(line.split_whitespace())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_parse_tickers_and_defaults() {
        let cli = parse_args(&args("beta --tickers AAPL MSFT --benchmark QQQ")).unwrap();
        assert_eq!(cli.command, Command::Beta);
        assert_eq!(cli.tickers, vec!["AAPL", "MSFT"]);
        assert!(!cli.per_ticker);
        assert_eq!(cli.lookback, Lookback::Years(1));
        assert_eq!(cli.benchmark.as_deref(), Some("QQQ"));
        assert!(cli.risk_free.is_none());
        assert!(cli.csv_dir.is_none());
    }

    #[test]
    fn test_single_ticker_flag_requests_per_ticker_reports() {
        let cli = parse_args(&args("beta --ticker AAPL")).unwrap();
        assert_eq!(cli.command, Command::Beta);
        assert_eq!(cli.tickers, vec!["AAPL"]);
        assert!(cli.per_ticker);
    }

    #[test]
    fn test_parse_lookback_variants() {
        let cli = parse_args(&args("sharpe --ticker AAPL --period 6mo --risk-free 0.045")).unwrap();
        assert_eq!(cli.lookback.to_string(), "6mo");
        assert_eq!(cli.risk_free, Some(0.045));

        let cli = parse_args(&args("optimize --tickers A B --years 3 --csv-dir data")).unwrap();
        assert_eq!(cli.lookback, Lookback::Years(3));
        assert_eq!(cli.csv_dir.as_deref(), Some("data"));

        let line = "correlation --tickers A B --start 2023-01-01 --end 2023-12-31";
        let cli = parse_args(&args(line)).unwrap();
        assert_eq!(cli.lookback.to_string(), "2023-01-01..2023-12-31");
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args("")).is_err());
        assert!(parse_args(&args("frontier --tickers A")).is_err());
        assert!(parse_args(&args("beta")).is_err());
        assert!(parse_args(&args("beta --tickers A --period 7x")).is_err());
        assert!(parse_args(&args("beta --tickers A --start 2023-01-01")).is_err());
    }
}
