//! One call per user computation: fetch prices, align them, and run the
//! requested statistic, tagging any failure with the step that raised it.

pub mod config;
pub mod csv_loader;
pub mod error;

pub use config::{AnalysisConfig, DEFAULT_BENCHMARK};
pub use csv_loader::CsvPriceLoader;
pub use error::{AnalysisStep, StepError};

use capm_core::{
    AlignedPriceTable, BetaAlpha, CapmError, CapmEstimate, CorrelationMatrix, Lookback,
    NormalizedTable, PortfolioAllocation, PriceLoader, PriceSeries, ReturnTable, SharpeReport,
};
use chrono::NaiveDate;
use portfolio_optimizer::PortfolioOptimizer;
use quant_analysis::QuantAnalysisEngine;
use serde::Serialize;
use std::collections::HashSet;

use error::StepContext;

/// Aligned prices, their normalized and return views, and CAPM figures for
/// every requested ticker.
#[derive(Debug, Clone, Serialize)]
pub struct CapmReport {
    pub benchmark: String,
    pub prices: AlignedPriceTable,
    pub normalized: NormalizedTable,
    pub returns: ReturnTable,
    /// Annualized benchmark return (percent).
    pub market_return: f64,
    /// Percent.
    pub risk_free_rate: f64,
    pub estimates: Vec<CapmEstimate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BetaReport {
    pub ticker: String,
    pub benchmark: String,
    pub fit: BetaAlpha,
    pub market_return: f64,
    pub expected_return: f64,
    pub returns: ReturnTable,
}

pub struct AnalysisOrchestrator<L: PriceLoader> {
    loader: L,
    benchmark: String,
    quant: QuantAnalysisEngine,
    optimizer: PortfolioOptimizer,
}

impl<L: PriceLoader> AnalysisOrchestrator<L> {
    pub fn new(loader: L, config: &AnalysisConfig) -> Self {
        Self {
            loader,
            benchmark: config.benchmark.to_ascii_uppercase(),
            quant: QuantAnalysisEngine::new(config.capm_policy(), config.sharpe_policy()),
            optimizer: PortfolioOptimizer::new(config.optimizer_config()),
        }
    }

    pub fn benchmark(&self) -> &str {
        &self.benchmark
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Prices, returns and CAPM estimates of `tickers` against the benchmark.
    pub async fn capm_report(
        &self,
        tickers: &[String],
        lookback: &Lookback,
        today: NaiveDate,
    ) -> Result<CapmReport, StepError> {
        let mut tickers = validate_tickers(tickers, 1).at(AnalysisStep::Validate)?;
        if !tickers.contains(&self.benchmark) {
            tickers.push(self.benchmark.clone());
        }
        tracing::info!("CAPM for {:?} vs {} over {}", tickers, self.benchmark, lookback);

        let series = self.fetch_all(&tickers, lookback, today).await?;
        let prices = quant_analysis::align(&series, Some(&self.benchmark)).at(AnalysisStep::Align)?;
        let normalized = quant_analysis::normalize(&prices);
        let returns = quant_analysis::daily_return(&prices).at(AnalysisStep::Returns)?;
        let summary = self.quant.capm(&returns).at(AnalysisStep::Regression)?;

        Ok(CapmReport {
            benchmark: self.benchmark.clone(),
            prices,
            normalized,
            returns,
            market_return: summary.market_return,
            risk_free_rate: self.quant.capm_policy().risk_free_pct(),
            estimates: summary.estimates,
        })
    }

    /// Beta and alpha of one ticker against the benchmark.
    pub async fn beta_report(
        &self,
        ticker: &str,
        lookback: &Lookback,
        today: NaiveDate,
    ) -> Result<BetaReport, StepError> {
        let ticker = validate_tickers(&[ticker.to_string()], 1)
            .at(AnalysisStep::Validate)?
            .remove(0);
        if ticker == self.benchmark {
            return Err(CapmError::DuplicateTicker(ticker)).at(AnalysisStep::Validate);
        }

        let tickers = [ticker.clone(), self.benchmark.clone()];
        let series = self.fetch_all(&tickers, lookback, today).await?;
        let prices = quant_analysis::align(&series, Some(&self.benchmark)).at(AnalysisStep::Align)?;
        let returns = quant_analysis::daily_return(&prices).at(AnalysisStep::Returns)?;
        let fit = quant_analysis::beta_alpha(&returns, &ticker, &self.benchmark)
            .at(AnalysisStep::Regression)?;

        let market = returns.observations(&self.benchmark).unwrap_or(&[]);
        let (market_return, _) =
            quant_analysis::annualize(&self.benchmark, market).at(AnalysisStep::Statistics)?;
        let expected_return = quant_analysis::capm_expected_return(
            fit.beta,
            market_return,
            self.quant.capm_policy().risk_free_pct(),
        );

        Ok(BetaReport {
            ticker,
            benchmark: self.benchmark.clone(),
            fit,
            market_return,
            expected_return,
            returns,
        })
    }

    /// Pairwise correlation of daily returns.
    pub async fn correlation(
        &self,
        tickers: &[String],
        lookback: &Lookback,
        today: NaiveDate,
    ) -> Result<CorrelationMatrix, StepError> {
        let tickers = validate_tickers(tickers, 2).at(AnalysisStep::Validate)?;
        let returns = self.returns_for(&tickers, lookback, today).await?;
        self.quant.correlation(&returns).at(AnalysisStep::Statistics)
    }

    pub async fn sharpe(
        &self,
        ticker: &str,
        lookback: &Lookback,
        today: NaiveDate,
    ) -> Result<SharpeReport, StepError> {
        let ticker = validate_tickers(&[ticker.to_string()], 1)
            .at(AnalysisStep::Validate)?
            .remove(0);
        let mut series = self.fetch_all(&[ticker], lookback, today).await?;
        let series = series.remove(0);
        let report = self.quant.sharpe(&series).at(AnalysisStep::Sharpe)?;
        tracing::info!("Sharpe {} = {:.4}", report.ticker, report.sharpe_ratio);
        Ok(report)
    }

    /// Long-only maximum-Sharpe weights over `tickers`. The benchmark takes
    /// no part unless it is listed.
    pub async fn optimize(
        &self,
        tickers: &[String],
        lookback: &Lookback,
        today: NaiveDate,
    ) -> Result<PortfolioAllocation, StepError> {
        let tickers = validate_tickers(tickers, 2).at(AnalysisStep::Validate)?;
        let returns = self.returns_for(&tickers, lookback, today).await?;
        self.optimizer.optimize(&returns).at(AnalysisStep::Optimize)
    }

    async fn returns_for(
        &self,
        tickers: &[String],
        lookback: &Lookback,
        today: NaiveDate,
    ) -> Result<ReturnTable, StepError> {
        let series = self.fetch_all(tickers, lookback, today).await?;
        let prices = quant_analysis::align(&series, None).at(AnalysisStep::Align)?;
        quant_analysis::daily_return(&prices).at(AnalysisStep::Returns)
    }

    /// Fetch each ticker in order, stopping at the first failure.
    async fn fetch_all(
        &self,
        tickers: &[String],
        lookback: &Lookback,
        today: NaiveDate,
    ) -> Result<Vec<PriceSeries>, StepError> {
        let (start, end) = lookback.resolve(today).at(AnalysisStep::Validate)?;

        let mut series = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            let s = self.loader.fetch(ticker, start, end).await.at(AnalysisStep::Fetch)?;
            tracing::debug!("{}: {} closes {}..{}", ticker, s.len(), start, end);
            series.push(s);
        }
        Ok(series)
    }
}

/// Trim and upper-case tickers, rejecting blanks, repeats and short lists.
///
/// Tickers also name files for `CsvPriceLoader`, so path separators and `..`
/// are refused.
fn validate_tickers(tickers: &[String], required: usize) -> Result<Vec<String>, CapmError> {
    let mut seen = HashSet::new();
    let mut cleaned = Vec::with_capacity(tickers.len());
    for raw in tickers {
        let ticker = raw.trim().to_ascii_uppercase();
        if !csv_loader::is_safe_ticker(&ticker) {
            return Err(CapmError::UnknownTicker(raw.clone()));
        }
        if !seen.insert(ticker.clone()) {
            return Err(CapmError::DuplicateTicker(ticker));
        }
        cleaned.push(ticker);
    }

    if cleaned.len() < required {
        return Err(CapmError::InsufficientAssets {
            required,
            got: cleaned.len(),
        });
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use capm_core::PricePoint;
    use std::collections::HashMap;

    struct StaticLoader {
        data: HashMap<String, Vec<PricePoint>>,
    }

    impl StaticLoader {
        fn new(entries: Vec<(&str, NaiveDate, Vec<f64>)>) -> Self {
            let data = entries
                .into_iter()
                .map(|(ticker, first, prices)| {
                    let points = prices
                        .into_iter()
                        .enumerate()
                        .map(|(i, p)| PricePoint::new(first + chrono::Days::new(i as u64), p))
                        .collect();
                    (ticker.to_string(), points)
                })
                .collect();
            Self { data }
        }
    }

    #[async_trait]
    impl PriceLoader for StaticLoader {
        async fn fetch(
            &self,
            ticker: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<PriceSeries, CapmError> {
            let points: Vec<PricePoint> = self
                .data
                .get(ticker)
                .ok_or_else(|| CapmError::no_data(ticker))?
                .iter()
                .filter(|p| p.date >= start && p.date <= end)
                .copied()
                .collect();
            PriceSeries::new(ticker, points)
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        ymd(2024, 6, 28)
    }

    fn orchestrator(
        loader: StaticLoader,
        risk_free_rate: f64,
    ) -> AnalysisOrchestrator<StaticLoader> {
        let config = AnalysisConfig {
            benchmark: "SP500".to_string(),
            ..AnalysisConfig::default()
        };
        AnalysisOrchestrator::new(loader, &config.with_risk_free_rate(risk_free_rate))
    }

    fn tickers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_beta_of_levered_asset() {
        let start = ymd(2024, 6, 3);
        let loader = StaticLoader::new(vec![
            ("AAPL", start, vec![100.0, 110.0, 121.0]),
            ("SP500", start, vec![100.0, 105.0, 110.25]),
        ]);
        let orch = orchestrator(loader, 0.0);

        let report = orch.beta_report("aapl", &Lookback::Years(1), today()).await.unwrap();
        assert_eq!(report.ticker, "AAPL");
        assert!((report.fit.beta - 2.0).abs() < 1e-9);
        assert!(report.fit.alpha.abs() < 1e-9);
        assert!((report.market_return - 252.0 * 5.0).abs() < 1e-6);
        assert!((report.expected_return - 2.0 * report.market_return).abs() < 1e-6);

        let aapl = report.returns.column("AAPL").unwrap();
        assert!(aapl[0].abs() < 1e-12);
        assert!((aapl[1] - 10.0).abs() < 1e-9);
        assert!((aapl[2] - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_capm_report_adds_benchmark_once() {
        let start = ymd(2024, 6, 3);
        let loader = StaticLoader::new(vec![
            ("AAPL", start, vec![100.0, 110.0, 121.0, 108.9]),
            ("MSFT", start, vec![50.0, 51.0, 50.0, 52.0]),
            ("SP500", start, vec![100.0, 105.0, 110.25, 104.7375]),
        ]);
        let orch = orchestrator(loader, 0.03);

        let report = orch
            .capm_report(&tickers(&["AAPL", "MSFT"]), &Lookback::Years(1), today())
            .await
            .unwrap();

        assert_eq!(report.prices.tickers, tickers(&["AAPL", "MSFT", "SP500"]));
        assert_eq!(report.estimates.len(), 2);
        assert!((report.risk_free_rate - 3.0).abs() < 1e-12);
        for column in &report.normalized.columns {
            assert!((column[0] - 1.0).abs() < 1e-12);
        }
        let aapl = &report.estimates[0];
        assert_eq!(aapl.ticker, "AAPL");
        assert!((aapl.beta - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_default_capm_uses_zero_risk_free_rate() {
        let start = ymd(2024, 6, 3);
        let loader = StaticLoader::new(vec![
            ("AAPL", start, vec![100.0, 110.0, 121.0, 108.9]),
            ("MSFT", start, vec![50.0, 51.0, 50.0, 52.0]),
            ("SP500", start, vec![100.0, 105.0, 110.25, 104.7375]),
        ]);
        let config = AnalysisConfig {
            benchmark: "SP500".to_string(),
            ..AnalysisConfig::default()
        };
        let orch = AnalysisOrchestrator::new(loader, &config);

        let report = orch
            .capm_report(&tickers(&["AAPL", "MSFT"]), &Lookback::Years(1), today())
            .await
            .unwrap();
        assert_eq!(report.risk_free_rate, 0.0);
        for estimate in &report.estimates {
            let expected = estimate.beta * report.market_return;
            assert!((estimate.expected_return - expected).abs() < 1e-9);
        }

        let beta = orch.beta_report("AAPL", &Lookback::Years(1), today()).await.unwrap();
        assert!((beta.expected_return - beta.fit.beta * beta.market_return).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rejects_path_like_tickers() {
        let orch = orchestrator(StaticLoader::new(vec![]), 0.0);
        for bad in ["../../etc/passwd", "a/b", "..", "x\\y"] {
            let err = orch.sharpe(bad, &Lookback::Years(1), today()).await.unwrap_err();
            assert_eq!(err.step, AnalysisStep::Validate);
            assert_eq!(err.source, CapmError::UnknownTicker(bad.to_string()));
        }
    }

    #[tokio::test]
    async fn test_disjoint_ranges_fail_at_align() {
        let loader = StaticLoader::new(vec![
            ("AAA", ymd(2024, 1, 2), vec![10.0, 11.0, 12.0]),
            ("BBB", ymd(2024, 3, 1), vec![20.0, 21.0, 22.0]),
        ]);
        let orch = orchestrator(loader, 0.0);

        let err = orch
            .correlation(&tickers(&["AAA", "BBB"]), &Lookback::Years(1), today())
            .await
            .unwrap_err();
        assert_eq!(err.step, AnalysisStep::Align);
        assert_eq!(err.source, CapmError::NoOverlappingData);
    }

    #[tokio::test]
    async fn test_flat_series_has_zero_volatility() {
        let loader = StaticLoader::new(vec![("FLAT", ymd(2024, 5, 1), vec![100.0; 10])]);
        let orch = orchestrator(loader, 0.03);

        let err = orch.sharpe("FLAT", &Lookback::Years(1), today()).await.unwrap_err();
        assert_eq!(err.step, AnalysisStep::Sharpe);
        assert!(matches!(err.source, CapmError::ZeroVolatility { .. }));
        assert!(err.to_string().starts_with("Sharpe ratio failed"));
    }

    #[tokio::test]
    async fn test_optimize_needs_two_tickers() {
        let loader = StaticLoader::new(vec![("AAPL", ymd(2024, 5, 1), vec![1.0, 2.0, 3.0])]);
        let orch = orchestrator(loader, 0.0);

        let err = orch
            .optimize(&tickers(&["AAPL"]), &Lookback::Years(1), today())
            .await
            .unwrap_err();
        assert_eq!(err.step, AnalysisStep::Validate);
        assert_eq!(err.source, CapmError::InsufficientAssets { required: 2, got: 1 });
    }

    #[tokio::test]
    async fn test_optimize_returns_valid_weights() {
        let start = ymd(2024, 1, 2);
        let a: Vec<f64> = (0..120)
            .map(|i| 100.0 + i as f64 * 0.3 + 4.0 * (i as f64 * 0.7).sin())
            .collect();
        let b: Vec<f64> = (0..120)
            .map(|i| 80.0 + i as f64 * 0.1 + 3.0 * (i as f64 * 1.3).cos())
            .collect();
        let loader = StaticLoader::new(vec![("A", start, a), ("B", start, b)]);
        let orch = orchestrator(loader, 0.0);

        let allocation = orch
            .optimize(&tickers(&["A", "B"]), &Lookback::Years(1), today())
            .await
            .unwrap();
        assert!((allocation.weights.total() - 1.0).abs() < 1e-6);
        for w in allocation.weights.weights() {
            assert!((0.0..=1.0).contains(&w));
        }
    }

    #[tokio::test]
    async fn test_missing_ticker_fails_at_fetch() {
        let loader = StaticLoader::new(vec![("SP500", ymd(2024, 5, 1), vec![1.0, 2.0, 3.0])]);
        let orch = orchestrator(loader, 0.0);

        let err = orch.beta_report("NOPE", &Lookback::Years(1), today()).await.unwrap_err();
        assert_eq!(err.step, AnalysisStep::Fetch);
        assert_eq!(err.source, CapmError::no_data("NOPE"));
        assert_eq!(err.to_string(), "Price fetch failed: No data returned for NOPE");
    }

    #[tokio::test]
    async fn test_lookback_limits_fetched_range() {
        // Ten days of prices ending on `today`; a 5d window keeps the last six.
        let loader = StaticLoader::new(vec![(
            "AAPL",
            ymd(2024, 6, 19),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0],
        )]);
        let orch = orchestrator(loader, 0.0);
        let lookback = Lookback::Trailing("5d".parse().unwrap());

        let series = orch.fetch_all(&tickers(&["AAPL"]), &lookback, today()).await.unwrap();
        assert_eq!(series[0].len(), 6);
        assert_eq!(series[0].first_date(), Some(ymd(2024, 6, 23)));
    }

    #[tokio::test]
    async fn test_rejects_duplicate_and_blank_tickers() {
        let orch = orchestrator(StaticLoader::new(vec![]), 0.0);

        let err = orch
            .correlation(&tickers(&["AAPL", "aapl"]), &Lookback::Years(1), today())
            .await
            .unwrap_err();
        assert_eq!(err.step, AnalysisStep::Validate);
        assert_eq!(err.source, CapmError::DuplicateTicker("AAPL".to_string()));

        let err = orch.sharpe("  ", &Lookback::Years(1), today()).await.unwrap_err();
        assert_eq!(err.step, AnalysisStep::Validate);

        let err = orch.beta_report("SP500", &Lookback::Years(1), today()).await.unwrap_err();
        assert_eq!(err.source, CapmError::DuplicateTicker("SP500".to_string()));
    }
}
