use capm_core::{
    CapmError, CapmEstimate, CorrelationMatrix, ReturnTable, RiskPolicy, TRADING_DAYS_PER_YEAR,
};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::regression;

/// Mean daily return scaled to a year.
pub fn annualized_return(daily: &[f64]) -> f64 {
    daily.mean() * TRADING_DAYS_PER_YEAR
}

/// Sample standard deviation of daily returns scaled to a year.
pub fn annualized_volatility(daily: &[f64]) -> f64 {
    daily.std_dev() * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Annualized `(return, volatility)` of a return series, requiring two observations.
pub fn annualize(ticker: &str, daily: &[f64]) -> Result<(f64, f64), CapmError> {
    if daily.len() < 2 {
        return Err(CapmError::InsufficientData {
            ticker: ticker.to_string(),
            required: 2,
            got: daily.len(),
        });
    }
    Ok((annualized_return(daily), annualized_volatility(daily)))
}

/// CAPM: `risk_free + beta * (market_return - risk_free)`.
pub fn capm_expected_return(beta: f64, market_return: f64, risk_free: f64) -> f64 {
    risk_free + beta * (market_return - risk_free)
}

/// Result of running CAPM over every asset in a return table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapmSummary {
    /// Annualized benchmark return (percent).
    pub market_return: f64,
    pub estimates: Vec<CapmEstimate>,
}

/// Beta, alpha and CAPM expected return for each non-benchmark column.
pub fn capm_estimates(
    returns: &ReturnTable,
    policy: &RiskPolicy,
) -> Result<CapmSummary, CapmError> {
    returns.check_shape()?;
    let benchmark = returns.benchmark.as_deref().ok_or(CapmError::MissingBenchmark)?;
    let market = returns
        .observations(benchmark)
        .ok_or_else(|| CapmError::UnknownTicker(benchmark.to_string()))?;
    let (market_return, _) = annualize(benchmark, market)?;
    let risk_free = policy.risk_free_pct();

    let estimates = regression::betas(returns)?
        .into_iter()
        .map(|fit| CapmEstimate {
            expected_return: capm_expected_return(fit.beta, market_return, risk_free),
            ticker: fit.ticker,
            beta: fit.beta,
            alpha: fit.alpha,
        })
        .collect();

    Ok(CapmSummary {
        market_return,
        estimates,
    })
}

/// Pearson correlation of every pair of columns, computed on daily returns.
pub fn correlation_matrix(returns: &ReturnTable) -> Result<CorrelationMatrix, CapmError> {
    returns.check_shape()?;
    let k = returns.tickers.len();
    if k < 2 {
        return Err(CapmError::InsufficientAssets { required: 2, got: k });
    }

    let series: Vec<&[f64]> = returns
        .tickers
        .iter()
        .map(|t| returns.observations(t).unwrap_or(&[]))
        .collect();

    let mut std_devs = Vec::with_capacity(k);
    for (ticker, obs) in returns.tickers.iter().zip(&series) {
        if obs.len() < 2 {
            return Err(CapmError::InsufficientData {
                ticker: ticker.clone(),
                required: 2,
                got: obs.len(),
            });
        }
        let sd = obs.std_dev();
        if sd <= 0.0 || !sd.is_finite() {
            return Err(CapmError::ZeroVolatility { ticker: ticker.clone() });
        }
        std_devs.push(sd);
    }

    let mut values = vec![vec![1.0; k]; k];
    for i in 0..k {
        for j in (i + 1)..k {
            let rho = series[i].covariance(series[j]) / (std_devs[i] * std_devs[j]);
            let rho = rho.clamp(-1.0, 1.0);
            values[i][j] = rho;
            values[j][i] = rho;
        }
    }

    Ok(CorrelationMatrix {
        tickers: returns.tickers.clone(),
        values,
    })
}
