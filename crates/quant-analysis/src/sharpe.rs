use capm_core::{CapmError, PriceSeries, RiskPolicy, SharpeReport};

use crate::returns::pct_changes;
use crate::statistics::annualize;

/// Sharpe ratio of a daily percentage return series.
pub fn sharpe_from_returns(
    ticker: &str,
    daily: &[f64],
    policy: &RiskPolicy,
) -> Result<SharpeReport, CapmError> {
    let (annualized_return, annualized_volatility) = annualize(ticker, daily)?;

    if annualized_volatility <= 0.0 || !annualized_volatility.is_finite() {
        return Err(CapmError::ZeroVolatility {
            ticker: ticker.to_string(),
        });
    }

    let risk_free_rate = policy.risk_free_pct();
    Ok(SharpeReport {
        ticker: ticker.to_string(),
        annualized_return,
        annualized_volatility,
        risk_free_rate,
        sharpe_ratio: (annualized_return - risk_free_rate) / annualized_volatility,
    })
}

/// Annualized return, volatility and Sharpe ratio of a price series.
pub fn sharpe_ratio(series: &PriceSeries, policy: &RiskPolicy) -> Result<SharpeReport, CapmError> {
    if series.len() < 3 {
        return Err(CapmError::InsufficientData {
            ticker: series.ticker.clone(),
            required: 3,
            got: series.len(),
        });
    }

    let daily = pct_changes(series)?;
    sharpe_from_returns(&series.ticker, &daily, policy)
}
