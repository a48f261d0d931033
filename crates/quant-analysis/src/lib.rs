//! Return engine and risk/return statistics over aligned daily price series.

pub mod align;
pub mod regression;
pub mod returns;
pub mod sharpe;
pub mod statistics;

pub use align::align;
pub use regression::{beta_alpha, betas, ols_fit};
pub use returns::{compound, daily_return, normalize, pct_changes};
pub use sharpe::{sharpe_from_returns, sharpe_ratio};
pub use statistics::{
    annualize, annualized_return, annualized_volatility, capm_estimates, capm_expected_return,
    correlation_matrix, CapmSummary,
};

use capm_core::{CapmError, CorrelationMatrix, PriceSeries, ReturnTable, RiskPolicy, SharpeReport};

/// Statistics bound to the risk-free policies injected at construction.
///
/// CAPM and Sharpe each take their rate from their own `RiskPolicy`. By
/// default CAPM assumes 0% and Sharpe assumes `DEFAULT_RISK_FREE_RATE`.
#[derive(Debug, Clone, Copy)]
pub struct QuantAnalysisEngine {
    capm_policy: RiskPolicy,
    sharpe_policy: RiskPolicy,
}

impl Default for QuantAnalysisEngine {
    fn default() -> Self {
        Self::new(RiskPolicy::capm_default(), RiskPolicy::default())
    }
}

impl QuantAnalysisEngine {
    pub fn new(capm_policy: RiskPolicy, sharpe_policy: RiskPolicy) -> Self {
        Self {
            capm_policy,
            sharpe_policy,
        }
    }

    pub fn capm_policy(&self) -> &RiskPolicy {
        &self.capm_policy
    }

    pub fn sharpe_policy(&self) -> &RiskPolicy {
        &self.sharpe_policy
    }

    pub fn capm(&self, returns: &ReturnTable) -> Result<CapmSummary, CapmError> {
        capm_estimates(returns, &self.capm_policy)
    }

    pub fn sharpe(&self, series: &PriceSeries) -> Result<SharpeReport, CapmError> {
        sharpe_ratio(series, &self.sharpe_policy)
    }

    pub fn correlation(&self, returns: &ReturnTable) -> Result<CorrelationMatrix, CapmError> {
        correlation_matrix(returns)
    }
}
