use capm_core::{RiskPolicy, DEFAULT_CAPM_RISK_FREE_RATE, DEFAULT_RISK_FREE_RATE};
use portfolio_optimizer::OptimizerConfig;
use serde::Serialize;

pub const DEFAULT_BENCHMARK: &str = "SPY";

/// Settings shared by every computation, read once at startup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisConfig {
    /// Market proxy regressed against in CAPM computations.
    pub benchmark: String,
    /// Annual risk-free rate for Sharpe ratios, as a fraction.
    pub risk_free_rate: f64,
    /// Annual risk-free rate for CAPM expected returns, as a fraction.
    pub capm_risk_free_rate: f64,
    pub optimizer_max_iterations: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            benchmark: DEFAULT_BENCHMARK.to_string(),
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            capm_risk_free_rate: DEFAULT_CAPM_RISK_FREE_RATE,
            optimizer_max_iterations: OptimizerConfig::default().max_iterations,
        }
    }
}

impl AnalysisConfig {
    /// Read `BENCHMARK_TICKER`, `RISK_FREE_RATE`, `CAPM_RISK_FREE_RATE` and
    /// `OPTIMIZER_MAX_ITERATIONS`, falling back to defaults for anything
    /// missing or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let benchmark = lookup("BENCHMARK_TICKER")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.benchmark);

        let rate = |key: &str, default: f64| match lookup(key) {
            Some(raw) => match raw.trim().parse::<f64>() {
                Ok(rate) if rate.is_finite() => rate,
                _ => {
                    tracing::warn!("Ignoring invalid {}={:?}", key, raw);
                    default
                }
            },
            None => default,
        };
        let risk_free_rate = rate("RISK_FREE_RATE", defaults.risk_free_rate);
        let capm_risk_free_rate = rate("CAPM_RISK_FREE_RATE", defaults.capm_risk_free_rate);

        let optimizer_max_iterations = lookup("OPTIMIZER_MAX_ITERATIONS")
            .and_then(|v| v.trim().parse().ok())
            .filter(|&n: &usize| n > 0)
            .unwrap_or(defaults.optimizer_max_iterations);

        Self {
            benchmark,
            risk_free_rate,
            capm_risk_free_rate,
            optimizer_max_iterations,
        }
    }

    /// Use one explicitly supplied rate for both CAPM and Sharpe.
    pub fn with_risk_free_rate(mut self, rate: f64) -> Self {
        self.risk_free_rate = rate;
        self.capm_risk_free_rate = rate;
        self
    }

    pub fn sharpe_policy(&self) -> RiskPolicy {
        RiskPolicy::new(self.risk_free_rate)
    }

    pub fn capm_policy(&self) -> RiskPolicy {
        RiskPolicy::new(self.capm_risk_free_rate)
    }

    pub fn optimizer_config(&self) -> OptimizerConfig {
        OptimizerConfig {
            max_iterations: self.optimizer_max_iterations,
            ..OptimizerConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(AnalysisConfig::from_lookup(lookup(&[])), AnalysisConfig::default());
    }

    #[test]
    fn test_reads_overrides() {
        let config = AnalysisConfig::from_lookup(lookup(&[
            ("BENCHMARK_TICKER", "QQQ"),
            ("RISK_FREE_RATE", "0.045"),
            ("CAPM_RISK_FREE_RATE", "0.01"),
            ("OPTIMIZER_MAX_ITERATIONS", "250"),
        ]));
        assert_eq!(config.benchmark, "QQQ");
        assert!((config.risk_free_rate - 0.045).abs() < 1e-12);
        assert!((config.capm_risk_free_rate - 0.01).abs() < 1e-12);
        assert_eq!(config.optimizer_max_iterations, 250);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = AnalysisConfig::from_lookup(lookup(&[
            ("BENCHMARK_TICKER", "  "),
            ("RISK_FREE_RATE", "three percent"),
            ("CAPM_RISK_FREE_RATE", "inf"),
            ("OPTIMIZER_MAX_ITERATIONS", "0"),
        ]));
        assert_eq!(config, AnalysisConfig::default());
    }

    #[test]
    fn test_capm_defaults_to_zero_rate() {
        let config = AnalysisConfig::default();
        assert_eq!(config.capm_policy().risk_free_rate, 0.0);
        assert_eq!(config.sharpe_policy().risk_free_rate, 0.03);
    }

    #[test]
    fn test_supplied_rate_feeds_capm_and_sharpe() {
        let config = AnalysisConfig::default().with_risk_free_rate(0.02);
        assert_eq!(config.capm_policy().risk_free_rate, 0.02);
        assert_eq!(config.sharpe_policy().risk_free_rate, 0.02);
        assert_eq!(config.optimizer_config(), OptimizerConfig::default());
    }
}
