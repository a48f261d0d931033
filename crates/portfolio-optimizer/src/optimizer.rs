use capm_core::{
    AssetWeight, CapmError, PortfolioAllocation, PortfolioWeights, ReturnTable,
    TRADING_DAYS_PER_YEAR,
};
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::simplex::{equal_weights, project_to_simplex};

/// Smallest eigenvalue relative to the largest below which the covariance is singular.
const SINGULARITY_RATIO: f64 = 1e-10;
/// Armijo sufficient-increase constant.
const ARMIJO_C: f64 = 1e-4;
const MIN_STEP: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub max_iterations: usize,
    /// Stop once an accepted step moves the weights less than this.
    pub tolerance: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-10,
        }
    }
}

/// Annualized figures for one set of weights (percent).
///
/// `sharpe_ratio` is `expected_return / volatility` with no risk-free term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioStats {
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
}

/// Daily mean vector and sample covariance of the asset columns.
struct Moments {
    tickers: Vec<String>,
    mu: DVector<f64>,
    sigma: DMatrix<f64>,
}

impl Moments {
    fn from_returns(returns: &ReturnTable) -> Result<Self, CapmError> {
        returns.check_shape()?;
        let tickers = returns.asset_tickers();
        let k = tickers.len();
        if k < 2 {
            return Err(CapmError::InsufficientAssets { required: 2, got: k });
        }

        let n = returns.observation_count();
        if n < 2 {
            return Err(CapmError::InsufficientData {
                ticker: tickers[0].to_string(),
                required: 2,
                got: n,
            });
        }

        let columns: Vec<&[f64]> = tickers
            .iter()
            .map(|t| {
                returns
                    .observations(t)
                    .ok_or_else(|| CapmError::UnknownTicker(t.to_string()))
            })
            .collect::<Result<Vec<_>, CapmError>>()?;

        let mu = DVector::from_iterator(k, columns.iter().map(|&c| c.mean()));

        let mut centered = DMatrix::from_fn(n, k, |r, c| columns[c][r]);
        for (mut column, mean) in centered.column_iter_mut().zip(mu.iter()) {
            column.add_scalar_mut(-mean);
        }
        let sigma = centered.transpose() * &centered / (n - 1) as f64;

        Ok(Self {
            tickers: tickers.into_iter().map(str::to_string).collect(),
            mu,
            sigma,
        })
    }

    fn ensure_invertible(&self) -> Result<(), CapmError> {
        let eigen = SymmetricEigen::new(self.sigma.clone());
        let largest = eigen.eigenvalues.max();
        let smallest = eigen.eigenvalues.min();
        if largest <= 0.0 || smallest <= SINGULARITY_RATIO * largest {
            tracing::debug!("Covariance eigenvalues span [{:e}, {:e}]", smallest, largest);
            return Err(CapmError::SingularCovariance);
        }
        Ok(())
    }

    fn stats(&self, w: &DVector<f64>) -> PortfolioStats {
        let expected_return = TRADING_DAYS_PER_YEAR * self.mu.dot(w);
        let variance = TRADING_DAYS_PER_YEAR * w.dot(&(&self.sigma * w));
        let volatility = variance.max(0.0).sqrt();
        let sharpe_ratio = if volatility > 0.0 {
            expected_return / volatility
        } else {
            0.0
        };
        PortfolioStats {
            expected_return,
            volatility,
            sharpe_ratio,
        }
    }

    /// Gradient of `expected_return / volatility` with respect to the weights.
    fn gradient(&self, w: &DVector<f64>) -> DVector<f64> {
        let sigma_w = &self.sigma * w;
        let stats = self.stats(w);
        let vol = stats.volatility;
        &self.mu * (TRADING_DAYS_PER_YEAR / vol)
            - sigma_w * (TRADING_DAYS_PER_YEAR * stats.expected_return / vol.powi(3))
    }
}

/// Long-only maximum-Sharpe portfolio search.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortfolioOptimizer {
    config: OptimizerConfig,
}

impl PortfolioOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Weights maximizing the Sharpe ratio over the non-benchmark columns.
    ///
    /// Projected-gradient ascent from equal weights with a backtracking line
    /// search. The result is a local optimum.
    pub fn optimize(&self, returns: &ReturnTable) -> Result<PortfolioAllocation, CapmError> {
        let moments = Moments::from_returns(returns)?;
        moments.ensure_invertible()?;

        let mut w = equal_weights(moments.tickers.len());
        let mut objective = moments.stats(&w).sharpe_ratio;
        let mut step = 1.0;
        let mut iterations = 0;

        while iterations < self.config.max_iterations {
            iterations += 1;
            let grad = moments.gradient(&w);

            let mut accepted = None;
            while step >= MIN_STEP {
                let candidate = project_to_simplex(&(&w + &grad * step));
                let value = moments.stats(&candidate).sharpe_ratio;
                if value >= objective + ARMIJO_C * grad.dot(&(&candidate - &w)) {
                    accepted = Some((candidate, value));
                    break;
                }
                step *= 0.5;
            }

            let Some((candidate, value)) = accepted else {
                break;
            };

            let moved = (&candidate - &w).norm();
            w = candidate;
            objective = value;
            if moved < self.config.tolerance {
                break;
            }
            step *= 2.0;
        }

        // Clear rounding dust so weights stay in [0, 1] and sum to one.
        w.apply(|x| {
            if *x < 1e-12 {
                *x = 0.0
            }
        });
        let total = w.sum();
        w /= total;

        let stats = moments.stats(&w);
        tracing::info!(
            "Optimized {} assets in {} iterations: sharpe={:.4}",
            moments.tickers.len(),
            iterations,
            stats.sharpe_ratio
        );

        Ok(PortfolioAllocation {
            weights: PortfolioWeights {
                entries: moments
                    .tickers
                    .iter()
                    .zip(w.iter())
                    .map(|(ticker, &weight)| AssetWeight {
                        ticker: ticker.clone(),
                        weight,
                    })
                    .collect(),
            },
            expected_return: stats.expected_return,
            volatility: stats.volatility,
            sharpe_ratio: stats.sharpe_ratio,
            iterations,
        })
    }

    /// Annualized return, volatility and Sharpe ratio of arbitrary weights.
    pub fn evaluate(
        &self,
        returns: &ReturnTable,
        weights: &[f64],
    ) -> Result<PortfolioStats, CapmError> {
        let moments = Moments::from_returns(returns)?;
        if weights.len() != moments.tickers.len() {
            return Err(CapmError::InvalidWeights(format!(
                "expected {} weights, got {}",
                moments.tickers.len(),
                weights.len()
            )));
        }
        Ok(moments.stats(&DVector::from_column_slice(weights)))
    }
}
