//! Long-only maximum-Sharpe portfolio weights from a daily return table.

pub mod optimizer;
pub mod simplex;

pub use optimizer::{OptimizerConfig, PortfolioOptimizer, PortfolioStats};
