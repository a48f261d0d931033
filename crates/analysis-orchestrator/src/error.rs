use capm_core::CapmError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Stage of a computation, reported alongside its failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnalysisStep {
    Validate,
    Fetch,
    Align,
    Returns,
    Regression,
    Statistics,
    Sharpe,
    Optimize,
}

impl fmt::Display for AnalysisStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AnalysisStep::Validate => "Input validation",
            AnalysisStep::Fetch => "Price fetch",
            AnalysisStep::Align => "Date alignment",
            AnalysisStep::Returns => "Daily returns",
            AnalysisStep::Regression => "Beta regression",
            AnalysisStep::Statistics => "Statistics",
            AnalysisStep::Sharpe => "Sharpe ratio",
            AnalysisStep::Optimize => "Portfolio optimization",
        };
        f.write_str(label)
    }
}

/// A failed computation: which step failed and why.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{step} failed: {source}")]
pub struct StepError {
    pub step: AnalysisStep,
    #[source]
    pub source: CapmError,
}

pub(crate) trait StepContext<T> {
    fn at(self, step: AnalysisStep) -> Result<T, StepError>;
}

impl<T> StepContext<T> for Result<T, CapmError> {
    fn at(self, step: AnalysisStep) -> Result<T, StepError> {
        self.map_err(|source| {
            tracing::warn!("{} failed: {}", step, source);
            StepError { step, source }
        })
    }
}
