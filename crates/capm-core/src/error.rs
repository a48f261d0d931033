use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CapmError {
    #[error("No data returned for {ticker}")]
    NoData { ticker: String },

    #[error("Price series have no overlapping dates")]
    NoOverlappingData,

    #[error("Invalid price {price} for {ticker} on {date}")]
    InvalidPrice {
        ticker: String,
        date: NaiveDate,
        price: f64,
    },

    #[error("Duplicate date {date} in series for {ticker}")]
    DuplicateDate { ticker: String, date: NaiveDate },

    #[error("Ticker {0} supplied more than once")]
    DuplicateTicker(String),

    #[error("Unknown ticker: {0}")]
    UnknownTicker(String),

    #[error("No benchmark column to regress against")]
    MissingBenchmark,

    #[error("Regression of {ticker} is degenerate: benchmark returns have zero variance")]
    DegenerateRegression { ticker: String },

    #[error("Zero volatility for {ticker}")]
    ZeroVolatility { ticker: String },

    #[error("Insufficient assets: need at least {required}, got {got}")]
    InsufficientAssets { required: usize, got: usize },

    #[error("Insufficient data for {ticker}: need at least {required} observations, got {got}")]
    InsufficientData {
        ticker: String,
        required: usize,
        got: usize,
    },

    #[error("Covariance matrix is singular (collinear assets)")]
    SingularCovariance,

    #[error("Malformed table: {0}")]
    MalformedTable(String),

    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("Fetch error: {0}")]
    Fetch(String),
}

impl CapmError {
    pub fn no_data(ticker: impl Into<String>) -> Self {
        CapmError::NoData {
            ticker: ticker.into(),
        }
    }
}
