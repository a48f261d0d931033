use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::CapmError;

/// Daily closing price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }
}

/// Closing prices for one ticker, ascending by date with no duplicate dates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    pub ticker: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series, sorting the points by date.
    ///
    /// Rejects empty input, duplicate dates and prices that are not
    /// strictly positive and finite.
    pub fn new(ticker: impl Into<String>, mut points: Vec<PricePoint>) -> Result<Self, CapmError> {
        let ticker = ticker.into();
        if points.is_empty() {
            return Err(CapmError::NoData { ticker });
        }

        points.sort_by_key(|p| p.date);

        for pair in points.windows(2) {
            if pair[0].date == pair[1].date {
                return Err(CapmError::DuplicateDate {
                    ticker,
                    date: pair[1].date,
                });
            }
        }

        if let Some(bad) = points.iter().find(|p| !p.close.is_finite() || p.close <= 0.0) {
            return Err(CapmError::InvalidPrice {
                ticker,
                date: bad.date,
                price: bad.close,
            });
        }

        Ok(Self { ticker, points })
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }
}

/// Prices joined on the dates common to every constituent series.
///
/// `columns[i]` holds the prices of `tickers[i]`, one value per entry in `dates`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedPriceTable {
    pub dates: Vec<NaiveDate>,
    pub tickers: Vec<String>,
    pub columns: Vec<Vec<f64>>,
    #[serde(default)]
    pub benchmark: Option<String>,
}

impl AlignedPriceTable {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column(&self, ticker: &str) -> Option<&[f64]> {
        column_of(&self.tickers, &self.columns, ticker)
    }

    /// Values of every column on row `index`, in ticker order.
    pub fn row(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.dates.len() {
            return None;
        }
        self.columns.iter().map(|c| c.get(index).copied()).collect()
    }

    /// Fails unless there is one column per ticker and one value per date.
    pub fn check_shape(&self) -> Result<(), CapmError> {
        check_shape(&self.dates, &self.tickers, &self.columns)
    }
}

/// Prices divided by their first value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTable {
    pub dates: Vec<NaiveDate>,
    pub tickers: Vec<String>,
    pub columns: Vec<Vec<f64>>,
    /// Columns passed through unchanged because their first value was zero.
    #[serde(default)]
    pub skipped: Vec<String>,
}

impl NormalizedTable {
    pub fn column(&self, ticker: &str) -> Option<&[f64]> {
        column_of(&self.tickers, &self.columns, ticker)
    }
}

/// Daily percentage returns, row-aligned with the price table they came from.
///
/// Row 0 is zero for every column; real observations start at row 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnTable {
    pub dates: Vec<NaiveDate>,
    pub tickers: Vec<String>,
    pub columns: Vec<Vec<f64>>,
    #[serde(default)]
    pub benchmark: Option<String>,
}

impl ReturnTable {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Full column, including the zero-filled first row.
    pub fn column(&self, ticker: &str) -> Option<&[f64]> {
        column_of(&self.tickers, &self.columns, ticker)
    }

    /// Column without the zero-filled first row.
    pub fn observations(&self, ticker: &str) -> Option<&[f64]> {
        self.column(ticker).map(|c| if c.is_empty() { c } else { &c[1..] })
    }

    /// Number of real observations per column.
    pub fn observation_count(&self) -> usize {
        self.dates.len().saturating_sub(1)
    }

    /// Fails unless there is one column per ticker and one value per date.
    pub fn check_shape(&self) -> Result<(), CapmError> {
        check_shape(&self.dates, &self.tickers, &self.columns)
    }

    /// Tickers other than the benchmark, in column order.
    pub fn asset_tickers(&self) -> Vec<&str> {
        self.tickers
            .iter()
            .filter(|t| self.benchmark.as_deref() != Some(t.as_str()))
            .map(String::as_str)
            .collect()
    }
}

fn check_shape(
    dates: &[NaiveDate],
    tickers: &[String],
    columns: &[Vec<f64>],
) -> Result<(), CapmError> {
    if tickers.len() != columns.len() {
        return Err(CapmError::MalformedTable(format!(
            "{} tickers but {} columns",
            tickers.len(),
            columns.len()
        )));
    }
    for (ticker, column) in tickers.iter().zip(columns) {
        if column.len() != dates.len() {
            return Err(CapmError::MalformedTable(format!(
                "{} has {} values for {} dates",
                ticker,
                column.len(),
                dates.len()
            )));
        }
    }
    Ok(())
}

fn column_of<'a>(tickers: &[String], columns: &'a [Vec<f64>], ticker: &str) -> Option<&'a [f64]> {
    tickers
        .iter()
        .position(|t| t == ticker)
        .and_then(|i| columns.get(i))
        .map(Vec::as_slice)
}

/// OLS fit of a ticker's returns against the benchmark's returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetaAlpha {
    pub ticker: String,
    pub beta: f64,
    pub alpha: f64,
    pub r_squared: f64,
}

impl BetaAlpha {
    /// Point on the regression line for a given market return.
    pub fn fitted(&self, market_return: f64) -> f64 {
        self.beta * market_return + self.alpha
    }
}

/// CAPM expected annual return (percent) for one ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapmEstimate {
    pub ticker: String,
    pub beta: f64,
    pub alpha: f64,
    pub expected_return: f64,
}

/// Pairwise Pearson correlations, `values[i][j]` between `tickers[i]` and `tickers[j]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub tickers: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.tickers.iter().position(|t| t == a)?;
        let j = self.tickers.iter().position(|t| t == b)?;
        Some(self.values[i][j])
    }
}

/// Annualized risk/return figures (percent) for a single ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharpeReport {
    pub ticker: String,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub risk_free_rate: f64,
    pub sharpe_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetWeight {
    pub ticker: String,
    pub weight: f64,
}

/// Long-only weights summing to one, in ticker order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioWeights {
    pub entries: Vec<AssetWeight>,
}

impl PortfolioWeights {
    pub fn weights(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.weight).collect()
    }

    pub fn get(&self, ticker: &str) -> Option<f64> {
        self.entries.iter().find(|e| e.ticker == ticker).map(|e| e.weight)
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|e| e.weight).sum()
    }
}

/// Optimizer result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioAllocation {
    pub weights: PortfolioWeights,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub iterations: usize,
}
