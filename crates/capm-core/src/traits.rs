use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{CapmError, Lookback, PriceSeries};

/// Source of daily closing prices
#[async_trait]
pub trait PriceLoader: Send + Sync {
    /// Closing prices for `ticker` between `start` and `end` inclusive.
    ///
    /// May return fewer rows than the calendar range (holidays, listing date).
    /// Returns `CapmError::NoData` when nothing is available.
    async fn fetch(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, CapmError>;

    async fn fetch_lookback(
        &self,
        ticker: &str,
        lookback: &Lookback,
        today: NaiveDate,
    ) -> Result<PriceSeries, CapmError> {
        let (start, end) = lookback.resolve(today)?;
        self.fetch(ticker, start, end).await
    }
}
