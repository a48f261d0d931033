use capm_core::{AlignedPriceTable, CapmError, NormalizedTable, PriceSeries, ReturnTable};
use chrono::NaiveDate;

/// Percentage change between consecutive prices: `(p[t] - p[t-1]) / p[t-1] * 100`.
fn percent_changes(
    ticker: &str,
    dates: &[NaiveDate],
    prices: &[f64],
) -> Result<Vec<f64>, CapmError> {
    prices
        .windows(2)
        .zip(dates)
        .map(|(w, &date)| {
            if w[0] <= 0.0 || !w[0].is_finite() {
                return Err(CapmError::InvalidPrice {
                    ticker: ticker.to_string(),
                    date,
                    price: w[0],
                });
            }
            Ok((w[1] - w[0]) / w[0] * 100.0)
        })
        .collect()
}

/// Daily percentage returns of a single series, one fewer than its prices.
pub fn pct_changes(series: &PriceSeries) -> Result<Vec<f64>, CapmError> {
    let dates: Vec<NaiveDate> = series.points().iter().map(|p| p.date).collect();
    percent_changes(&series.ticker, &dates, &series.closes())
}

/// Daily percentage returns for every column of an aligned table.
///
/// Row 0 is zero so the result stays row-aligned with the prices.
pub fn daily_return(table: &AlignedPriceTable) -> Result<ReturnTable, CapmError> {
    table.check_shape()?;
    let columns = table
        .tickers
        .iter()
        .zip(&table.columns)
        .map(|(ticker, prices)| -> Result<Vec<f64>, CapmError> {
            let mut column = Vec::with_capacity(prices.len());
            if !prices.is_empty() {
                column.push(0.0);
                column.extend(percent_changes(ticker, &table.dates, prices)?);
            }
            Ok(column)
        })
        .collect::<Result<Vec<_>, CapmError>>()?;

    Ok(ReturnTable {
        dates: table.dates.clone(),
        tickers: table.tickers.clone(),
        columns,
        benchmark: table.benchmark.clone(),
    })
}

/// Divide each column by its first value so every series starts at 1.0.
///
/// A column whose first value is zero cannot be rebased; it is passed through
/// unchanged and listed in `skipped`.
pub fn normalize(table: &AlignedPriceTable) -> NormalizedTable {
    let mut skipped = Vec::new();

    let columns = table
        .tickers
        .iter()
        .zip(&table.columns)
        .map(|(ticker, prices)| match prices.first() {
            Some(&base) if base != 0.0 => prices.iter().map(|p| p / base).collect(),
            Some(_) => {
                tracing::warn!("{} starts at zero, leaving it unnormalized", ticker);
                skipped.push(ticker.clone());
                prices.clone()
            }
            None => Vec::new(),
        })
        .collect();

    NormalizedTable {
        dates: table.dates.clone(),
        tickers: table.tickers.clone(),
        columns,
        skipped,
    }
}

/// Growth of 1.0 compounded through a sequence of percentage returns.
pub fn compound(returns_pct: &[f64]) -> Vec<f64> {
    returns_pct
        .iter()
        .scan(1.0, |acc, r| {
            *acc *= 1.0 + r / 100.0;
            Some(*acc)
        })
        .collect()
}
