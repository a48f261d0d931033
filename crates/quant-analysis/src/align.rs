use capm_core::{AlignedPriceTable, CapmError, PriceSeries};
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashSet};

/// Inner-join price series on date.
///
/// Only dates present in every series are kept; nothing is filled. Columns
/// follow the input order and rows are ascending by date.
pub fn align(
    series: &[PriceSeries],
    benchmark: Option<&str>,
) -> Result<AlignedPriceTable, CapmError> {
    let first = series
        .first()
        .ok_or(CapmError::InsufficientAssets { required: 1, got: 0 })?;

    let mut seen = HashSet::new();
    for s in series {
        if !seen.insert(s.ticker.as_str()) {
            return Err(CapmError::DuplicateTicker(s.ticker.clone()));
        }
    }

    if let Some(b) = benchmark {
        if !seen.contains(b) {
            return Err(CapmError::UnknownTicker(b.to_string()));
        }
    }

    let mut common: BTreeSet<NaiveDate> = first.points().iter().map(|p| p.date).collect();
    for s in &series[1..] {
        let dates: HashSet<NaiveDate> = s.points().iter().map(|p| p.date).collect();
        common.retain(|d| dates.contains(d));
    }

    if common.is_empty() {
        return Err(CapmError::NoOverlappingData);
    }

    // Points are sorted and unique, so filtering keeps the same order as `common`.
    let columns: Vec<Vec<f64>> = series
        .iter()
        .map(|s| {
            s.points()
                .iter()
                .filter(|p| common.contains(&p.date))
                .map(|p| p.close)
                .collect()
        })
        .collect();

    let dropped = series.iter().map(PriceSeries::len).max().unwrap_or(0) - common.len();
    if dropped > 0 {
        tracing::debug!("Alignment dropped {} rows without a price for every ticker", dropped);
    }

    Ok(AlignedPriceTable {
        dates: common.into_iter().collect(),
        tickers: series.iter().map(|s| s.ticker.clone()).collect(),
        columns,
        benchmark: benchmark.map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use capm_core::PricePoint;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn series(ticker: &str, rows: &[(u32, f64)]) -> PriceSeries {
        let points = rows.iter().map(|&(day, p)| PricePoint::new(d(day), p)).collect();
        PriceSeries::new(ticker, points).unwrap()
    }

    #[test]
    fn test_inner_join_keeps_common_dates() {
        let aapl = series("AAPL", &[(1, 10.0), (4, 11.0), (5, 12.0), (6, 13.0)]);
        let spy = series("SPY", &[(1, 100.0), (5, 101.0), (6, 102.0), (7, 103.0)]);

        let table = align(&[aapl, spy], Some("SPY")).unwrap();

        assert_eq!(table.dates, vec![d(1), d(5), d(6)]);
        assert_eq!(table.tickers, vec!["AAPL", "SPY"]);
        assert_eq!(table.column("AAPL").unwrap(), &[10.0, 12.0, 13.0]);
        assert_eq!(table.column("SPY").unwrap(), &[100.0, 101.0, 102.0]);
        assert_eq!(table.benchmark.as_deref(), Some("SPY"));
        assert_eq!(table.row(1), Some(vec![12.0, 101.0]));
    }

    #[test]
    fn test_every_row_complete() {
        let a = series("A", &[(1, 1.0), (2, 1.0), (3, 1.0)]);
        let b = series("B", &[(2, 2.0), (3, 2.0), (4, 2.0)]);
        let c = series("C", &[(3, 3.0), (2, 3.0), (9, 3.0)]);

        let table = align(&[a, b, c], None).unwrap();

        assert_eq!(table.dates, vec![d(2), d(3)]);
        for column in &table.columns {
            assert_eq!(column.len(), table.len());
        }
    }

    #[test]
    fn test_disjoint_ranges_have_no_overlap() {
        let a = series("AAPL", &[(1, 10.0), (2, 11.0)]);
        let b = series("SPY", &[(10, 100.0), (11, 101.0)]);
        assert_eq!(align(&[a, b], None).unwrap_err(), CapmError::NoOverlappingData);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert_eq!(
            align(&[], None).unwrap_err(),
            CapmError::InsufficientAssets { required: 1, got: 0 }
        );

        let a = series("AAPL", &[(1, 10.0)]);
        assert_eq!(
            align(&[a.clone(), a.clone()], None).unwrap_err(),
            CapmError::DuplicateTicker("AAPL".into())
        );
        assert_eq!(
            align(&[a], Some("SPY")).unwrap_err(),
            CapmError::UnknownTicker("SPY".into())
        );
    }
}
