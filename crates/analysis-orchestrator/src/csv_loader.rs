use async_trait::async_trait;
use capm_core::{CapmError, PriceLoader, PricePoint, PriceSeries};
use chrono::NaiveDate;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Loads `<dir>/<TICKER>.csv` files with `Date` and `Close` columns.
#[derive(Debug, Clone)]
pub struct CsvPriceLoader {
    dir: PathBuf,
}

impl CsvPriceLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn candidates(&self, ticker: &str) -> Vec<PathBuf> {
        let mut names = vec![
            ticker.to_string(),
            ticker.to_ascii_uppercase(),
            ticker.to_ascii_lowercase(),
        ];
        names.dedup();
        names.into_iter().map(|n| self.dir.join(format!("{}.csv", n))).collect()
    }

    async fn read_file(&self, ticker: &str) -> Result<Vec<u8>, CapmError> {
        if !is_safe_ticker(ticker) {
            return Err(CapmError::UnknownTicker(ticker.to_string()));
        }
        for path in self.candidates(ticker) {
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    tracing::debug!("Reading {} prices from {}", ticker, path.display());
                    return Ok(bytes);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(CapmError::Fetch(format!("{}: {}", path.display(), e))),
            }
        }
        Err(CapmError::no_data(ticker))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl PriceLoader for CsvPriceLoader {
    async fn fetch(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, CapmError> {
        let bytes = self.read_file(ticker).await?;
        let points: Vec<PricePoint> = parse_points(ticker, bytes.as_slice())?
            .into_iter()
            .filter(|p| p.date >= start && p.date <= end)
            .collect();
        PriceSeries::new(ticker, points)
    }
}

/// A ticker that can be used as a file stem inside the price directory.
pub fn is_safe_ticker(ticker: &str) -> bool {
    !ticker.is_empty()
        && !ticker.contains(|c: char| matches!(c, '/' | '\\' | '\0'))
        && !ticker.contains("..")
}

/// Parse `Date,Close` rows; header names match case-insensitively and extra
/// columns are ignored. Rows with an empty or `null` close are skipped.
pub fn parse_points(ticker: &str, reader: impl Read) -> Result<Vec<PricePoint>, CapmError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let bad = |msg: String| CapmError::Fetch(format!("{}: {}", ticker, msg));

    let headers = rdr.headers().map_err(|e| bad(e.to_string()))?.clone();
    let position = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let date_idx = position("date").ok_or_else(|| bad("missing Date column".to_string()))?;
    let close_idx = position("close").ok_or_else(|| bad("missing Close column".to_string()))?;

    let mut points = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| bad(e.to_string()))?;
        let raw_close = record.get(close_idx).unwrap_or("");
        if raw_close.is_empty() || raw_close.eq_ignore_ascii_case("null") {
            continue;
        }

        let raw_date = record.get(date_idx).unwrap_or("");
        // Timestamps such as "2024-01-02 00:00:00-05:00" keep only the day.
        let day = raw_date.get(..10).unwrap_or(raw_date);
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .map_err(|_| bad(format!("invalid date {:?} on row {}", raw_date, line + 1)))?;
        let close: f64 = raw_close
            .parse()
            .map_err(|_| bad(format!("invalid close {:?} on row {}", raw_close, line + 1)))?;

        points.push(PricePoint::new(date, close));
    }

    Ok(points)
}
