use async_trait::async_trait;
use capm_core::{CapmError, PriceLoader, PricePoint, PriceSeries};
use chrono::{DateTime, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const BASE_URL: &str = "https://api.polygon.io";

/// Free tier allows 5 requests per minute.
const DEFAULT_RATE_LIMIT: usize = 5;

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            // Remove timestamps outside the window
            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            // Wait until the oldest request falls out of the window
            let sleep_dur = match ts.front() {
                Some(&oldest) => {
                    let until = (oldest + self.window).saturating_duration_since(now);
                    until + Duration::from_millis(50)
                }
                None => Duration::from_millis(50),
            };
            drop(ts);
            tracing::debug!(
                "Rate limiter: waiting {:.1}s for Polygon API slot",
                sleep_dur.as_secs_f64()
            );
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Daily close loader backed by the Polygon.io aggregates endpoint.
#[derive(Clone)]
pub struct PolygonClient {
    api_key: String,
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl PolygonClient {
    pub fn new(api_key: String) -> Self {
        // POLYGON_RATE_LIMIT is requests per minute; paid plans can raise it.
        let rate_limit: usize = std::env::var("POLYGON_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT);

        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            base_url: BASE_URL.to_string(),
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        }
    }

    /// Build a client from `POLYGON_API_KEY`.
    pub fn from_env() -> Result<Self, CapmError> {
        let api_key = std::env::var("POLYGON_API_KEY")
            .map_err(|_| CapmError::Fetch("POLYGON_API_KEY must be set".to_string()))?;
        Ok(Self::new(api_key))
    }

    /// Point the client at a different host (proxies, mock servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Send a rate-limited request. Failures are returned as-is, never retried.
    async fn send_request(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, CapmError> {
        self.rate_limiter.acquire().await;

        let response = builder
            .send()
            .await
            .map_err(|e| CapmError::Fetch(e.to_string()))?;

        if response.status().as_u16() == 429 {
            tracing::warn!("Polygon rate limited the request (HTTP 429)");
            return Err(CapmError::Fetch("Rate limited by Polygon".to_string()));
        }

        if !response.status().is_success() {
            return Err(CapmError::Fetch(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        Ok(response)
    }

    /// Adjusted daily closes for a symbol between two dates inclusive.
    pub async fn get_daily_closes(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<PriceSeries, CapmError> {
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            self.base_url,
            symbol,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        tracing::debug!("Fetching daily closes for {} ({} to {})", symbol, from, to);

        let response = self
            .send_request(self.client.get(&url).query(&[
                ("apiKey", self.api_key.as_str()),
                ("adjusted", "true"),
                ("sort", "asc"),
                ("limit", "50000"),
            ]))
            .await?;

        let agg_response: AggregateResponse = response
            .json()
            .await
            .map_err(|e| CapmError::Fetch(e.to_string()))?;

        series_from_aggregates(symbol, agg_response)
    }
}

#[async_trait]
impl PriceLoader for PolygonClient {
    async fn fetch(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, CapmError> {
        self.get_daily_closes(ticker, start, end).await
    }
}

fn series_from_aggregates(
    symbol: &str,
    response: AggregateResponse,
) -> Result<PriceSeries, CapmError> {
    let points: Vec<PricePoint> = response
        .results
        .into_iter()
        .filter_map(|r| match DateTime::from_timestamp_millis(r.t) {
            Some(ts) => Some(PricePoint::new(ts.date_naive(), r.c)),
            None => {
                tracing::warn!("Skipping {} bar with invalid timestamp {}", symbol, r.t);
                None
            }
        })
        .collect();

    if points.is_empty() {
        return Err(CapmError::no_data(symbol));
    }

    tracing::debug!("Received {} daily closes for {}", points.len(), symbol);
    PriceSeries::new(symbol, points)
}

// Response structures
#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    results: Vec<AggregateResult>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    t: i64, // timestamp (ms)
    c: f64, // close
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregates_decode_to_sorted_series() {
        // 2024-01-03 and 2024-01-02 05:00 UTC, out of order
        let body = r#"{
            "ticker": "AAPL",
            "resultsCount": 2,
            "results": [
                {"v": 100.0, "o": 1.0, "c": 184.25, "h": 1.0, "l": 1.0, "t": 1704258000000, "n": 1},
                {"v": 100.0, "o": 1.0, "c": 185.64, "h": 1.0, "l": 1.0, "t": 1704171600000, "n": 1}
            ],
            "status": "OK"
        }"#;
        let response: AggregateResponse = serde_json::from_str(body).unwrap();
        let series = series_from_aggregates("AAPL", response).unwrap();

        assert_eq!(series.ticker, "AAPL");
        assert_eq!(series.closes(), vec![185.64, 184.25]);
        assert_eq!(series.first_date(), NaiveDate::from_ymd_opt(2024, 1, 2));
    }

    #[test]
    fn test_empty_aggregates_is_no_data() {
        let body = r#"{"ticker": "ZZZZ", "resultsCount": 0, "status": "OK"}"#;
        let response: AggregateResponse = serde_json::from_str(body).unwrap();
        let err = series_from_aggregates("ZZZZ", response).unwrap_err();
        assert_eq!(err, CapmError::no_data("ZZZZ"));
    }

    #[test]
    fn test_base_url_override_trims_slash() {
        let client = PolygonClient::new("key".to_string()).with_base_url("http://localhost:9000/");
        assert_eq!(client.base_url, "http://localhost:9000");
    }

    #[tokio::test]
    async fn test_rate_limiter_admits_up_to_capacity() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(limiter.timestamps.lock().await.len(), 3);
    }
}
