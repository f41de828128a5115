// CoinGecko price-index client: hourly USD history per token.
//
// The market_chart/range endpoint returns points on (roughly) an hourly grid
// for ranges between 1 and 90 days; responses are normalized onto exact hour
// boundaries here so the rest of the pipeline only ever sees aligned
// timestamps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

use crate::errors::ClientError;
use crate::settings::CoingeckoSettings;
use crate::types::{truncate_to_hour, PricePoint};

#[async_trait]
pub trait PriceIndexClient: Send + Sync {
    /// Hourly USD points in the half-open range `[from, to)`.
    async fn hourly_usd_price_history(
        &self,
        coingecko_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, ClientError>;
}

pub struct CoinGeckoClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_attempts: u32,
}

#[derive(Debug, Deserialize)]
struct MarketChartResponse {
    /// Pairs of (unix milliseconds, price in USD).
    prices: Vec<[f64; 2]>,
}

impl CoinGeckoClient {
    pub fn new(settings: &CoingeckoSettings) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            max_attempts: settings.max_attempts.max(1),
        })
    }

    async fn fetch_range(&self, url: &str) -> Result<Vec<[f64; 2]>, ClientError> {
        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-pro-api-key", key);
        }

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(ClientError::UnexpectedResponse(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body: MarketChartResponse = response.json().await?;
        Ok(body.prices)
    }
}

#[async_trait]
impl PriceIndexClient for CoinGeckoClient {
    async fn hourly_usd_price_history(
        &self,
        coingecko_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, ClientError> {
        let url = format!(
            "{}/coins/{}/market_chart/range?vs_currency=usd&from={}&to={}",
            self.base_url,
            coingecko_id,
            from.timestamp(),
            to.timestamp()
        );

        let mut last_err = ClientError::RateLimited;
        for attempt in 1..=self.max_attempts {
            match self.fetch_range(&url).await {
                Ok(points) => return Ok(normalize_to_hours(points, from, to)),
                Err(e) if e.is_rate_limit() && attempt < self.max_attempts => {
                    let delay = Duration::from_secs(attempt as u64);
                    warn!(
                        "⚠️ [CoinGecko] Rate limited fetching {} (attempt {}/{}), backing off {:?}",
                        coingecko_id, attempt, self.max_attempts, delay
                    );
                    tokio::time::sleep(delay).await;
                    last_err = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }
}

/// Snaps raw points to hour boundaries and clips them to `[from, to)`.
/// When two points land in the same hour the later one wins.
fn normalize_to_hours(
    points: Vec<[f64; 2]>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<PricePoint> {
    let mut by_hour: BTreeMap<i64, f64> = BTreeMap::new();
    for [ts_ms, value] in points {
        let secs = (ts_ms / 1000.0) as i64;
        let Some(ts) = DateTime::<Utc>::from_timestamp(secs, 0) else {
            continue;
        };
        let hour = truncate_to_hour(ts);
        if hour >= from && hour < to {
            by_hour.insert(hour.timestamp(), value);
        }
    }
    by_hour
        .into_iter()
        .filter_map(|(secs, value)| {
            DateTime::<Utc>::from_timestamp(secs, 0)
                .map(|timestamp| PricePoint { timestamp, value })
        })
        .collect()
}
