// Etherscan-backed historical block lookup.
//
// One call per target timestamp, so the client carries its own per-second
// rate limiter; callers only see the ClientError taxonomy and retry on the
// next scheduled pass.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

use crate::errors::ClientError;
use crate::settings::EtherscanSettings;

#[async_trait]
pub trait BlockLookupClient: Send + Sync {
    /// Number of the latest block mined at or before `timestamp`.
    async fn block_at_or_before(&self, timestamp: DateTime<Utc>) -> Result<u64, ClientError>;
}

pub struct EtherscanClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    message: String,
    result: String,
}

impl EtherscanClient {
    pub fn new(settings: &EtherscanSettings) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()?;
        let per_second = NonZeroU32::new(settings.max_calls_per_second.max(1))
            .unwrap_or(NonZeroU32::MIN);
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }
}

#[async_trait]
impl BlockLookupClient for EtherscanClient {
    async fn block_at_or_before(&self, timestamp: DateTime<Utc>) -> Result<u64, ClientError> {
        self.limiter.until_ready().await;

        let url = format!(
            "{}/api?module=block&action=getblocknobytime&timestamp={}&closest=before&apikey={}",
            self.base_url,
            timestamp.timestamp(),
            self.api_key
        );

        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(ClientError::UnexpectedResponse(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body: EtherscanResponse = response.json().await?;
        let block = parse_block_number(&body)?;
        debug!(
            "[Etherscan] Resolved timestamp {} to block {}",
            timestamp.timestamp(),
            block
        );
        Ok(block)
    }
}

fn parse_block_number(body: &EtherscanResponse) -> Result<u64, ClientError> {
    // Etherscan signals errors in-band: status "0" with the detail in result.
    if body.status != "1" {
        if body.result.to_lowercase().contains("rate limit") {
            return Err(ClientError::RateLimited);
        }
        return Err(ClientError::UnexpectedResponse(format!(
            "{}: {}",
            body.message, body.result
        )));
    }
    body.result
        .parse::<u64>()
        .map_err(|_| ClientError::UnexpectedResponse(format!(
            "non-numeric block number: {}",
            body.result
        )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_successful_response() {
        let body = EtherscanResponse {
            status: "1".to_string(),
            message: "OK".to_string(),
            result: "19876543".to_string(),
        };
        assert_eq!(parse_block_number(&body).unwrap(), 19_876_543);
    }

    #[test]
    fn test_parse_rate_limit_response() {
        let body = EtherscanResponse {
            status: "0".to_string(),
            message: "NOTOK".to_string(),
            result: "Max rate limit reached".to_string(),
        };
        assert!(matches!(
            parse_block_number(&body),
            Err(ClientError::RateLimited)
        ));
    }

    #[test]
    fn test_parse_error_response() {
        let body = EtherscanResponse {
            status: "0".to_string(),
            message: "NOTOK".to_string(),
            result: "Error! Invalid API key".to_string(),
        };
        assert!(matches!(
            parse_block_number(&body),
            Err(ClientError::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_parse_garbage_result() {
        let body = EtherscanResponse {
            status: "1".to_string(),
            message: "OK".to_string(),
            result: "not-a-number".to_string(),
        };
        assert!(matches!(
            parse_block_number(&body),
            Err(ClientError::UnexpectedResponse(_))
        ));
    }
}
