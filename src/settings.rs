use chrono::{DateTime, Utc};
use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::env;

use crate::types::Token;

#[derive(Debug, Deserialize, Clone)]
pub struct RpcSettings {
    #[serde(default = "default_rpc_http_url")]
    pub http_url: String,
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_rpc_http_url() -> String {
    "http://localhost:8545".to_string()
}
fn default_rpc_timeout_ms() -> u64 {
    10_000
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            http_url: default_rpc_http_url(),
            timeout_ms: default_rpc_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EtherscanSettings {
    #[serde(default = "default_etherscan_base_url")]
    pub base_url: String,
    /// API key; usually provided via the ETHERSCAN_API_KEY env variable.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_etherscan_max_calls_per_second")]
    pub max_calls_per_second: u32,
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_etherscan_base_url() -> String {
    "https://api.etherscan.io".to_string()
}
fn default_etherscan_max_calls_per_second() -> u32 {
    5 // free-tier Etherscan cap
}
fn default_http_timeout_ms() -> u64 {
    10_000
}

impl Default for EtherscanSettings {
    fn default() -> Self {
        Self {
            base_url: default_etherscan_base_url(),
            api_key: String::new(),
            max_calls_per_second: default_etherscan_max_calls_per_second(),
            timeout_ms: default_http_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CoingeckoSettings {
    #[serde(default = "default_coingecko_base_url")]
    pub base_url: String,
    /// Optional pro API key; usually provided via COINGECKO_API_KEY.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_coingecko_max_attempts")]
    pub max_attempts: u32,
}

fn default_coingecko_base_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}
fn default_coingecko_max_attempts() -> u32 {
    3
}

impl Default for CoingeckoSettings {
    fn default() -> Self {
        Self {
            base_url: default_coingecko_base_url(),
            api_key: None,
            timeout_ms: default_http_timeout_ms(),
            max_attempts: default_coingecko_max_attempts(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncSettings {
    /// How often the safe block tracker refreshes the chain head.
    #[serde(default = "default_safe_block_refresh_interval_seconds")]
    pub safe_block_refresh_interval_seconds: u64,
    /// Confirmation offset in blocks subtracted from the chain head.
    #[serde(default = "default_safe_block_offset")]
    pub safe_block_offset: u64,
    /// Earliest timestamp covered by price history and block resolution.
    #[serde(default = "default_min_timestamp")]
    pub min_timestamp: DateTime<Utc>,
    /// Spacing between consecutive block-number target timestamps.
    #[serde(default = "default_block_timestamp_step_seconds")]
    pub block_timestamp_step_seconds: u64,
    /// How often each token's price update job is re-enqueued.
    #[serde(default = "default_price_refresh_interval_seconds")]
    pub price_refresh_interval_seconds: u64,
    /// How often the block-number synchronization pass is re-enqueued.
    #[serde(default = "default_block_refresh_interval_seconds")]
    pub block_refresh_interval_seconds: u64,
    /// Ceiling on simultaneously running queue jobs.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

fn default_safe_block_refresh_interval_seconds() -> u64 {
    30
}
fn default_safe_block_offset() -> u64 {
    100
}
fn default_min_timestamp() -> DateTime<Utc> {
    // 2021-01-01T00:00:00Z
    DateTime::<Utc>::from_timestamp(1_609_459_200, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
fn default_block_timestamp_step_seconds() -> u64 {
    86_400 // one target per day
}
fn default_price_refresh_interval_seconds() -> u64 {
    3_600 // history is hourly, refreshing faster only burns quota
}
fn default_block_refresh_interval_seconds() -> u64 {
    600
}
fn default_max_concurrent_jobs() -> usize {
    20
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            safe_block_refresh_interval_seconds: default_safe_block_refresh_interval_seconds(),
            safe_block_offset: default_safe_block_offset(),
            min_timestamp: default_min_timestamp(),
            block_timestamp_step_seconds: default_block_timestamp_step_seconds(),
            price_refresh_interval_seconds: default_price_refresh_interval_seconds(),
            block_refresh_interval_seconds: default_block_refresh_interval_seconds(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

/// One tracked token as declared in Config.toml under `[[tokens]]`.
#[derive(Debug, Deserialize, Clone)]
pub struct TokenSettings {
    pub coingecko_id: String,
    pub symbol: String,
    #[serde(default)]
    pub address: Option<ethers::types::Address>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub rpc: RpcSettings,
    #[serde(default)]
    pub etherscan: EtherscanSettings,
    #[serde(default)]
    pub coingecko: CoingeckoSettings,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub tokens: Vec<TokenSettings>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("Config.toml").required(false))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        // Environment variable overrides for deployment secrets
        if let Ok(url) = env::var("SDK_RPC_HTTP_URL") {
            if !url.trim().is_empty() {
                settings.rpc.http_url = url.trim().to_string();
            }
        }
        if let Ok(key) = env::var("ETHERSCAN_API_KEY") {
            if !key.trim().is_empty() {
                settings.etherscan.api_key = key.trim().to_string();
            }
        }
        if let Ok(key) = env::var("COINGECKO_API_KEY") {
            if !key.trim().is_empty() {
                settings.coingecko.api_key = Some(key.trim().to_string());
            }
        }

        Ok(settings)
    }

    /// Tracked tokens in their domain shape.
    pub fn tokens(&self) -> Vec<Token> {
        self.tokens
            .iter()
            .map(|t| Token {
                coingecko_id: t.coingecko_id.clone(),
                symbol: t.symbol.clone(),
                address: t.address,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_defaults_are_sane() {
        let sync = SyncSettings::default();
        assert!(sync.max_concurrent_jobs > 0);
        assert!(sync.safe_block_refresh_interval_seconds > 0);
        assert_eq!(sync.price_refresh_interval_seconds % 3600, 0);
        // the configured floor must itself sit on the hour grid
        assert_eq!(sync.min_timestamp.timestamp() % 3600, 0);
    }

    #[test]
    fn test_token_settings_to_domain() {
        let settings = Settings {
            tokens: vec![TokenSettings {
                coingecko_id: "ethereum".to_string(),
                symbol: "ETH".to_string(),
                address: None,
            }],
            ..Default::default()
        };
        let tokens = settings.tokens();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].coingecko_id, "ethereum");
        assert_eq!(tokens[0].symbol, "ETH");
    }
}
