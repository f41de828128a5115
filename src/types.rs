// Domain types shared across the synchronization layer.

use chrono::{DateTime, TimeZone, Utc};
use ethers::types::Address;
use serde::{Deserialize, Serialize};

/// A token tracked by the price synchronizer.
///
/// `coingecko_id` is the stable key used by the price index; it is also the
/// primary key prefix for persisted price records. Tokens are loaded from
/// configuration and never change at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub coingecko_id: String,
    pub symbol: String,
    #[serde(default)]
    pub address: Option<Address>,
}

/// One hourly USD price observation for a token.
///
/// Uniquely keyed by `(coingecko_id, timestamp)`; the repository upserts on
/// conflict. Timestamps are always hour-aligned (see [`truncate_to_hour`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub coingecko_id: String,
    pub timestamp: DateTime<Utc>,
    pub price_usd: f64,
}

/// A resolved (timestamp, block number) pair.
///
/// Later timestamps resolve to non-decreasing block numbers in practice, but
/// each point is resolved independently and the invariant is not enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockNumberRecord {
    pub timestamp: DateTime<Utc>,
    pub block_number: u64,
}

/// The most recent block considered final enough to trust for historical
/// queries: chain head minus a confirmation offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafeBlock {
    pub block_number: u64,
    pub fetched_at: DateTime<Utc>,
}

/// A raw (timestamp, value) point as returned by the price index, before
/// being mapped into a [`PriceRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Rounds a timestamp down to the start of its hour.
///
/// Price history is keyed at hour granularity, so every timestamp that
/// reaches the price index or the prices table goes through this first.
pub fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = ts.timestamp();
    let aligned = secs - secs.rem_euclid(3600);
    // timestamp_opt is always single-valued for UTC; fall back to the input
    // rather than panic if the aligned value is somehow unrepresentable.
    Utc.timestamp_opt(aligned, 0).single().unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_to_hour_aligns_down() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 10, 37, 12).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(truncate_to_hour(ts), expected);
    }

    #[test]
    fn test_truncate_to_hour_is_idempotent() {
        let ts = Utc.with_ymd_and_hms(2023, 6, 15, 23, 59, 59).unwrap();
        let once = truncate_to_hour(ts);
        assert_eq!(truncate_to_hour(once), once);
    }

    #[test]
    fn test_truncate_to_hour_keeps_aligned_value() {
        let aligned = Utc.with_ymd_and_hms(2024, 3, 10, 4, 0, 0).unwrap();
        assert_eq!(truncate_to_hour(aligned), aligned);
    }

    #[test]
    fn test_truncate_pre_epoch_timestamp() {
        let ts = Utc.with_ymd_and_hms(1969, 12, 31, 23, 30, 0).unwrap();
        let expected = Utc.with_ymd_and_hms(1969, 12, 31, 23, 0, 0).unwrap();
        assert_eq!(truncate_to_hour(ts), expected);
    }
}
