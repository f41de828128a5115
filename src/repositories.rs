// Repository interfaces over the persistence layer.
//
// The synchronizers depend on these traits rather than on sqlx directly so
// that update passes can be exercised against in-memory fakes. Upserts are
// atomic per statement; concurrent jobs may write the same key safely.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::collections::HashSet;

use crate::database::{DbPool, SCHEMA};
use crate::types::{BlockNumberRecord, PriceRecord};

#[async_trait]
pub trait PriceRepository: Send + Sync {
    /// All persisted records for a token, chronological.
    async fn get_all_by_token(&self, coingecko_id: &str) -> Result<Vec<PriceRecord>>;

    /// Timestamp of the latest persisted record for a token, if any.
    async fn get_latest_timestamp(&self, coingecko_id: &str) -> Result<Option<DateTime<Utc>>>;

    /// Insert-or-update by (coingecko_id, timestamp).
    async fn upsert_many(&self, records: &[PriceRecord]) -> Result<()>;
}

#[async_trait]
pub trait BlockNumberRepository: Send + Sync {
    /// Insert-or-update by timestamp.
    async fn upsert(&self, record: &BlockNumberRecord) -> Result<()>;

    /// Timestamps that already have a resolved block number.
    async fn get_resolved_timestamps(&self) -> Result<HashSet<DateTime<Utc>>>;

    /// All resolved records, chronological. Read path for external consumers.
    async fn get_all(&self) -> Result<Vec<BlockNumberRecord>>;
}

/// PostgreSQL-backed price repository.
pub struct PgPriceRepository {
    pool: DbPool,
}

impl PgPriceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PriceRepository for PgPriceRepository {
    async fn get_all_by_token(&self, coingecko_id: &str) -> Result<Vec<PriceRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT coingecko_id, hour_timestamp, price_usd
             FROM {}.prices
             WHERE coingecko_id = $1
             ORDER BY hour_timestamp ASC",
            SCHEMA
        ))
        .bind(coingecko_id)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(PriceRecord {
                coingecko_id: row.try_get("coingecko_id")?,
                timestamp: row.try_get("hour_timestamp")?,
                price_usd: row.try_get("price_usd")?,
            });
        }
        Ok(records)
    }

    async fn get_latest_timestamp(&self, coingecko_id: &str) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(&format!(
            "SELECT MAX(hour_timestamp) AS latest FROM {}.prices WHERE coingecko_id = $1",
            SCHEMA
        ))
        .bind(coingecko_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get::<Option<DateTime<Utc>>, _>("latest")?)
    }

    async fn upsert_many(&self, records: &[PriceRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(&format!(
                "INSERT INTO {}.prices (coingecko_id, hour_timestamp, price_usd, updated_at)
                 VALUES ($1, $2, $3, NOW())
                 ON CONFLICT (coingecko_id, hour_timestamp) DO UPDATE SET
                    price_usd = EXCLUDED.price_usd,
                    updated_at = NOW()",
                SCHEMA
            ))
            .bind(&record.coingecko_id)
            .bind(record.timestamp)
            .bind(record.price_usd)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// PostgreSQL-backed block number repository.
pub struct PgBlockNumberRepository {
    pool: DbPool,
}

impl PgBlockNumberRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlockNumberRepository for PgBlockNumberRepository {
    async fn upsert(&self, record: &BlockNumberRecord) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO {}.block_numbers (target_timestamp, block_number, updated_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT (target_timestamp) DO UPDATE SET
                block_number = EXCLUDED.block_number,
                updated_at = NOW()",
            SCHEMA
        ))
        .bind(record.timestamp)
        .bind(record.block_number as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_resolved_timestamps(&self) -> Result<HashSet<DateTime<Utc>>> {
        let rows = sqlx::query(&format!(
            "SELECT target_timestamp FROM {}.block_numbers",
            SCHEMA
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut timestamps = HashSet::with_capacity(rows.len());
        for row in rows {
            timestamps.insert(row.try_get("target_timestamp")?);
        }
        Ok(timestamps)
    }

    async fn get_all(&self) -> Result<Vec<BlockNumberRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT target_timestamp, block_number
             FROM {}.block_numbers
             ORDER BY target_timestamp ASC",
            SCHEMA
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(BlockNumberRecord {
                timestamp: row.try_get("target_timestamp")?,
                block_number: row.try_get::<i64, _>("block_number")? as u64,
            });
        }
        Ok(records)
    }
}
