use anyhow::Result;
use sqlx::{postgres::PgPoolOptions, Connection, Pool, Postgres};
use std::env;
use std::time::Duration;

/// PostgreSQL connection pool type alias.
pub type DbPool = Pool<Postgres>;

/// Database schema name.
pub const SCHEMA: &str = "chain_history";

pub async fn connect() -> Result<DbPool> {
    let database_url =
        env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

    // Retries with exponential backoff to survive DNS/startup races in Compose
    let mut last_err: Option<anyhow::Error> = None;
    let max_attempts: u32 = 10;
    for attempt in 1..=max_attempts {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&database_url)
            .await
        {
            Ok(pool) => {
                log::info!(
                    "✅ Successfully connected to database (attempt {}/{}).",
                    attempt,
                    max_attempts
                );
                if let Err(e) = initialize_database(&pool).await {
                    last_err = Some(e);
                } else {
                    return Ok(pool);
                }
            }
            Err(e) => {
                last_err = Some(e.into());
            }
        }
        // Backoff with cap
        let delay_ms = (1u64 << attempt.min(6)) * 200; // 400ms, 800ms, ... capped at ~12.8s
        log::warn!(
            "DB connect/init attempt {}/{} failed. Retrying in {} ms...",
            attempt,
            max_attempts,
            delay_ms
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Unknown DB connection error")))
}

pub async fn initialize_database(pool: &DbPool) -> Result<()> {
    const SCHEMA_LOCK_ID: i64 = 0x4348_4953_544F_5259; // "CHISTORY"

    let mut conn = pool.acquire().await?;
    let mut tx = conn.begin().await?;

    log::info!("Acquiring database schema lock...");
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SCHEMA_LOCK_ID)
        .execute(tx.as_mut())
        .await?;

    create_tables(&mut tx).await?;

    tx.commit().await?;
    log::info!("✅ Database schema is up to date.");
    Ok(())
}

async fn create_tables(tx: &mut sqlx::Transaction<'_, Postgres>) -> Result<()> {
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", SCHEMA))
        .execute(tx.as_mut())
        .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {}.prices (
            coingecko_id   TEXT NOT NULL,
            hour_timestamp TIMESTAMPTZ NOT NULL,
            price_usd      DOUBLE PRECISION NOT NULL,
            updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (coingecko_id, hour_timestamp)
        )",
        SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_prices_hour
         ON {}.prices (hour_timestamp)",
        SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {}.block_numbers (
            target_timestamp TIMESTAMPTZ PRIMARY KEY,
            block_number     BIGINT NOT NULL,
            updated_at       TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
        SCHEMA
    ))
    .execute(tx.as_mut())
    .await?;

    Ok(())
}

/// Lightweight reachability probe for the status snapshot.
pub async fn ping(pool: &DbPool) -> bool {
    match tokio::time::timeout(
        Duration::from_secs(2),
        sqlx::query("SELECT 1").execute(pool),
    )
    .await
    {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            log::warn!("Database ping failed: {}", e);
            false
        }
        Err(_) => {
            log::warn!("Database ping timed out");
            false
        }
    }
}
