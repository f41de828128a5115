//! # Synchronization Service
//!
//! Continuous service that keeps the safe block point, resolved block
//! numbers, and hourly token price history up to date in the background.
//!
//! ## Overview
//!
//! This service:
//! - Refreshes the safe block point periodically (configurable via
//!   `sync.safe_block_refresh_interval_seconds`)
//! - Resolves block numbers for the configured target grid (configurable
//!   via `sync.block_refresh_interval_seconds`)
//! - Backfills and extends hourly USD prices per configured token
//!   (configurable via `sync.price_refresh_interval_seconds`)
//! - Handles graceful shutdown on Ctrl+C
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin sync_service
//! ```
//!
//! Press Ctrl+C to stop gracefully.

use anyhow::Result;
use chain_history_sdk::{
    block_number_updater::BlockNumberUpdater,
    chain_client::{self, EthereumClient},
    coingecko::CoinGeckoClient,
    database,
    etherscan::EtherscanClient,
    job_queue::JobQueue,
    metrics,
    price_updater::PriceUpdater,
    repositories::{PgBlockNumberRepository, PgPriceRepository},
    safe_block_tracker::SafeBlockTracker,
    settings::Settings,
    status::StatusService,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    env_logger::init();

    println!("🚀 Starting Chain History Sync Service");
    println!("═══════════════════════════════════════════════════════════════════\n");

    // 1. Load settings
    let settings = Settings::new()?;
    let tokens = settings.tokens();
    println!("✅ Settings loaded ({} tokens tracked)", tokens.len());

    #[cfg(feature = "observability")]
    {
        metrics_exporter_prometheus::PrometheusBuilder::new().install()?;
        println!("✅ Prometheus exporter installed");
    }
    metrics::describe_metrics();

    // 2. Connect to database
    let db_pool = database::connect().await?;
    println!("✅ Database connected");

    let price_repository = Arc::new(PgPriceRepository::new(db_pool.clone()));
    let block_repository = Arc::new(PgBlockNumberRepository::new(db_pool.clone()));

    // 3. Create external clients
    let provider = Arc::new(chain_client::http_provider(&settings.rpc)?);
    let chain = Arc::new(EthereumClient::new(provider));
    let lookup = Arc::new(EtherscanClient::new(&settings.etherscan)?);
    let price_index = Arc::new(CoinGeckoClient::new(&settings.coingecko)?);
    println!("✅ External clients created");

    // 4. Wire the core
    let queue = Arc::new(JobQueue::new(settings.sync.max_concurrent_jobs));

    let tracker = Arc::new(SafeBlockTracker::new(
        chain,
        settings.sync.safe_block_offset,
        Duration::from_secs(settings.sync.safe_block_refresh_interval_seconds),
    ));

    let block_updater = Arc::new(BlockNumberUpdater::new(
        tracker.clone(),
        lookup,
        block_repository,
        settings.sync.min_timestamp,
        settings.sync.block_timestamp_step_seconds,
        Duration::from_secs(settings.sync.block_refresh_interval_seconds),
    ));

    let price_updater = Arc::new(PriceUpdater::new(
        price_index,
        price_repository,
        tokens,
        settings.sync.min_timestamp,
        Duration::from_secs(settings.sync.price_refresh_interval_seconds),
    ));

    let status = StatusService::new(
        tracker.clone(),
        block_updater.clone(),
        price_updater.clone(),
        queue.clone(),
        Some(db_pool),
    );

    // 5. Start everything
    tracker.clone().start().await;
    block_updater.clone().start(&queue);
    price_updater.clone().start(&queue);
    println!("✅ Synchronizers started\n");
    log::info!("Service is running. Press Ctrl+C to stop.");

    // 6. Wait for shutdown signal
    signal::ctrl_c().await?;
    println!("\n🛑 Shutdown signal received");

    // Stop scheduling new work, then let in-flight jobs drain
    tracker.stop();
    block_updater.stop();
    price_updater.stop();

    let drain_deadline = std::time::Instant::now() + Duration::from_secs(10);
    while !queue.is_idle() && std::time::Instant::now() < drain_deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let stats = queue.stats();
    if queue.is_idle() {
        println!("✅ Job queue drained ({} succeeded, {} failed)", stats.succeeded, stats.failed);
    } else {
        println!(
            "⚠️ Shutting down with {} jobs still in flight",
            stats.queued + stats.in_flight
        );
    }

    let snapshot = status.snapshot().await;
    log::info!(
        "Final status: safe_block={:?}, queue_failed={}",
        snapshot.safe_block.map(|b| b.block_number),
        snapshot.queue.failed
    );

    println!("👋 Stopped");
    Ok(())
}
