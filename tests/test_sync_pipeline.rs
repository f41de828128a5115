//! End-to-end tests for the synchronization pipeline.
//!
//! Wires the tracker and both synchronizers through the bounded queue with
//! scripted clients and in-memory repositories: no network, no database.

use anyhow::Result;
use async_trait::async_trait;
use chain_history_sdk::{
    block_number_updater::BlockNumberUpdater,
    chain_client::ChainHeadClient,
    coingecko::PriceIndexClient,
    errors::ClientError,
    etherscan::BlockLookupClient,
    job_queue::JobQueue,
    price_stream::PriceChannel,
    price_updater::PriceUpdater,
    repositories::{BlockNumberRepository, PriceRepository},
    safe_block_tracker::SafeBlockTracker,
    status::StatusService,
    types::{truncate_to_hour, BlockNumberRecord, PriceRecord, PricePoint, Token},
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct StaticChain(u64);

#[async_trait]
impl ChainHeadClient for StaticChain {
    async fn current_block_number(&self) -> Result<u64, ClientError> {
        Ok(self.0)
    }
}

struct StaticLookup(u64);

#[async_trait]
impl BlockLookupClient for StaticLookup {
    async fn block_at_or_before(&self, _timestamp: DateTime<Utc>) -> Result<u64, ClientError> {
        Ok(self.0)
    }
}

struct StaticPriceIndex {
    points: Vec<PricePoint>,
}

#[async_trait]
impl PriceIndexClient for StaticPriceIndex {
    async fn hourly_usd_price_history(
        &self,
        _coingecko_id: &str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>, ClientError> {
        Ok(self.points.clone())
    }
}

#[derive(Default)]
struct MemoryPriceRepo {
    stored: Vec<PriceRecord>,
    upserts: Mutex<Vec<Vec<PriceRecord>>>,
}

#[async_trait]
impl PriceRepository for MemoryPriceRepo {
    async fn get_all_by_token(&self, coingecko_id: &str) -> Result<Vec<PriceRecord>> {
        Ok(self
            .stored
            .iter()
            .filter(|r| r.coingecko_id == coingecko_id)
            .cloned()
            .collect())
    }

    async fn get_latest_timestamp(&self, coingecko_id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .stored
            .iter()
            .filter(|r| r.coingecko_id == coingecko_id)
            .map(|r| r.timestamp)
            .max())
    }

    async fn upsert_many(&self, records: &[PriceRecord]) -> Result<()> {
        self.upserts.lock().unwrap().push(records.to_vec());
        Ok(())
    }
}

#[derive(Default)]
struct MemoryBlockRepo {
    records: Mutex<Vec<BlockNumberRecord>>,
}

#[async_trait]
impl BlockNumberRepository for MemoryBlockRepo {
    async fn upsert(&self, record: &BlockNumberRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn get_resolved_timestamps(&self) -> Result<HashSet<DateTime<Utc>>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.timestamp)
            .collect())
    }

    async fn get_all(&self) -> Result<Vec<BlockNumberRecord>> {
        Ok(self.records.lock().unwrap().clone())
    }
}

fn test_token() -> Token {
    Token {
        coingecko_id: "ethereum".to_string(),
        symbol: "ETH".to_string(),
        address: None,
    }
}

async fn wait_until_idle(queue: &JobQueue) {
    for _ in 0..300 {
        if queue.is_idle() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("queue did not drain in time");
}

/// Full price path: startup replay and a remote backfill, both observed
/// through the event channels.
#[tokio::test]
async fn test_price_pipeline_through_queue() {
    let current_hour = truncate_to_hour(Utc::now());
    let stored = vec![PriceRecord {
        coingecko_id: "ethereum".to_string(),
        timestamp: current_hour - ChronoDuration::hours(3),
        price_usd: 2_400.0,
    }];
    let fresh_point = PricePoint {
        timestamp: current_hour - ChronoDuration::hours(1),
        value: 2_450.0,
    };

    let repo = Arc::new(MemoryPriceRepo {
        stored: stored.clone(),
        ..Default::default()
    });
    let index = Arc::new(StaticPriceIndex {
        points: vec![fresh_point.clone()],
    });

    let updater = Arc::new(PriceUpdater::new(
        index,
        repo.clone(),
        vec![test_token()],
        current_hour - ChronoDuration::days(30),
        Duration::from_secs(3_600),
    ));
    let mut synced_rx = updater.subscribe(PriceChannel::SyncedExisting);
    let mut new_rx = updater.subscribe(PriceChannel::NewPrices);

    let queue = Arc::new(JobQueue::new(4));
    updater.clone().start(&queue);
    wait_until_idle(&queue).await;
    updater.stop();

    // startup replay carries exactly the stored history
    assert_eq!(synced_rx.recv().await.unwrap(), stored);

    // the backfill upserted and published exactly the fresh point
    let first_upsert = {
        let upserts = repo.upserts.lock().unwrap();
        assert_eq!(upserts.len(), 1);
        upserts[0].clone()
    };
    assert_eq!(first_upsert.len(), 1);
    assert_eq!(first_upsert[0].timestamp, fresh_point.timestamp);
    assert_eq!(first_upsert[0].price_usd, fresh_point.value);
    assert_eq!(new_rx.recv().await.unwrap(), first_upsert);

    assert_eq!(queue.stats().failed, 0);
}

/// Full block-number path: tracker refresh, then a queued pass resolving
/// the whole target grid.
#[tokio::test]
async fn test_block_pipeline_through_queue() {
    let tracker = Arc::new(SafeBlockTracker::new(
        Arc::new(StaticChain(20_000)),
        100,
        Duration::from_secs(3_600),
    ));
    tracker.clone().start().await;
    assert_eq!(tracker.safe_block().unwrap().block_number, 19_900);

    let repo = Arc::new(MemoryBlockRepo::default());
    let updater = Arc::new(BlockNumberUpdater::new(
        tracker.clone(),
        Arc::new(StaticLookup(12_345)),
        repo.clone(),
        Utc::now() - ChronoDuration::days(2),
        86_400,
        Duration::from_secs(600),
    ));

    let queue = Arc::new(JobQueue::new(4));
    updater.clone().start(&queue);
    wait_until_idle(&queue).await;
    updater.stop();
    tracker.stop();

    let records = repo.records.lock().unwrap();
    // one target per day over two days, all final, all resolved
    assert!(records.len() >= 2, "expected at least 2 resolved targets");
    assert!(records.iter().all(|r| r.block_number == 12_345));
    assert_eq!(queue.stats().failed, 0);
}

/// The aggregated snapshot reflects component state and serializes cleanly.
#[tokio::test]
async fn test_status_snapshot_reflects_components() {
    let tracker = Arc::new(SafeBlockTracker::new(
        Arc::new(StaticChain(5_000)),
        100,
        Duration::from_secs(3_600),
    ));
    tracker.refresh_once().await;

    let block_updater = Arc::new(BlockNumberUpdater::new(
        tracker.clone(),
        Arc::new(StaticLookup(1_000)),
        Arc::new(MemoryBlockRepo::default()),
        Utc::now() - ChronoDuration::days(1),
        86_400,
        Duration::from_secs(600),
    ));
    let price_updater = Arc::new(PriceUpdater::new(
        Arc::new(StaticPriceIndex { points: vec![] }),
        Arc::new(MemoryPriceRepo::default()),
        vec![test_token()],
        Utc::now() - ChronoDuration::days(1),
        Duration::from_secs(3_600),
    ));
    let queue = Arc::new(JobQueue::new(4));

    let status = StatusService::new(
        tracker,
        block_updater,
        price_updater,
        queue,
        None,
    );

    let snapshot = status.snapshot().await;
    assert_eq!(snapshot.safe_block.as_ref().unwrap().block_number, 4_900);
    assert_eq!(snapshot.tracked_tokens, 1);
    assert!(snapshot.database_ok.is_none());

    let json = serde_json::to_value(&snapshot).unwrap();
    assert!(json.get("safe_block").is_some());
    assert!(json.get("queue").is_some());
}
