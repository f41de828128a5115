// BlockNumberUpdater - resolves configured target timestamps to blocks.
//
// Walks the target grid (min timestamp, fixed step) and asks the block
// lookup service for the nearest block at or before each unresolved target,
// bounded by the current safe block. Targets the chain has not finalized yet
// are deferred, not failed; each pass is idempotent.

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::etherscan::BlockLookupClient;
use crate::job_queue::JobQueue;
use crate::metrics;
use crate::repositories::BlockNumberRepository;
use crate::safe_block_tracker::SafeBlockTracker;
use crate::status::{ComponentHealth, HealthSnapshot};
use crate::types::{truncate_to_hour, BlockNumberRecord, SafeBlock};

/// Outcome of one synchronization pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockSyncOutcome {
    pub resolved: usize,
    pub deferred: usize,
    pub failed: usize,
}

pub struct BlockNumberUpdater {
    tracker: Arc<SafeBlockTracker>,
    lookup: Arc<dyn BlockLookupClient>,
    repository: Arc<dyn BlockNumberRepository>,
    min_timestamp: DateTime<Utc>,
    step: ChronoDuration,
    refresh_interval: Duration,
    health: ComponentHealth,
    timer_task: Mutex<Option<JoinHandle<()>>>,
}

impl BlockNumberUpdater {
    pub fn new(
        tracker: Arc<SafeBlockTracker>,
        lookup: Arc<dyn BlockLookupClient>,
        repository: Arc<dyn BlockNumberRepository>,
        min_timestamp: DateTime<Utc>,
        step_seconds: u64,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            tracker,
            lookup,
            repository,
            min_timestamp: truncate_to_hour(min_timestamp),
            step: ChronoDuration::seconds(step_seconds.max(1) as i64),
            refresh_interval: refresh_interval.max(Duration::from_millis(10)),
            health: ComponentHealth::new(),
            timer_task: Mutex::new(None),
        }
    }

    /// Enqueues a pass now and re-enqueues on the refresh interval until
    /// [`stop`](Self::stop).
    pub fn start(self: Arc<Self>, queue: &Arc<JobQueue>) {
        info!(
            "[BlockNumbers] Starting synchronizer (step: {}s, interval: {:?})",
            self.step.num_seconds(),
            self.refresh_interval
        );
        Self::enqueue_pass(&self, queue);

        let updater = Arc::clone(&self);
        let queue = Arc::clone(queue);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(updater.refresh_interval);
            ticker.tick().await; // immediate tick, the first pass is already queued
            loop {
                ticker.tick().await;
                Self::enqueue_pass(&updater, &queue);
            }
        });

        let mut task = self
            .timer_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = task.replace(handle) {
            previous.abort();
        }
    }

    fn enqueue_pass(updater: &Arc<Self>, queue: &Arc<JobQueue>) {
        let updater = Arc::clone(updater);
        queue.add("block_number_sync", async move {
            updater.run_once().await?;
            Ok(())
        });
    }

    /// Stops scheduling further passes. An in-flight pass drains normally.
    pub fn stop(&self) {
        let mut task = self
            .timer_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = task.take() {
            handle.abort();
            info!("[BlockNumbers] Synchronizer stopped");
        }
    }

    /// One full pass over the target grid.
    pub async fn run_once(&self) -> Result<BlockSyncOutcome> {
        let Some(safe) = self.tracker.safe_block() else {
            debug!("[BlockNumbers] Safe block unknown, deferring all targets");
            return Ok(BlockSyncOutcome::default());
        };
        let outcome = self.run_pass(&safe, Utc::now()).await;
        match outcome {
            Ok(outcome) => {
                if outcome.failed == 0 {
                    self.health.record_success();
                } else {
                    self.health
                        .record_error(format!("{} targets failed this pass", outcome.failed));
                }
                Ok(outcome)
            }
            Err(e) => {
                self.health.record_error(format!("{:#}", e));
                Err(e)
            }
        }
    }

    async fn run_pass(&self, safe: &SafeBlock, now: DateTime<Utc>) -> Result<BlockSyncOutcome> {
        let resolved_timestamps = self.repository.get_resolved_timestamps().await?;

        let mut outcome = BlockSyncOutcome::default();
        let mut target = self.min_timestamp;
        while target <= now {
            if resolved_timestamps.contains(&target) {
                target = target + self.step;
                continue;
            }
            if target > safe.fetched_at {
                // the chain has not finalized this point yet, later pass
                debug!("[BlockNumbers] Deferring target {} beyond safe point", target);
                outcome.deferred += 1;
                target = target + self.step;
                continue;
            }

            match self.lookup.block_at_or_before(target).await {
                Ok(block) if block > safe.block_number => {
                    debug!(
                        "[BlockNumbers] Deferring target {}: block {} above safe block {}",
                        target, block, safe.block_number
                    );
                    outcome.deferred += 1;
                }
                Ok(block) => {
                    let record = BlockNumberRecord {
                        timestamp: target,
                        block_number: block,
                    };
                    match self.repository.upsert(&record).await {
                        Ok(()) => {
                            outcome.resolved += 1;
                            metrics::increment_block_numbers_resolved();
                        }
                        Err(e) => {
                            outcome.failed += 1;
                            warn!(
                                "⚠️ [BlockNumbers] Persist failed for {}: {:#}",
                                target, e
                            );
                        }
                    }
                }
                Err(e) => {
                    outcome.failed += 1;
                    warn!("⚠️ [BlockNumbers] Lookup failed for {}: {}", target, e);
                }
            }
            target = target + self.step;
        }

        info!(
            "[BlockNumbers] Pass complete: {} resolved, {} deferred, {} failed",
            outcome.resolved, outcome.deferred, outcome.failed
        );
        Ok(outcome)
    }

    pub fn health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }
}

impl Drop for BlockNumberUpdater {
    fn drop(&mut self) {
        self.stop();
    }
}
