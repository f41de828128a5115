// Component health records and the aggregated status snapshot.
//
// Everything here is a read path. Components own their health record and the
// status service only collects; failures are observable without any of them
// ever raising to a caller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::block_number_updater::BlockNumberUpdater;
use crate::database::{self, DbPool};
use crate::job_queue::{JobQueue, QueueStats};
use crate::price_updater::PriceUpdater;
use crate::safe_block_tracker::SafeBlockTracker;
use crate::types::SafeBlock;

#[derive(Debug, Default, Clone)]
struct HealthInner {
    last_success: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_error_at: Option<DateTime<Utc>>,
}

/// Per-component record of the most recent success and failure.
#[derive(Debug, Default)]
pub struct ComponentHealth {
    inner: Mutex<HealthInner>,
}

impl ComponentHealth {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HealthInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record_success(&self) {
        self.lock().last_success = Some(Utc::now());
    }

    pub fn record_error(&self, error: impl ToString) {
        let mut inner = self.lock();
        inner.last_error = Some(error.to_string());
        inner.last_error_at = Some(Utc::now());
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let inner = self.lock().clone();
        HealthSnapshot {
            last_success: inner.last_success,
            last_error: inner.last_error,
            last_error_at: inner.last_error_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

/// Aggregated view handed to the HTTP layer.
#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    pub generated_at: DateTime<Utc>,
    pub safe_block: Option<SafeBlock>,
    pub safe_block_tracker: HealthSnapshot,
    pub block_number_updater: HealthSnapshot,
    pub price_updater: HealthSnapshot,
    pub queue: QueueStats,
    pub tracked_tokens: usize,
    /// None when the service runs without a database handle attached.
    pub database_ok: Option<bool>,
}

pub struct StatusService {
    tracker: Arc<SafeBlockTracker>,
    block_updater: Arc<BlockNumberUpdater>,
    price_updater: Arc<PriceUpdater>,
    queue: Arc<JobQueue>,
    db_pool: Option<DbPool>,
}

impl StatusService {
    pub fn new(
        tracker: Arc<SafeBlockTracker>,
        block_updater: Arc<BlockNumberUpdater>,
        price_updater: Arc<PriceUpdater>,
        queue: Arc<JobQueue>,
        db_pool: Option<DbPool>,
    ) -> Self {
        Self {
            tracker,
            block_updater,
            price_updater,
            queue,
            db_pool,
        }
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        let database_ok = match &self.db_pool {
            Some(pool) => Some(database::ping(pool).await),
            None => None,
        };

        StatusSnapshot {
            generated_at: Utc::now(),
            safe_block: self.tracker.safe_block(),
            safe_block_tracker: self.tracker.health(),
            block_number_updater: self.block_updater.health(),
            price_updater: self.price_updater.health(),
            queue: self.queue.stats(),
            tracked_tokens: self.price_updater.token_count(),
            database_ok,
        }
    }
}
