// PriceUpdater - backfills and extends hourly USD price history per token.
//
// Each token gets two kinds of queue jobs: a storage replay that warms
// downstream consumers at startup, and an update that fetches the missing
// hour range from the price index and upserts it. Updates re-enqueue on a
// fixed interval per token; an explicit in-flight guard keeps two updates
// for the same token from overlapping.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::coingecko::PriceIndexClient;
use crate::job_queue::JobQueue;
use crate::metrics;
use crate::price_stream::{PriceChannel, PriceStream};
use crate::repositories::PriceRepository;
use crate::status::{ComponentHealth, HealthSnapshot};
use crate::types::{truncate_to_hour, PriceRecord, Token};

pub struct PriceUpdater {
    price_index: Arc<dyn PriceIndexClient>,
    repository: Arc<dyn PriceRepository>,
    tokens: Vec<Token>,
    min_timestamp: DateTime<Utc>,
    refresh_interval: Duration,
    stream: PriceStream,
    in_flight: Arc<DashMap<String, ()>>,
    overlap_skips: AtomicU64,
    health: ComponentHealth,
    timer_tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Releases a token's in-flight slot when the update run ends, however it
/// ends.
struct InFlightGuard {
    map: Arc<DashMap<String, ()>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}

impl PriceUpdater {
    pub fn new(
        price_index: Arc<dyn PriceIndexClient>,
        repository: Arc<dyn PriceRepository>,
        tokens: Vec<Token>,
        min_timestamp: DateTime<Utc>,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            price_index,
            repository,
            tokens,
            min_timestamp: truncate_to_hour(min_timestamp),
            refresh_interval: refresh_interval.max(Duration::from_millis(10)),
            stream: PriceStream::new(64),
            in_flight: Arc::new(DashMap::new()),
            overlap_skips: AtomicU64::new(0),
            health: ComponentHealth::new(),
            timer_tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Updates skipped because the same token was already being updated.
    pub fn overlap_skips(&self) -> u64 {
        self.overlap_skips.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self, channel: PriceChannel) -> broadcast::Receiver<Vec<PriceRecord>> {
        self.stream.subscribe(channel)
    }

    /// Enqueues a storage replay and an update for every token now, then
    /// re-enqueues updates per token on the refresh interval until
    /// [`stop`](Self::stop).
    pub fn start(self: Arc<Self>, queue: &Arc<JobQueue>) {
        info!(
            "[Prices] Starting synchronizer ({} tokens, interval: {:?})",
            self.tokens.len(),
            self.refresh_interval
        );

        let mut timers = self
            .timer_tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for previous in timers.drain(..) {
            previous.abort();
        }

        for token in &self.tokens {
            Self::enqueue_storage_sync(&self, queue, token.clone());
            Self::enqueue_update(&self, queue, token.clone());

            let updater = Arc::clone(&self);
            let queue = Arc::clone(queue);
            let token = token.clone();
            timers.push(tokio::spawn(async move {
                let mut ticker = interval(updater.refresh_interval);
                // the immediate first tick is covered by the update queued above
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    Self::enqueue_update(&updater, &queue, token.clone());
                }
            }));
        }
    }

    /// Stops scheduling further updates. In-flight jobs drain normally.
    pub fn stop(&self) {
        let mut timers = self
            .timer_tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !timers.is_empty() {
            for handle in timers.drain(..) {
                handle.abort();
            }
            info!("[Prices] Synchronizer stopped");
        }
    }

    fn enqueue_storage_sync(updater: &Arc<Self>, queue: &Arc<JobQueue>, token: Token) {
        let updater = Arc::clone(updater);
        queue.add(format!("price_storage_sync:{}", token.coingecko_id), async move {
            updater.sync_token_from_storage(&token).await?;
            Ok(())
        });
    }

    fn enqueue_update(updater: &Arc<Self>, queue: &Arc<JobQueue>, token: Token) {
        let updater = Arc::clone(updater);
        queue.add(format!("price_update:{}", token.coingecko_id), async move {
            updater.update_token_price(&token).await?;
            Ok(())
        });
    }

    /// Replays persisted records for a token to the SyncedExisting channel.
    /// Read-only; lets consumers warm up without waiting on external APIs.
    pub async fn sync_token_from_storage(&self, token: &Token) -> Result<usize> {
        let records = self
            .repository
            .get_all_by_token(&token.coingecko_id)
            .await
            .with_context(|| format!("loading stored prices for {}", token.coingecko_id))?;

        let count = records.len();
        if count > 0 {
            self.stream.publish(PriceChannel::SyncedExisting, records);
            debug!(
                "[Prices] Replayed {} stored records for {}",
                count, token.coingecko_id
            );
        }
        Ok(count)
    }

    /// Fetches and persists the hour range the repository does not have yet.
    /// Returns the number of new records, 0 when there was nothing to do.
    pub async fn update_token_price(&self, token: &Token) -> Result<usize> {
        self.update_token_price_at(token, Utc::now()).await
    }

    async fn update_token_price_at(&self, token: &Token, now: DateTime<Utc>) -> Result<usize> {
        // Explicit overlap guard: a refresh interval shorter than one fetch
        // must not stack two runs for the same token.
        if self
            .in_flight
            .insert(token.coingecko_id.clone(), ())
            .is_some()
        {
            self.overlap_skips.fetch_add(1, Ordering::Relaxed);
            metrics::increment_price_overlap_skips();
            debug!(
                "[Prices] Update for {} already in flight, skipping this trigger",
                token.coingecko_id
            );
            return Ok(0);
        }
        let _guard = InFlightGuard {
            map: self.in_flight.clone(),
            key: token.coingecko_id.clone(),
        };

        let latest = self
            .repository
            .get_latest_timestamp(&token.coingecko_id)
            .await
            .with_context(|| format!("reading latest price timestamp for {}", token.coingecko_id))?;

        let from = latest.map(truncate_to_hour).unwrap_or(self.min_timestamp);
        let to = truncate_to_hour(now);
        if from == to {
            // no elapsed hour since the last sync, a remote query would be
            // zero-width
            debug!("[Prices] {} is up to date", token.coingecko_id);
            return Ok(0);
        }

        let points = match self
            .price_index
            .hourly_usd_price_history(&token.coingecko_id, from, to)
            .await
        {
            Ok(points) => points,
            Err(e) => {
                self.health.record_error(format!("{}: {}", token.coingecko_id, e));
                warn!(
                    "⚠️ [Prices] Fetch failed for {} [{} -> {}]: {}",
                    token.coingecko_id, from, to, e
                );
                return Err(e).context("price index fetch failed");
            }
        };

        let records: Vec<PriceRecord> = points
            .into_iter()
            .map(|point| PriceRecord {
                coingecko_id: token.coingecko_id.clone(),
                timestamp: point.timestamp,
                price_usd: point.value,
            })
            .collect();

        if records.is_empty() {
            debug!(
                "[Prices] No new points for {} in [{} -> {})",
                token.coingecko_id, from, to
            );
            self.health.record_success();
            return Ok(0);
        }

        self.repository
            .upsert_many(&records)
            .await
            .map_err(|e| {
                self.health.record_error(format!("{}: {:#}", token.coingecko_id, e));
                e
            })
            .with_context(|| format!("persisting {} prices for {}", records.len(), token.coingecko_id))?;

        let count = records.len();
        metrics::increment_prices_upserted(count as u64);
        self.stream.publish(PriceChannel::NewPrices, records);
        self.health.record_success();
        info!(
            "[Prices] {} new records for {} [{} -> {})",
            count, token.coingecko_id, from, to
        );
        Ok(count)
    }

    pub fn health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }
}

impl Drop for PriceUpdater {
    fn drop(&mut self) {
        self.stop();
    }
}
