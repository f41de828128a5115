// SafeBlockTracker - follows the latest block considered final.
//
// Refreshes chain head minus a confirmation offset on a fixed interval.
// Readers get the last successfully computed value; a failed refresh keeps
// the previous one and is never raised to the caller.

use arc_swap::ArcSwapOption;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::chain_client::ChainHeadClient;
use crate::metrics;
use crate::status::{ComponentHealth, HealthSnapshot};
use crate::types::SafeBlock;

pub struct SafeBlockTracker {
    chain: Arc<dyn ChainHeadClient>,
    block_offset: u64,
    refresh_interval: Duration,
    current: ArcSwapOption<SafeBlock>,
    health: ComponentHealth,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl SafeBlockTracker {
    pub fn new(chain: Arc<dyn ChainHeadClient>, block_offset: u64, refresh_interval: Duration) -> Self {
        Self {
            chain,
            block_offset,
            // a zero interval would make the ticker spin
            refresh_interval: refresh_interval.max(Duration::from_millis(10)),
            current: ArcSwapOption::empty(),
            health: ComponentHealth::new(),
            refresh_task: Mutex::new(None),
        }
    }

    /// Refreshes once immediately, then keeps refreshing on the interval
    /// until [`stop`](Self::stop) is called.
    pub async fn start(self: Arc<Self>) {
        info!(
            "[SafeBlock] Starting tracker (offset: {} blocks, interval: {:?})",
            self.block_offset, self.refresh_interval
        );
        self.refresh_once().await;

        let tracker = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(tracker.refresh_interval);
            // the first tick completes immediately and is already covered by
            // the synchronous refresh above
            ticker.tick().await;
            loop {
                ticker.tick().await;
                tracker.refresh_once().await;
            }
        });

        let mut task = self
            .refresh_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = task.replace(handle) {
            previous.abort();
        }
    }

    /// Stops the periodic refresh. The last value stays readable.
    pub fn stop(&self) {
        let mut task = self
            .refresh_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = task.take() {
            handle.abort();
            info!("[SafeBlock] Tracker stopped");
        }
    }

    /// One refresh attempt. Failures keep the previous value.
    pub async fn refresh_once(&self) {
        match self.chain.current_block_number().await {
            Ok(head) => {
                let safe = head.saturating_sub(self.block_offset);
                self.current.store(Some(Arc::new(SafeBlock {
                    block_number: safe,
                    fetched_at: Utc::now(),
                })));
                self.health.record_success();
                metrics::set_safe_block_number(safe as f64);
                debug!("[SafeBlock] Head {} -> safe block {}", head, safe);
            }
            Err(e) => {
                self.health.record_error(&e);
                warn!(
                    "⚠️ [SafeBlock] Refresh failed, keeping previous value: {}",
                    e
                );
            }
        }
    }

    /// Last successfully computed safe block; None before the first
    /// successful refresh. Callers must handle the empty case explicitly.
    pub fn safe_block(&self) -> Option<SafeBlock> {
        self.current.load_full().map(|block| (*block).clone())
    }

    pub fn health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }
}

impl Drop for SafeBlockTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ClientError;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    struct ScriptedChain {
        responses: Mutex<VecDeque<Result<u64, ClientError>>>,
    }

    impl ScriptedChain {
        fn new(responses: Vec<Result<u64, ClientError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
            })
        }
    }

    #[async_trait]
    impl ChainHeadClient for ScriptedChain {
        async fn current_block_number(&self) -> Result<u64, ClientError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ClientError::Rpc("script exhausted".to_string())))
        }
    }

    #[tokio::test]
    async fn test_unknown_before_first_refresh() {
        let chain = ScriptedChain::new(vec![]);
        let tracker = SafeBlockTracker::new(chain, 100, Duration::from_secs(60));
        assert!(tracker.safe_block().is_none());
    }

    #[tokio::test]
    async fn test_refresh_applies_confirmation_offset() {
        let chain = ScriptedChain::new(vec![Ok(1_000)]);
        let tracker = SafeBlockTracker::new(chain, 100, Duration::from_secs(60));
        tracker.refresh_once().await;

        let safe = tracker.safe_block().unwrap();
        assert_eq!(safe.block_number, 900);
    }

    #[tokio::test]
    async fn test_failed_refresh_retains_previous_value() {
        let chain = ScriptedChain::new(vec![
            Ok(1_000),
            Err(ClientError::Rpc("node down".to_string())),
            Ok(1_200),
        ]);
        let tracker = SafeBlockTracker::new(chain, 100, Duration::from_secs(60));

        tracker.refresh_once().await;
        assert_eq!(tracker.safe_block().unwrap().block_number, 900);

        tracker.refresh_once().await;
        // value never decreases or disappears on failure
        assert_eq!(tracker.safe_block().unwrap().block_number, 900);
        assert!(tracker.health().last_error.is_some());

        tracker.refresh_once().await;
        assert_eq!(tracker.safe_block().unwrap().block_number, 1_100);
    }

    #[tokio::test]
    async fn test_offset_saturates_near_genesis() {
        let chain = ScriptedChain::new(vec![Ok(50)]);
        let tracker = SafeBlockTracker::new(chain, 100, Duration::from_secs(60));
        tracker.refresh_once().await;
        assert_eq!(tracker.safe_block().unwrap().block_number, 0);
    }

    #[tokio::test]
    async fn test_start_performs_immediate_refresh() {
        let chain = ScriptedChain::new(vec![Ok(5_000)]);
        let tracker = Arc::new(SafeBlockTracker::new(
            chain,
            100,
            Duration::from_secs(3_600),
        ));
        tracker.clone().start().await;
        assert_eq!(tracker.safe_block().unwrap().block_number, 4_900);
        tracker.stop();
    }
}
