// JobQueue - bounded runner for named units of asynchronous work.
//
// `add` never blocks the caller; jobs wait for one of `max_concurrent_jobs`
// execution slots in arrival order. A failing or panicking job is logged and
// counted, nothing else: no retry, no priorities, no cancellation.

use futures::future::BoxFuture;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::metrics;

/// Counters exposed for the status snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueStats {
    /// Jobs waiting for an execution slot.
    pub queued: usize,
    /// Jobs currently executing.
    pub in_flight: usize,
    pub succeeded: u64,
    pub failed: u64,
}

pub struct JobQueue {
    semaphore: Arc<Semaphore>,
    max_concurrent_jobs: usize,
    queued: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    succeeded: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl JobQueue {
    pub fn new(max_concurrent_jobs: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            max_concurrent_jobs: max_concurrent_jobs.max(1),
            queued: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            succeeded: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs
    }

    /// Enqueues a named unit of work and returns immediately.
    ///
    /// The name exists for logging only; it does not deduplicate. The same
    /// name may be enqueued any number of times.
    pub fn add<F>(&self, name: impl Into<String>, job: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.add_boxed(name.into(), Box::pin(job));
    }

    fn add_boxed(&self, name: String, job: BoxFuture<'static, anyhow::Result<()>>) {
        let semaphore = self.semaphore.clone();
        let queued = self.queued.clone();
        let in_flight = self.in_flight.clone();
        let succeeded = self.succeeded.clone();
        let failed = self.failed.clone();

        queued.fetch_add(1, Ordering::Relaxed);
        metrics::set_job_queue_queued(queued.load(Ordering::Relaxed) as f64);

        tokio::spawn(async move {
            // Fair semaphore: waiters are admitted in arrival order.
            let permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return, // queue dropped, nothing to run against
            };
            // in_flight rises before queued falls so is_idle never observes
            // a job in neither counter
            in_flight.fetch_add(1, Ordering::Relaxed);
            queued.fetch_sub(1, Ordering::Relaxed);
            metrics::set_job_queue_queued(queued.load(Ordering::Relaxed) as f64);
            metrics::set_job_queue_in_flight(in_flight.load(Ordering::Relaxed) as f64);
            debug!("[JobQueue] Job '{}' started", name);

            // Run the job on its own task so a panic is contained here
            // instead of tearing down this slot-management task.
            let handle = tokio::spawn(job);
            match handle.await {
                Ok(Ok(())) => {
                    succeeded.fetch_add(1, Ordering::Relaxed);
                    debug!("[JobQueue] Job '{}' finished", name);
                }
                Ok(Err(e)) => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    metrics::increment_job_queue_failed();
                    warn!("⚠️ [JobQueue] Job '{}' failed: {:#}", name, e);
                }
                Err(e) => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    metrics::increment_job_queue_failed();
                    warn!("⚠️ [JobQueue] Job '{}' panicked: {}", name, e);
                }
            }

            in_flight.fetch_sub(1, Ordering::Relaxed);
            metrics::set_job_queue_in_flight(in_flight.load(Ordering::Relaxed) as f64);
            drop(permit);
        });
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.queued.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Whether any job is queued or executing.
    pub fn is_idle(&self) -> bool {
        self.queued.load(Ordering::Relaxed) == 0 && self.in_flight.load(Ordering::Relaxed) == 0
    }
}
