//! Crash recovery: re-queue orphaned pending jobs and sweep expired leases.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use postvid_models::JobId;
use postvid_queue::{ProgressChannel, QueueDispatcher};
use postvid_store::JobStore;

use crate::error::WorkerResult;
use crate::metrics;
use crate::retry::FailureTracker;

/// Message recorded on jobs whose worker vanished too many times.
pub const LEASE_EXPIRED_ERROR: &str = "worker lease expired";

/// How long a re-queued expired job waits before it is sent again.
pub const DEFAULT_RESEND_AFTER: Duration = Duration::from_secs(300);

/// Startup routine re-queuing jobs a previous process left pending.
///
/// Duplicate queue entries are harmless: only one `claim` can succeed.
pub struct RecoverySweeper {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn QueueDispatcher>,
    batch_size: usize,
}

impl RecoverySweeper {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn QueueDispatcher>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            queue,
            batch_size,
        }
    }

    /// Enqueue up to one batch of pending jobs, oldest first.
    pub async fn requeue_pending(&self) -> WorkerResult<usize> {
        let pending = self.store.list_pending(self.batch_size).await?;
        for job_id in &pending {
            self.queue.enqueue(job_id).await?;
            metrics::record_requeued("startup");
            debug!(job_id = %job_id, "Re-queued pending job");
        }

        if !pending.is_empty() {
            info!("Recovered {} pending jobs", pending.len());
        }
        Ok(pending.len())
    }
}

/// Outcome of one lease sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired jobs put back on the queue for a reclaim
    pub requeued: usize,
    /// Expired jobs failed after exhausting their attempts
    pub expired: usize,
    /// Expired jobs skipped because their entry is still on the queue
    pub already_queued: usize,
}

/// When an expired job was last put back on the queue.
#[derive(Debug, Clone, Copy)]
struct Requeued {
    attempts: u32,
    at: Instant,
}

/// Periodic check for `processing` jobs whose worker stopped heartbeating.
pub struct LeaseSweeper {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn QueueDispatcher>,
    progress: Arc<dyn ProgressChannel>,
    max_attempts: u32,
    batch_size: usize,
    resend_after: Duration,
    requeued: Mutex<HashMap<JobId, Requeued>>,
}

impl LeaseSweeper {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn QueueDispatcher>,
        progress: Arc<dyn ProgressChannel>,
        max_attempts: u32,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            queue,
            progress,
            max_attempts,
            batch_size,
            resend_after: DEFAULT_RESEND_AFTER,
            requeued: Mutex::new(HashMap::new()),
        }
    }

    /// Re-send an expired job that is still unclaimed after `resend_after`.
    pub fn with_resend_after(mut self, resend_after: Duration) -> Self {
        self.resend_after = resend_after;
        self
    }

    /// Re-queue or fail every expired job in one batch.
    ///
    /// A job is re-queued once per lease expiry: later sweeps skip it until a
    /// reclaim bumps its attempts or `resend_after` passes.
    pub async fn sweep(&self) -> WorkerResult<SweepReport> {
        let mut report = SweepReport::default();
        let expired = self.store.list_expired(self.batch_size).await?;

        let mut requeued = self.requeued.lock().await;
        requeued.retain(|id, _| expired.iter().any(|job| &job.id == id));

        for job in expired {
            if job.attempts < self.max_attempts {
                let pending = requeued.get(&job.id).is_some_and(|r| {
                    r.attempts == job.attempts && r.at.elapsed() < self.resend_after
                });
                if pending {
                    report.already_queued += 1;
                    continue;
                }

                self.queue.enqueue(&job.id).await?;
                requeued.insert(
                    job.id.clone(),
                    Requeued {
                        attempts: job.attempts,
                        at: Instant::now(),
                    },
                );
                metrics::record_requeued("lease_expired");
                info!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    "Lease expired, re-queued for reclaim"
                );
                report.requeued += 1;
                continue;
            }

            requeued.remove(&job.id);
            if self.store.expire(&job.id, LEASE_EXPIRED_ERROR).await? {
                metrics::record_lease_expired();
                warn!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    "Lease expired after max attempts, job failed"
                );
                if let Err(e) = self.progress.clear(&job.id).await {
                    warn!(job_id = %job.id, "Failed to clear progress: {}", e);
                }
                report.expired += 1;
            }
        }

        Ok(report)
    }

    /// Sweep every `interval` until shutdown is signalled.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut failures = FailureTracker::new(3);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(report) => {
                            failures.record_success();
                            if report != SweepReport::default() {
                                debug!(?report, "Lease sweep finished");
                            }
                        }
                        Err(e) => {
                            if failures.record_failure() {
                                warn!(
                                    failures = failures.failure_count(),
                                    "Lease sweep failed: {}", e
                                );
                            }
                        }
                    }
                }
            }
        }
        debug!("Lease sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postvid_models::{CommentInput, JobInput, MediaSelector, WorkerId};
    use postvid_queue::{MemoryJobQueue, MemoryProgressChannel};
    use postvid_store::{MemoryJobStore, StoreConfig};

    fn input() -> JobInput {
        JobInput::new(
            MediaSelector::template("parkour.mp4"),
            vec![CommentInput::new("alice", "hello")],
        )
    }

    /// Store whose leases lapse immediately.
    fn expiring_store() -> Arc<MemoryJobStore> {
        let config = StoreConfig::default().with_lease_ttl(Duration::ZERO);
        Arc::new(MemoryJobStore::new(&config))
    }

    #[tokio::test]
    async fn test_requeue_pending_oldest_first() {
        let store = Arc::new(MemoryJobStore::default());
        let queue = Arc::new(MemoryJobQueue::new());

        let first = store.submit(input()).await.unwrap();
        let second = store.submit(input()).await.unwrap();
        let claimed = store.submit(input()).await.unwrap();
        store
            .claim(&claimed, &WorkerId::from("w"))
            .await
            .unwrap();

        let sweeper = RecoverySweeper::new(store.clone(), queue.clone(), 100);
        assert_eq!(sweeper.requeue_pending().await.unwrap(), 2);

        assert_eq!(queue.len().await.unwrap(), 2);
        let window = Duration::from_millis(10);
        assert_eq!(queue.try_dequeue(window).await.unwrap(), Some(first));
        assert_eq!(queue.try_dequeue(window).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_requeue_respects_batch_size() {
        let store = Arc::new(MemoryJobStore::default());
        let queue = Arc::new(MemoryJobQueue::new());
        for _ in 0..5 {
            store.submit(input()).await.unwrap();
        }

        let sweeper = RecoverySweeper::new(store, queue.clone(), 3);
        assert_eq!(sweeper.requeue_pending().await.unwrap(), 3);
        assert_eq!(queue.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_expired_lease_is_requeued_below_max_attempts() {
        let store = expiring_store();
        let queue = Arc::new(MemoryJobQueue::new());
        let progress = Arc::new(MemoryProgressChannel::new());

        let job_id = store.submit(input()).await.unwrap();
        assert!(store.claim(&job_id, &WorkerId::from("w1")).await.unwrap());

        let sweeper = LeaseSweeper::new(store.clone(), queue.clone(), progress, 3, 100);
        let report = sweeper.sweep().await.unwrap();

        assert_eq!(report, SweepReport { requeued: 1, ..Default::default() });
        assert_eq!(queue.len().await.unwrap(), 1);
        assert!(store.reclaim(&job_id, &WorkerId::from("w2")).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lease_fails_job_at_max_attempts() {
        let store = expiring_store();
        let queue = Arc::new(MemoryJobQueue::new());
        let progress = Arc::new(MemoryProgressChannel::new());

        let job_id = store.submit(input()).await.unwrap();
        assert!(store.claim(&job_id, &WorkerId::from("w1")).await.unwrap());
        assert!(store.reclaim(&job_id, &WorkerId::from("w2")).await.unwrap());
        progress.set(&job_id, 40.0).await.unwrap();

        let sweeper = LeaseSweeper::new(store.clone(), queue.clone(), progress.clone(), 2, 100);
        let report = sweeper.sweep().await.unwrap();

        assert_eq!(report, SweepReport { expired: 1, ..Default::default() });
        assert_eq!(queue.len().await.unwrap(), 0);

        let job = store.get(&job_id).await.unwrap();
        assert_eq!(job.status, postvid_models::JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some(LEASE_EXPIRED_ERROR));
        assert_eq!(progress.get(&job_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_live_leases_are_left_alone() {
        let store = Arc::new(MemoryJobStore::default());
        let queue = Arc::new(MemoryJobQueue::new());
        let progress = Arc::new(MemoryProgressChannel::new());

        let job_id = store.submit(input()).await.unwrap();
        assert!(store.claim(&job_id, &WorkerId::from("w1")).await.unwrap());

        let sweeper = LeaseSweeper::new(store, queue.clone(), progress, 3, 100);
        assert_eq!(sweeper.sweep().await.unwrap(), SweepReport::default());
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_job_is_requeued_once_per_expiry() {
        let store = expiring_store();
        let queue = Arc::new(MemoryJobQueue::new());
        let progress = Arc::new(MemoryProgressChannel::new());

        let job_id = store.submit(input()).await.unwrap();
        assert!(store.claim(&job_id, &WorkerId::from("w1")).await.unwrap());

        let sweeper = LeaseSweeper::new(store.clone(), queue.clone(), progress, 3, 100);
        assert_eq!(sweeper.sweep().await.unwrap().requeued, 1);

        let again = sweeper.sweep().await.unwrap();
        assert_eq!(again, SweepReport { already_queued: 1, ..Default::default() });
        assert_eq!(queue.len().await.unwrap(), 1);

        // A reclaim that lapses again counts as a new expiry
        assert!(store.reclaim(&job_id, &WorkerId::from("w2")).await.unwrap());
        assert_eq!(sweeper.sweep().await.unwrap().requeued, 1);
        assert_eq!(queue.len().await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclaimed_requeue_is_resent_after_interval() {
        let store = expiring_store();
        let queue = Arc::new(MemoryJobQueue::new());
        let progress = Arc::new(MemoryProgressChannel::new());

        let job_id = store.submit(input()).await.unwrap();
        assert!(store.claim(&job_id, &WorkerId::from("w1")).await.unwrap());

        let sweeper = LeaseSweeper::new(store, queue.clone(), progress, 3, 100)
            .with_resend_after(Duration::from_secs(60));
        assert_eq!(sweeper.sweep().await.unwrap().requeued, 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(sweeper.sweep().await.unwrap().already_queued, 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(sweeper.sweep().await.unwrap().requeued, 1);
        assert_eq!(queue.len().await.unwrap(), 2);
    }
}
