//! Job queue on a Redis list.
//!
//! Entries are bare job ID strings. Producers `RPUSH` to the tail and workers
//! `BLPOP` from the head, so delivery order is submission order and each entry
//! reaches exactly one successful pop.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

use postvid_models::JobId;

use crate::config::QueueConfig;
use crate::error::QueueResult;

/// FIFO hand-off of job IDs from submitters to workers.
#[async_trait]
pub trait QueueDispatcher: Send + Sync {
    /// Append a job ID to the tail.
    async fn enqueue(&self, job_id: &JobId) -> QueueResult<()>;

    /// Pop the head, waiting at most `wait` for an entry to arrive.
    ///
    /// Dropping this future after the pop was issued can lose the entry, so
    /// shutdown-aware callers poll in bounded windows instead of cancelling.
    async fn try_dequeue(&self, wait: Duration) -> QueueResult<Option<JobId>>;

    /// Pop the head, suspending until an entry exists.
    async fn dequeue(&self) -> QueueResult<JobId>;

    /// Number of queued entries.
    async fn len(&self) -> QueueResult<usize>;

    /// Check the backing store is reachable.
    async fn ping(&self) -> QueueResult<()>;
}

/// Queue on a Redis list.
pub struct RedisJobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisJobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }
}

#[async_trait]
impl QueueDispatcher for RedisJobQueue {
    async fn enqueue(&self, job_id: &JobId) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let depth: usize = redis::cmd("RPUSH")
            .arg(&self.config.queue_key)
            .arg(job_id.as_str())
            .query_async(&mut conn)
            .await?;

        info!(job_id = %job_id, depth, "Enqueued job");
        Ok(())
    }

    async fn try_dequeue(&self, wait: Duration) -> QueueResult<Option<JobId>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // BLPOP treats 0 as "forever"; keep every window bounded.
        let block_secs = wait.as_secs().max(1);
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(&self.config.queue_key)
            .arg(block_secs)
            .query_async(&mut conn)
            .await?;

        Ok(popped.map(|(_, id)| {
            debug!(job_id = %id, "Dequeued job");
            JobId::from(id)
        }))
    }

    async fn dequeue(&self) -> QueueResult<JobId> {
        loop {
            if let Some(id) = self.try_dequeue(self.config.block_timeout).await? {
                return Ok(id);
            }
        }
    }

    async fn len(&self) -> QueueResult<usize> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: usize = redis::cmd("LLEN")
            .arg(&self.config.queue_key)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

/// In-process queue for tests and local runs.
#[derive(Default)]
pub struct MemoryJobQueue {
    entries: Mutex<VecDeque<JobId>>,
    notify: Notify,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueDispatcher for MemoryJobQueue {
    async fn enqueue(&self, job_id: &JobId) -> QueueResult<()> {
        self.entries.lock().await.push_back(job_id.clone());
        self.notify.notify_one();
        Ok(())
    }

    async fn try_dequeue(&self, wait: Duration) -> QueueResult<Option<JobId>> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let notified = self.notify.notified();
            if let Some(id) = self.entries.lock().await.pop_front() {
                return Ok(Some(id));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn dequeue(&self) -> QueueResult<JobId> {
        loop {
            let notified = self.notify.notified();
            if let Some(id) = self.entries.lock().await.pop_front() {
                return Ok(id);
            }
            notified.await;
        }
    }

    async fn len(&self) -> QueueResult<usize> {
        Ok(self.entries.lock().await.len())
    }

    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}
