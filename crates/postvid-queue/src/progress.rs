//! Per-job progress values.
//!
//! Progress is ephemeral: one key per job holding the latest percentage as a
//! decimal string. Only the worker holding the job's lease writes it; status
//! queries read it. Entries are cleared on the terminal transition and carry a
//! TTL in case a worker dies before clearing.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::debug;

use postvid_models::JobId;

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};

/// Last-write-wins percent-complete store keyed by job ID.
#[async_trait]
pub trait ProgressChannel: Send + Sync {
    /// Record progress in `[0, 100]`.
    async fn set(&self, job_id: &JobId, percent: f64) -> QueueResult<()>;

    /// Latest recorded progress, if any.
    async fn get(&self, job_id: &JobId) -> QueueResult<Option<f64>>;

    /// Drop the entry for a job.
    async fn clear(&self, job_id: &JobId) -> QueueResult<()>;
}

fn checked_percent(percent: f64) -> QueueResult<f64> {
    if !percent.is_finite() {
        return Err(QueueError::InvalidProgress(percent.to_string()));
    }
    Ok(percent.clamp(0.0, 100.0))
}

/// Progress channel on plain Redis string keys.
pub struct RedisProgressChannel {
    client: redis::Client,
    key_prefix: String,
    ttl: Duration,
}

impl RedisProgressChannel {
    pub fn new(config: &QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            key_prefix: config.key_prefix.clone(),
            ttl: config.progress_ttl,
        })
    }

    /// Key holding a job's progress.
    pub fn key(&self, job_id: &JobId) -> String {
        format!("{}:progress:{}", self.key_prefix, job_id)
    }
}

#[async_trait]
impl ProgressChannel for RedisProgressChannel {
    async fn set(&self, job_id: &JobId, percent: f64) -> QueueResult<()> {
        let percent = checked_percent(percent)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        conn.set_ex::<_, _, ()>(self.key(job_id), percent.to_string(), self.ttl.as_secs().max(1))
            .await?;

        debug!(job_id = %job_id, percent, "Progress updated");
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> QueueResult<Option<f64>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(self.key(job_id)).await?;

        raw.map(|s| {
            s.parse::<f64>()
                .map_err(|_| QueueError::InvalidProgress(s.clone()))
        })
        .transpose()
    }

    async fn clear(&self, job_id: &JobId) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(self.key(job_id)).await?;
        Ok(())
    }
}

/// In-process progress channel for tests and local runs.
#[derive(Default)]
pub struct MemoryProgressChannel {
    values: RwLock<HashMap<JobId, f64>>,
}

impl MemoryProgressChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressChannel for MemoryProgressChannel {
    async fn set(&self, job_id: &JobId, percent: f64) -> QueueResult<()> {
        let percent = checked_percent(percent)?;
        self.values.write().await.insert(job_id.clone(), percent);
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> QueueResult<Option<f64>> {
        Ok(self.values.read().await.get(job_id).copied())
    }

    async fn clear(&self, job_id: &JobId) -> QueueResult<()> {
        self.values.write().await.remove(job_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_key_format() {
        let channel = RedisProgressChannel::new(&QueueConfig::default()).unwrap();
        assert_eq!(
            channel.key(&JobId::from_string("abc")),
            "postvid:progress:abc"
        );
    }

    #[tokio::test]
    async fn test_last_write_wins_and_clear() {
        let channel = MemoryProgressChannel::new();
        let id = JobId::from_string("j1");

        assert_eq!(channel.get(&id).await.unwrap(), None);
        channel.set(&id, 12.0).await.unwrap();
        channel.set(&id, 48.5).await.unwrap();
        assert_eq!(channel.get(&id).await.unwrap(), Some(48.5));

        channel.clear(&id).await.unwrap();
        assert_eq!(channel.get(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_values_are_clamped() {
        let channel = MemoryProgressChannel::new();
        let id = JobId::from_string("j1");

        channel.set(&id, 130.0).await.unwrap();
        assert_eq!(channel.get(&id).await.unwrap(), Some(100.0));
        assert!(channel.set(&id, f64::NAN).await.is_err());
    }
}
