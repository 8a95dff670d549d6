//! Queue and progress channel configuration.

use std::time::Duration;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// List holding queued job IDs
    pub queue_key: String,
    /// Server-side BLPOP window; dequeue re-issues the pop after each window
    pub block_timeout: Duration,
    /// Prefix for progress keys (`{prefix}:progress:{job_id}`)
    pub key_prefix: String,
    /// Backstop TTL on progress entries
    pub progress_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            queue_key: "postvid:queue".to_string(),
            block_timeout: Duration::from_secs(5),
            key_prefix: "postvid".to_string(),
            progress_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            queue_key: std::env::var("QUEUE_KEY").unwrap_or(defaults.queue_key),
            block_timeout: std::env::var("QUEUE_BLOCK_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.block_timeout),
            key_prefix: std::env::var("STORE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            progress_ttl: std::env::var("PROGRESS_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.progress_ttl),
        }
    }
}
