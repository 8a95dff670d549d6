//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};
use crate::retry::RetryConfig;

/// Floor for the periodic intervals read from the environment.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of independent loop instances
    pub concurrency: usize,
    /// Scratch directory; each job gets its own subdirectory
    pub work_dir: PathBuf,
    /// Silence between consecutive narrations (seconds)
    pub pause_gap: f64,
    /// Target length when the request names none (seconds)
    pub default_target_secs: u32,
    /// Upper bound on any target length (seconds)
    pub max_target_secs: u32,
    /// Accept the item that crosses the target instead of dropping it
    pub allow_exceed: bool,
    /// How often a running job renews its lease
    pub lease_heartbeat_interval: Duration,
    /// How often the lease sweeper looks for expired leases
    pub lease_sweep_interval: Duration,
    /// Claims plus reclaims allowed before an expired job is failed
    pub max_attempts: u32,
    /// Batch size for startup recovery and lease sweeps
    pub recovery_batch_size: usize,
    /// Bounded wait per dequeue call, so shutdown is noticed between windows
    pub dequeue_window: Duration,
    /// Pause after an unexpected dequeue error
    pub error_backoff: Duration,
    /// Grace period for in-flight jobs on shutdown
    pub shutdown_timeout: Duration,
    /// Remote source fetch retry policy
    pub fetch_retry: RetryConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            work_dir: PathBuf::from("/tmp/postvid"),
            pause_gap: 1.0,
            default_target_secs: 60,
            max_target_secs: 180,
            allow_exceed: true,
            lease_heartbeat_interval: Duration::from_secs(30),
            lease_sweep_interval: Duration::from_secs(60),
            max_attempts: 3,
            recovery_batch_size: 100,
            dequeue_window: Duration::from_secs(5),
            error_backoff: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(30),
            fetch_retry: RetryConfig::new("fetch_source"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            concurrency: env_parse::<usize>("WORKER_CONCURRENCY")
                .unwrap_or(defaults.concurrency)
                .max(1),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            pause_gap: env_parse("WORKER_PAUSE_GAP_SECS").unwrap_or(defaults.pause_gap),
            default_target_secs: env_parse("WORKER_DEFAULT_TARGET_SECS")
                .unwrap_or(defaults.default_target_secs),
            max_target_secs: env_parse("WORKER_MAX_TARGET_SECS")
                .unwrap_or(defaults.max_target_secs),
            allow_exceed: env_parse("WORKER_ALLOW_EXCEED").unwrap_or(defaults.allow_exceed),
            lease_heartbeat_interval: env_parse("WORKER_LEASE_HEARTBEAT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.lease_heartbeat_interval)
                .max(MIN_INTERVAL),
            lease_sweep_interval: env_parse("WORKER_LEASE_SWEEP_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.lease_sweep_interval)
                .max(MIN_INTERVAL),
            max_attempts: env_parse("WORKER_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts),
            recovery_batch_size: env_parse("WORKER_RECOVERY_BATCH")
                .unwrap_or(defaults.recovery_batch_size),
            dequeue_window: env_parse("QUEUE_BLOCK_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.dequeue_window),
            error_backoff: defaults.error_backoff,
            shutdown_timeout: env_parse("WORKER_SHUTDOWN_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            fetch_retry: defaults
                .fetch_retry
                .with_max_retries(env_parse("FETCH_MAX_RETRIES").unwrap_or(3)),
        }
    }

    /// Check the lease timing against the store's lease TTL.
    ///
    /// A heartbeat slower than the TTL lets live jobs be reclaimed mid-run.
    pub fn validate(&self, lease_ttl: Duration) -> WorkerResult<()> {
        if self.lease_heartbeat_interval.is_zero() || self.lease_sweep_interval.is_zero() {
            return Err(WorkerError::config_error(
                "lease heartbeat and sweep intervals must be non-zero",
            ));
        }
        if self.lease_heartbeat_interval >= lease_ttl {
            return Err(WorkerError::config_error(format!(
                "lease heartbeat interval {:?} must be shorter than the lease TTL {:?}",
                self.lease_heartbeat_interval, lease_ttl
            )));
        }
        Ok(())
    }
}
