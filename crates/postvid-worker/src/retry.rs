//! Retry utilities with exponential backoff and jitter.
//!
//! Wraps unreliable external calls (remote media fetches). The controller is
//! generic over the operation and over a classifier deciding which failures
//! are worth another attempt; it knows nothing about what is being called.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (not including the initial attempt).
    pub max_retries: u32,
    /// Base delay, doubled each attempt.
    pub base_delay: Duration,
    /// Upper bound of the uniform random delay added to each sleep.
    pub jitter: Duration,
    /// Operation name for logging.
    pub operation_name: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            jitter: Duration::from_secs(1),
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with the given operation name.
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Backoff before retry number `attempt + 1`, attempt counted from 0:
    /// `base_delay * 2^attempt` without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Backoff plus `uniform(0, jitter)`.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            let secs = rand::rng().random_range(0.0..self.jitter.as_secs_f64());
            Duration::from_secs_f64(secs)
        };
        self.backoff(attempt).saturating_add(jitter)
    }
}

/// Failure of a retried operation.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The classifier marked the failure non-retryable; no sleep happened.
    #[error("{0}")]
    Terminal(E),

    /// Every attempt failed with a retryable error.
    #[error("service unavailable after {attempts} attempts: {last}")]
    ServiceUnavailable { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::ServiceUnavailable { .. })
    }
}

/// Run `operation`, retrying failures that `is_retryable` accepts.
///
/// After a retryable failure on attempt `n` (from 0) with `n < max_retries`,
/// sleeps `base_delay * 2^n + uniform(0, jitter)` and tries again.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    config: &RetryConfig,
    is_retryable: C,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !is_retryable(&e) => {
                debug!(
                    "{} failed with a non-retryable error: {}",
                    config.operation_name, e
                );
                return Err(RetryError::Terminal(e));
            }
            Err(e) if attempt < config.max_retries => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    operation = %config.operation_name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying: {}",
                    e
                );
                crate::metrics::record_retry(&config.operation_name);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(RetryError::ServiceUnavailable {
                    attempts: attempt + 1,
                    last: e,
                })
            }
        }
    }
}

/// State tracker for repeated background operations that may fail.
///
/// Suppresses log spam after a run of consecutive failures.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive_failures: u32,
    max_logged_failures: u32,
}

impl FailureTracker {
    pub fn new(max_logged_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_logged_failures,
        }
    }

    /// Record a success (resets the count).
    pub fn record_success(&mut self) {
        if self.consecutive_failures > self.max_logged_failures {
            debug!(
                "Operation recovered after {} consecutive failures",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
    }

    /// Record a failure. Returns `true` if this one should be logged.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;
        if self.consecutive_failures == self.max_logged_failures + 1 {
            warn!(
                "Suppressing further failure logs after {} consecutive failures",
                self.max_logged_failures
            );
        }
        self.consecutive_failures <= self.max_logged_failures
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }
}
