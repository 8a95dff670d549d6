//! Job store configuration.

use std::time::Duration;

/// Job store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Redis URL
    pub redis_url: String,
    /// Prefix for every key the store writes
    pub key_prefix: String,
    /// Lease granted by claim, reclaim and renew
    pub lease_ttl: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "postvid".to_string(),
            lease_ttl: Duration::from_secs(120),
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("STORE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            lease_ttl: std::env::var("JOB_LEASE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.lease_ttl),
        }
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    pub fn lease_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.lease_ttl).unwrap_or(chrono::Duration::seconds(120))
    }
}
