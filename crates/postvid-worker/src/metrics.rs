//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_COMPLETED_TOTAL: &str = "postvid_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "postvid_jobs_failed_total";
    pub const CLAIMS_REJECTED_TOTAL: &str = "postvid_claims_rejected_total";
    pub const RETRIES_TOTAL: &str = "postvid_retries_total";
    pub const JOB_DURATION_SECONDS: &str = "postvid_job_duration_seconds";
    pub const JOBS_REQUEUED_TOTAL: &str = "postvid_jobs_requeued_total";
    pub const LEASES_EXPIRED_TOTAL: &str = "postvid_leases_expired_total";
}

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
}

pub fn record_job_completed(duration_secs: f64) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => "completed").record(duration_secs);
}

pub fn record_job_failed(duration_secs: f64) {
    counter!(names::JOBS_FAILED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => "failed").record(duration_secs);
}

pub fn record_retry(operation: &str) {
    counter!(names::RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

pub fn record_claim_rejected() {
    counter!(names::CLAIMS_REJECTED_TOTAL).increment(1);
}

/// `reason` is `startup` or `lease_expired`.
pub fn record_requeued(reason: &'static str) {
    counter!(names::JOBS_REQUEUED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_lease_expired() {
    counter!(names::LEASES_EXPIRED_TOTAL).increment(1);
}
