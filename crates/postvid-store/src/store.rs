//! Job store trait.

use async_trait::async_trait;

use postvid_models::{Job, JobId, JobInput, WorkerId};

use crate::error::StoreResult;

/// Durable record of every job and its lifecycle state.
///
/// Every mutation is a single atomic conditional write: callers never read a
/// status and then write based on it. Methods do not retry; transient
/// failures surface as `StoreError` and the caller decides.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new `pending` job and return its ID.
    async fn submit(&self, input: JobInput) -> StoreResult<JobId>;

    /// Move `pending -> processing`, granting `owner` a fresh lease.
    ///
    /// Returns `false` with no state change when the job is unknown or not
    /// pending.
    async fn claim(&self, job_id: &JobId, owner: &WorkerId) -> StoreResult<bool>;

    /// Move `processing -> completed` if `owner` holds the lease.
    async fn complete(&self, job_id: &JobId, owner: &WorkerId, output_ref: &str)
        -> StoreResult<bool>;

    /// Move `processing -> failed` if `owner` holds the lease.
    async fn fail(&self, job_id: &JobId, owner: &WorkerId, error: &str) -> StoreResult<bool>;

    /// Fetch a job. `NotFound` if absent.
    async fn get(&self, job_id: &JobId) -> StoreResult<Job>;

    /// Extend the lease held by `owner`.
    async fn renew_lease(&self, job_id: &JobId, owner: &WorkerId) -> StoreResult<bool>;

    /// Take over a `processing` job whose lease has lapsed.
    ///
    /// The status stays `processing`; the owner changes and attempts grows.
    async fn reclaim(&self, job_id: &JobId, owner: &WorkerId) -> StoreResult<bool>;

    /// Fail a `processing` job whose lease has lapsed, whoever owned it.
    async fn expire(&self, job_id: &JobId, error: &str) -> StoreResult<bool>;

    /// Pending job IDs, oldest first.
    async fn list_pending(&self, limit: usize) -> StoreResult<Vec<JobId>>;

    /// Processing jobs whose lease has lapsed.
    async fn list_expired(&self, limit: usize) -> StoreResult<Vec<Job>>;

    /// Check the backing store is reachable.
    async fn ping(&self) -> StoreResult<()>;
}
