//! In-process job store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use postvid_models::{Job, JobId, JobInput, JobStatus, Lease, WorkerId};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::JobStore;

#[derive(Default)]
struct State {
    jobs: HashMap<JobId, Job>,
    /// Submission order, for oldest-first listing
    order: Vec<JobId>,
}

/// Job store held in memory behind one lock.
///
/// Used by tests and single-process local runs. Each operation holds the lock
/// for its whole check-and-write, which gives the same atomicity as the Redis
/// scripts.
pub struct MemoryJobStore {
    state: Mutex<State>,
    lease_ttl: chrono::Duration,
}

impl MemoryJobStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            state: Mutex::new(State::default()),
            lease_ttl: config.lease_ttl_chrono(),
        }
    }

    fn lease_for(&self, owner: &WorkerId) -> Lease {
        Lease {
            owner: owner.clone(),
            expires_at: Utc::now() + self.lease_ttl,
        }
    }

    async fn finish(
        &self,
        job_id: &JobId,
        owner: &WorkerId,
        next: JobStatus,
        value: &str,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let Some(job) = state.jobs.get_mut(job_id) else {
            warn!(job_id = %job_id, status = %next, "Terminal write for unknown job ignored");
            return Ok(false);
        };

        if !job.status.can_transition_to(next) || !job.is_owned_by(owner) {
            warn!(
                job_id = %job_id,
                owner = %owner,
                current = %job.status,
                status = %next,
                "Terminal write ignored: job not processing under this owner"
            );
            return Ok(false);
        }

        match next {
            JobStatus::Completed => job.output_ref = Some(value.to_string()),
            _ => job.error = Some(value.to_string()),
        }
        job.status = next;
        job.lease = None;
        job.updated_at = Utc::now();
        Ok(true)
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn submit(&self, input: JobInput) -> StoreResult<JobId> {
        let job = Job::new(input);
        let id = job.id.clone();

        let mut state = self.state.lock().await;
        state.order.push(id.clone());
        state.jobs.insert(id.clone(), job);

        debug!(job_id = %id, "Job submitted");
        Ok(id)
    }

    async fn claim(&self, job_id: &JobId, owner: &WorkerId) -> StoreResult<bool> {
        let lease = self.lease_for(owner);
        let mut state = self.state.lock().await;
        let Some(job) = state.jobs.get_mut(job_id) else {
            return Ok(false);
        };
        if !job.status.can_transition_to(JobStatus::Processing) {
            return Ok(false);
        }

        job.status = JobStatus::Processing;
        job.lease = Some(lease);
        job.attempts += 1;
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn complete(
        &self,
        job_id: &JobId,
        owner: &WorkerId,
        output_ref: &str,
    ) -> StoreResult<bool> {
        self.finish(job_id, owner, JobStatus::Completed, output_ref)
            .await
    }

    async fn fail(&self, job_id: &JobId, owner: &WorkerId, error: &str) -> StoreResult<bool> {
        self.finish(job_id, owner, JobStatus::Failed, error).await
    }

    async fn get(&self, job_id: &JobId) -> StoreResult<Job> {
        let state = self.state.lock().await;
        let job = state
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(job_id))?;
        job.check_consistency()?;
        Ok(job)
    }

    async fn renew_lease(&self, job_id: &JobId, owner: &WorkerId) -> StoreResult<bool> {
        let lease = self.lease_for(owner);
        let mut state = self.state.lock().await;
        match state.jobs.get_mut(job_id) {
            Some(job) if job.status == JobStatus::Processing && job.is_owned_by(owner) => {
                job.lease = Some(lease);
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reclaim(&self, job_id: &JobId, owner: &WorkerId) -> StoreResult<bool> {
        let now = Utc::now();
        let lease = self.lease_for(owner);
        let mut state = self.state.lock().await;
        match state.jobs.get_mut(job_id) {
            Some(job) if job.is_lease_expired(now) => {
                job.lease = Some(lease);
                job.attempts += 1;
                job.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire(&self, job_id: &JobId, error: &str) -> StoreResult<bool> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        match state.jobs.get_mut(job_id) {
            Some(job) if job.is_lease_expired(now) => {
                debug_assert!(job.status.can_transition_to(JobStatus::Failed));
                job.status = JobStatus::Failed;
                job.error = Some(error.to_string());
                job.lease = None;
                job.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_pending(&self, limit: usize) -> StoreResult<Vec<JobId>> {
        let state = self.state.lock().await;
        Ok(state
            .order
            .iter()
            .filter(|id| {
                state
                    .jobs
                    .get(*id)
                    .map(|job| job.status == JobStatus::Pending)
                    .unwrap_or(false)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_expired(&self, limit: usize) -> StoreResult<Vec<Job>> {
        let now = Utc::now();
        let state = self.state.lock().await;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.jobs.get(id))
            .filter(|job| job.is_lease_expired(now))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
