//! Store error types.

use postvid_models::{JobId, ModelError};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Corrupt job record: {0}")]
    Corrupt(String),

    #[error("Invalid job record: {0}")]
    Model(#[from] ModelError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(job_id: &JobId) -> Self {
        Self::NotFound(job_id.clone())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
