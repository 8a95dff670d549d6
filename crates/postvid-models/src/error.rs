//! Model error types.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Unknown job status: {0}")]
    UnknownStatus(String),

    #[error("Inconsistent job {job_id}: {reason}")]
    Inconsistent { job_id: String, reason: String },
}
