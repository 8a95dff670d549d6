//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Enqueue failed: {0}")]
    EnqueueFailed(String),

    #[error("Dequeue failed: {0}")]
    DequeueFailed(String),

    #[error("Invalid progress value: {0}")]
    InvalidProgress(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl QueueError {
    pub fn enqueue_failed(msg: impl Into<String>) -> Self {
        Self::EnqueueFailed(msg.into())
    }

    pub fn dequeue_failed(msg: impl Into<String>) -> Self {
        Self::DequeueFailed(msg.into())
    }
}
