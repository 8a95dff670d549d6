//! Worker error types.

use thiserror::Error;

use postvid_media::MediaError;

use crate::retry::RetryError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Source fetch failed: {0}")]
    Fetch(#[from] RetryError<MediaError>),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("worker panicked: {0}")]
    Panicked(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Store error: {0}")]
    Store(#[from] postvid_store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] postvid_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Convert a failed job task into an error recorded on the job.
    pub fn from_join(err: tokio::task::JoinError) -> Self {
        if !err.is_panic() {
            return Self::Panicked("job task cancelled".to_string());
        }
        let payload = err.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked(message)
    }

    /// Whether the error came from persistence rather than the job itself.
    pub fn is_persistence(&self) -> bool {
        matches!(self, WorkerError::Store(_))
    }
}
