//! Application state.

use std::sync::Arc;

use postvid_media::{LocalMediaStorage, MediaStorage, R2Config, R2MediaStorage, StorageConfig};
use postvid_queue::{
    ProgressChannel, QueueConfig, QueueDispatcher, RedisJobQueue, RedisProgressChannel,
};
use postvid_store::{JobStore, RedisJobStore, StoreConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn QueueDispatcher>,
    pub progress: Arc<dyn ProgressChannel>,
    /// Template lookup for submission-time validation
    pub storage: Arc<dyn MediaStorage>,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn QueueDispatcher>,
        progress: Arc<dyn ProgressChannel>,
        storage: Arc<dyn MediaStorage>,
    ) -> Self {
        Self {
            config,
            store,
            queue,
            progress,
            storage,
        }
    }

    /// Redis-backed state with local or R2 media storage.
    pub fn from_env(config: ApiConfig) -> Result<Self, StateError> {
        let queue_config = QueueConfig::from_env();
        let store = RedisJobStore::new(&StoreConfig::from_env())?;
        let queue = RedisJobQueue::new(queue_config.clone())?;
        let progress = RedisProgressChannel::new(&queue_config)?;

        let storage: Arc<dyn MediaStorage> = match R2Config::from_env() {
            Some(r2) => Arc::new(R2MediaStorage::new(r2, StorageConfig::from_env())),
            None => Arc::new(LocalMediaStorage::new(StorageConfig::from_env())),
        };

        Ok(Self::new(
            config,
            Arc::new(store),
            Arc::new(queue),
            Arc::new(progress),
            storage,
        ))
    }
}

/// Failure building state from the environment.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("job store: {0}")]
    Store(#[from] postvid_store::StoreError),

    #[error("queue: {0}")]
    Queue(#[from] postvid_queue::QueueError),
}
