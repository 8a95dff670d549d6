//! Job queue and progress channel for the postvid pipeline.
//!
//! This crate provides:
//! - FIFO job hand-off over a Redis list (RPUSH / bounded BLPOP)
//! - Per-job progress values in Redis string keys with a TTL
//! - In-memory implementations of both for tests and local runs

pub mod config;
pub mod error;
pub mod progress;
pub mod queue;

pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use progress::{MemoryProgressChannel, ProgressChannel, RedisProgressChannel};
pub use queue::{MemoryJobQueue, QueueDispatcher, RedisJobQueue};
