//! Postvid worker.
//!
//! This crate provides:
//! - The duration allocator placing narrated comments on the timeline
//! - A generic retry controller with exponential backoff and jitter
//! - The render pipeline delegating to media collaborators
//! - The job executor running claim-guarded worker loops with leases
//! - Startup recovery and the expired-lease sweeper

pub mod allocator;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod recovery;
pub mod retry;

pub use allocator::{allocate, output_length, TargetPolicy};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use pipeline::{Collaborators, RenderPipeline};
pub use recovery::{LeaseSweeper, RecoverySweeper, SweepReport};
pub use retry::{retry_with_backoff, RetryConfig, RetryError};
