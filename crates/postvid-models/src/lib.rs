//! Shared data models for the postvid job pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their lifecycle status and leases
//! - Submission payloads (media selector, comments, render options)
//! - Commentary items at each pipeline stage and the computed schedule
//! - The status query view

pub mod comment;
pub mod error;
pub mod input;
pub mod job;
pub mod status;

pub use comment::{CommentItem, NarratedItem, Schedule, ScheduledItem};
pub use error::{ModelError, ModelResult};
pub use input::{
    AspectRatio, CommentInput, JobInput, Language, MediaSelector, RenderOptions, Theme, VoiceGender,
};
pub use job::{Job, JobId, JobStatus, Lease, WorkerId};
pub use status::JobStatusView;
