//! Business logic behind the handlers.

pub mod jobs;

pub use jobs::{job_status, submit_job};
