//! Structured job logging utilities.
//!
//! Consistent lifecycle logging for jobs, tagged with the job id, the stage
//! being run and the worker that owns the job.

use tracing::{error, info, warn, Span};

use postvid_models::{JobId, WorkerId};

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    worker: String,
    stage: String,
}

impl JobLogger {
    /// Create a logger for `job_id` owned by `worker`.
    pub fn new(job_id: &JobId, worker: &WorkerId) -> Self {
        Self {
            job_id: job_id.to_string(),
            worker: worker.as_str().to_string(),
            stage: "claim".to_string(),
        }
    }

    /// Move to the next pipeline stage.
    pub fn stage(&mut self, stage: &str) {
        self.stage = stage.to_string();
        info!(
            job_id = %self.job_id,
            worker = %self.worker,
            stage = %self.stage,
            "Job stage started"
        );
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            worker = %self.worker,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            stage = %self.stage,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            stage = %self.stage,
            "Job warning: {}", message
        );
    }

    /// Log a failure, naming the stage it happened in.
    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            worker = %self.worker,
            stage = %self.stage,
            "Job failed: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            worker = %self.worker,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn current_stage(&self) -> &str {
        &self.stage
    }

    /// Span wrapping the whole pipeline run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, worker = %self.worker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_tracks_stage() {
        let job_id = JobId::new();
        let worker = WorkerId::from("worker-a");
        let mut logger = JobLogger::new(&job_id, &worker);

        assert_eq!(logger.job_id(), job_id.as_str());
        assert_eq!(logger.current_stage(), "claim");

        logger.stage("narrate");
        assert_eq!(logger.current_stage(), "narrate");
    }
}
