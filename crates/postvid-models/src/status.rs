//! Status query view.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{Job, JobId, JobStatus};

/// What a status query returns for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Percent complete; always 0 unless processing
    pub percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,
}

impl JobStatusView {
    /// Combine a stored job with the progress channel reading.
    ///
    /// The progress value only counts while the job is processing.
    pub fn from_job(job: &Job, progress: Option<f64>) -> Self {
        let percentage = match job.status {
            JobStatus::Processing => progress.unwrap_or(0.0).clamp(0.0, 100.0),
            _ => 0.0,
        };

        Self {
            job_id: job.id.clone(),
            status: job.status,
            percentage,
            error: job.error.clone(),
            output_ref: job.output_ref.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{CommentInput, JobInput, MediaSelector};

    fn job() -> Job {
        Job::new(JobInput::new(
            MediaSelector::template("a.mp4"),
            vec![CommentInput::new("u", "t")],
        ))
    }

    #[test]
    fn test_percentage_only_while_processing() {
        let mut job = job();
        assert_eq!(JobStatusView::from_job(&job, Some(40.0)).percentage, 0.0);

        job.status = JobStatus::Processing;
        assert_eq!(JobStatusView::from_job(&job, Some(40.0)).percentage, 40.0);
        assert_eq!(JobStatusView::from_job(&job, None).percentage, 0.0);
        assert_eq!(JobStatusView::from_job(&job, Some(140.0)).percentage, 100.0);

        job.status = JobStatus::Completed;
        job.output_ref = Some("out.mp4".into());
        let view = JobStatusView::from_job(&job, Some(99.0));
        assert_eq!(view.percentage, 0.0);
        assert_eq!(view.output_ref.as_deref(), Some("out.mp4"));
    }
}
