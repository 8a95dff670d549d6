//! Job submission and status queries.

use tracing::{info, warn};
use validator::Validate;

use postvid_media::is_supported_url;
use postvid_models::{JobId, JobInput, JobStatus, JobStatusView, MediaSelector};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Validate `input`, persist a pending job and enqueue it.
///
/// Returns as soon as the job is queued; rendering happens in the worker.
pub async fn submit_job(state: &AppState, input: JobInput) -> ApiResult<JobId> {
    input.validate()?;
    check_media(state, &input.media).await?;

    let job_id = state.store.submit(input).await?;
    if let Err(e) = state.queue.enqueue(&job_id).await {
        // The job stays pending; worker startup recovery re-queues it.
        warn!(job_id = %job_id, "Failed to enqueue job: {}", e);
        return Err(e.into());
    }

    metrics::record_job_submitted();
    info!(job_id = %job_id, "Job submitted");
    Ok(job_id)
}

/// Reject selectors that can never resolve.
async fn check_media(state: &AppState, media: &MediaSelector) -> ApiResult<()> {
    match media {
        MediaSelector::Template { name } => {
            if name.trim().is_empty() {
                return Err(ApiError::bad_request("media_selector is empty"));
            }
            if !state.storage.template_exists(name).await? {
                return Err(ApiError::not_found(format!("template '{}' does not exist", name)));
            }
        }
        MediaSelector::Remote { url } => {
            if !is_supported_url(url) {
                return Err(ApiError::bad_request(format!("unsupported video URL: {}", url)));
            }
        }
    }
    Ok(())
}

/// Current status, with live progress while processing.
pub async fn job_status(state: &AppState, job_id: &JobId) -> ApiResult<JobStatusView> {
    let job = state.store.get(job_id).await?;

    let progress = if job.status == JobStatus::Processing {
        match state.progress.get(job_id).await {
            Ok(value) => value,
            Err(e) => {
                warn!(job_id = %job_id, "Failed to read progress: {}", e);
                None
            }
        }
    } else {
        None
    };

    Ok(JobStatusView::from_job(&job, progress))
}
