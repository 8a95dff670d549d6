//! Job submission and status handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use postvid_models::{
    AspectRatio, CommentInput, JobId, JobInput, JobStatusView, Language, MediaSelector,
    RenderOptions, Theme, VoiceGender,
};

use crate::error::{ApiError, ApiResult};
use crate::services;
use crate::state::AppState;

/// Body of `POST /api/jobs`.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    /// Template file name or remote video URL
    pub media_selector: String,
    pub comment_items: Vec<CommentInput>,
    #[serde(default)]
    pub voice: VoiceGender,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub title: Option<String>,
    /// Requested output length in seconds
    #[serde(default)]
    pub target_length: Option<u32>,
}

impl From<SubmitJobRequest> for JobInput {
    fn from(req: SubmitJobRequest) -> Self {
        JobInput::new(MediaSelector::parse(&req.media_selector), req.comment_items).with_options(
            RenderOptions {
                voice: req.voice,
                language: req.language,
                aspect_ratio: req.aspect_ratio,
                theme: req.theme,
                title: req.title,
                target_length_secs: req.target_length,
            },
        )
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: JobId,
}

/// POST /api/jobs
///
/// Returns:
/// - 202: Job accepted and queued
/// - 400: Malformed body, invalid options or unsupported URL
/// - 404: Template does not exist
pub async fn submit_job(
    State(state): State<AppState>,
    payload: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmitJobResponse>)> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    debug!(
        media = %request.media_selector,
        comments = request.comment_items.len(),
        "Job submission"
    );

    let job_id = services::submit_job(&state, request.into()).await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitJobResponse { job_id })))
}

/// GET /api/jobs/:job_id
///
/// Returns:
/// - 200: `{job_id, status, percentage, error?, output_ref?}`
/// - 404: Unknown job
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusView>> {
    if !is_valid_job_id(&job_id) {
        return Err(ApiError::not_found(format!("job '{}' not found", job_id)));
    }

    let view = services::job_status(&state, &JobId::from_string(job_id)).await?;
    Ok(Json(view))
}

/// Validate job ID format.
///
/// Valid format: alphanumeric characters and hyphens only, 8-64 chars.
fn is_valid_job_id(id: &str) -> bool {
    if id.is_empty() || id.len() > 64 || id.len() < 8 {
        return false;
    }
    id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
