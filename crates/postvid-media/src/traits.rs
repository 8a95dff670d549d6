//! Collaborator interfaces used by the worker pipeline.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use postvid_models::{AspectRatio, JobId, Language, Schedule, Theme};

use crate::error::MediaResult;
use crate::progress::RenderProgress;

/// Synthesized narration for one piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct Narration {
    /// Audio file written into the requested directory
    pub audio: PathBuf,
    /// Length in seconds
    pub duration: f64,
}

/// Text to speech.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` with `voice`, writing the audio under `out_dir`.
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        language: Language,
        out_dir: &Path,
    ) -> MediaResult<Narration>;
}

/// Machine translation.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target: Language) -> MediaResult<String>;
}

/// Downloads remote source media.
///
/// Errors are classified: `MediaError::is_retryable` tells transient failures
/// from permanent ones.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Whether `url` points at a platform this fetcher handles.
    fn supports(&self, url: &str) -> bool;

    /// Download `url` into `dest_dir` and return the local file.
    async fn fetch(&self, url: &str, dest_dir: &Path) -> MediaResult<PathBuf>;
}

/// Everything a renderer needs to produce the composite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderRequest {
    pub job_id: JobId,
    /// Local source clip
    pub source: PathBuf,
    pub schedule: Schedule,
    pub aspect_ratio: AspectRatio,
    pub theme: Theme,
    /// Where the composite must be written
    pub output: PathBuf,
}

/// Produces the composite video from a schedule and a source clip.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, request: &RenderRequest, progress: RenderProgress)
        -> MediaResult<PathBuf>;
}

/// Probe and trim.
#[async_trait]
pub trait MediaEditor: Send + Sync {
    /// Media length in seconds.
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64>;

    /// Write the first `length` seconds of `input` to `output`.
    async fn trim(&self, input: &Path, output: &Path, length: f64) -> MediaResult<()>;
}

/// Template lookup and output persistence.
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Whether a template with this name exists.
    async fn template_exists(&self, name: &str) -> MediaResult<bool>;

    /// Local path of a template. `TemplateNotFound` if absent.
    async fn resolve_template(&self, name: &str) -> MediaResult<PathBuf>;

    /// Persist the final output and return its reference.
    async fn store_output(&self, job_id: &JobId, path: &Path) -> MediaResult<String>;
}
