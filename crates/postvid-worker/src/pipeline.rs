//! The per-job render pipeline.
//!
//! Runs inside the claim: build the comment list, narrate each item,
//! allocate the schedule, resolve the source clip, render, trim and store.
//! Every error is returned to the caller, which records it on the job.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tracing::{debug, warn};

use postvid_media::{
    MediaEditor, MediaError, MediaFetcher, MediaStorage, RenderProgress, RenderRequest, Renderer,
    SpeechSynthesizer, Translator,
};
use postvid_models::{
    CommentItem, Job, JobId, Language, MediaSelector, NarratedItem, VoiceGender,
};
use postvid_queue::ProgressChannel;

use crate::allocator::{allocate, is_saturated, output_length, TargetPolicy};
use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::retry::retry_with_backoff;

/// Language comment text is written in.
pub const SOURCE_LANGUAGE: Language = Language::EnUs;

/// Buffered progress updates between renderer and progress channel.
const PROGRESS_BUFFER: usize = 32;

/// External services the pipeline delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub speech: Arc<dyn SpeechSynthesizer>,
    /// Absent when no translation service is configured
    pub translator: Option<Arc<dyn Translator>>,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub renderer: Arc<dyn Renderer>,
    pub editor: Arc<dyn MediaEditor>,
    pub storage: Arc<dyn MediaStorage>,
}

/// Turns a claimed job into a stored composite video.
pub struct RenderPipeline {
    config: WorkerConfig,
    media: Collaborators,
    progress: Arc<dyn ProgressChannel>,
}

impl RenderPipeline {
    pub fn new(
        config: WorkerConfig,
        media: Collaborators,
        progress: Arc<dyn ProgressChannel>,
    ) -> Self {
        Self {
            config,
            media,
            progress,
        }
    }

    /// Run every stage for `job` and return the stored output reference.
    pub async fn run(&self, job: &Job, logger: &mut JobLogger) -> WorkerResult<String> {
        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("job-{}-", job.id))
            .tempdir_in(&self.config.work_dir)?;

        let options = &job.input.options;

        let policy = TargetPolicy::new(self.config.default_target_secs, self.config.max_target_secs);
        let target = policy.target_for(options.target_length_secs);

        logger.stage("narrate");
        let items = comment_items(job);
        let total_items = items.len();
        let narrated = self
            .narrate(items, options.language, options.voice, target, &scratch, logger)
            .await?;

        let schedule = allocate(
            &narrated,
            self.config.pause_gap,
            target,
            self.config.allow_exceed,
        );
        logger.log_progress(&format!(
            "scheduled {} of {} items ({} narrated), {:.2}s of {:.0}s target",
            schedule.len(),
            total_items,
            narrated.len(),
            schedule.cumulative,
            target
        ));

        logger.stage("source");
        let source = self.resolve_source(&job.input.media, scratch.path()).await?;
        let source_length = self.media.editor.probe_duration(&source).await?;

        logger.stage("render");
        let request = RenderRequest {
            job_id: job.id.clone(),
            source,
            schedule,
            aspect_ratio: options.aspect_ratio,
            theme: options.theme,
            output: scratch.path().join("render.mp4"),
        };
        let rendered = self.render_with_progress(&request).await?;

        logger.stage("trim");
        let final_length = output_length(&request.schedule, source_length);
        let trimmed = scratch.path().join("final.mp4");
        self.media
            .editor
            .trim(&rendered, &trimmed, final_length)
            .await?;
        debug!(
            job_id = %job.id,
            final_length,
            source_length,
            "Trimmed render output"
        );

        logger.stage("store");
        let output_ref = self.media.storage.store_output(&job.id, &trimmed).await?;
        Ok(output_ref)
    }

    /// Translate and synthesize items in order, stopping as soon as the
    /// running length decides the schedule.
    async fn narrate(
        &self,
        items: Vec<CommentItem>,
        language: Language,
        voice: VoiceGender,
        target: f64,
        scratch: &TempDir,
        logger: &JobLogger,
    ) -> WorkerResult<Vec<NarratedItem>> {
        let audio_dir = scratch.path().join("audio");
        tokio::fs::create_dir_all(&audio_dir).await?;

        let translator = if language == SOURCE_LANGUAGE {
            None
        } else if self.media.translator.is_none() {
            logger.log_warning(&format!(
                "no translator configured, narrating {} text untranslated",
                language.code()
            ));
            None
        } else {
            self.media.translator.as_ref()
        };
        let voice = language.voice_name(voice);

        let mut narrated = Vec::with_capacity(items.len());
        let mut total = 0.0;
        for mut item in items {
            if let Some(translator) = translator {
                item.text = translator.translate(&item.text, language).await?;
            }

            let narration = self
                .media
                .speech
                .synthesize(&item.text, voice, language, &audio_dir)
                .await?;
            let gap = if narrated.is_empty() { 0.0 } else { self.config.pause_gap };
            total += gap + narration.duration;

            let audio = narration.audio.to_string_lossy().to_string();
            narrated.push(NarratedItem::new(item, audio, narration.duration));

            if is_saturated(total, target, self.config.allow_exceed) {
                break;
            }
        }
        Ok(narrated)
    }

    /// Local path of the source clip, downloading remote media if needed.
    async fn resolve_source(&self, media: &MediaSelector, dest: &Path) -> WorkerResult<PathBuf> {
        match media {
            MediaSelector::Template { name } => {
                Ok(self.media.storage.resolve_template(name).await?)
            }
            MediaSelector::Remote { url } => {
                let fetcher = &self.media.fetcher;
                let path = retry_with_backoff(
                    &self.config.fetch_retry,
                    MediaError::is_retryable,
                    || fetcher.fetch(url, dest),
                )
                .await
                .inspect_err(|e| {
                    if e.is_exhausted() {
                        warn!(url = %url, "Source fetch still failing after retries");
                    }
                })?;
                Ok(path)
            }
        }
    }

    /// Render while forwarding progress updates to the progress channel.
    async fn render_with_progress(&self, request: &RenderRequest) -> WorkerResult<PathBuf> {
        let (handle, mut updates) = RenderProgress::channel(PROGRESS_BUFFER);

        let render = self.media.renderer.render(request, handle);
        let forward = forward_progress(self.progress.as_ref(), &request.job_id, &mut updates);

        let (rendered, ()) = tokio::join!(render, forward);
        Ok(rendered?)
    }
}

/// Comment items in narration order: the title card first when present.
pub fn comment_items(job: &Job) -> Vec<CommentItem> {
    let title = job
        .input
        .options
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(CommentItem::title);

    title
        .into_iter()
        .chain(job.input.comments.iter().map(CommentItem::from))
        .collect()
}

async fn forward_progress(
    channel: &dyn ProgressChannel,
    job_id: &JobId,
    updates: &mut tokio::sync::mpsc::Receiver<f64>,
) {
    while let Some(percent) = updates.recv().await {
        if let Err(e) = channel.set(job_id, percent).await {
            warn!(job_id = %job_id, "Failed to record progress: {}", e);
        }
    }
}
