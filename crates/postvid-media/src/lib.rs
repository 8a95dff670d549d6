//! Media collaborators for the postvid worker.
//!
//! The worker depends only on the traits in [`traits`]. This crate also
//! ships the adapters used in production:
//! - HTTP speech synthesis and translation clients
//! - `yt-dlp` fetcher with retryable/terminal error classification
//! - External render command runner with `progress=` parsing
//! - `ffprobe`/`ffmpeg` probe and trim
//! - Local template storage with local or R2 output storage

pub mod error;
pub mod ffmpeg;
pub mod fetch;
pub mod progress;
pub mod render;
pub mod speech;
pub mod storage;
pub mod traits;
pub mod translate;

pub use error::{MediaError, MediaResult};
pub use ffmpeg::{FfmpegCommand, FfmpegEditor};
pub use fetch::{is_supported_url, YtDlpFetcher};
pub use progress::RenderProgress;
pub use render::{CommandRenderer, RenderConfig};
pub use speech::{HttpSpeechClient, SpeechConfig};
pub use storage::{LocalMediaStorage, R2Config, R2MediaStorage, StorageConfig};
pub use traits::{
    MediaEditor, MediaFetcher, MediaStorage, Narration, RenderRequest, Renderer,
    SpeechSynthesizer, Translator,
};
pub use translate::{HttpTranslator, TranslateConfig};

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<std::path::PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if yt-dlp is available.
pub fn check_ytdlp() -> MediaResult<std::path::PathBuf> {
    which::which("yt-dlp").map_err(|_| MediaError::YtDlpNotFound)
}
