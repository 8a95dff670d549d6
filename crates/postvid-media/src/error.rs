//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors raised by the media collaborators.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("yt-dlp not found in PATH")]
    YtDlpNotFound,

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Unsupported media URL: {0}")]
    UnsupportedUrl(String),

    /// Fetch failure worth retrying (network, rate limit, transient server error)
    #[error("Fetch failed: {0}")]
    FetchRetryable(String),

    /// Fetch failure that will not go away (private, removed, restricted)
    #[error("Fetch rejected: {0}")]
    FetchTerminal(String),

    #[error("Speech synthesis failed: {0}")]
    SpeechFailed(String),

    #[error("Translation failed: {0}")]
    TranslationFailed(String),

    #[error("Render failed: {message}")]
    RenderFailed {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {0}")]
    ProbeFailed(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl MediaError {
    pub fn fetch_retryable(message: impl Into<String>) -> Self {
        Self::FetchRetryable(message.into())
    }

    pub fn fetch_terminal(message: impl Into<String>) -> Self {
        Self::FetchTerminal(message.into())
    }

    pub fn render_failed(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::RenderFailed {
            message: message.into(),
            exit_code,
        }
    }

    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether the retry controller should try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            MediaError::FetchRetryable(_) => true,
            MediaError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_classes() {
        assert!(MediaError::fetch_retryable("HTTP Error 503").is_retryable());
        assert!(!MediaError::fetch_terminal("Private video").is_retryable());
        assert!(!MediaError::TemplateNotFound("x.mp4".into()).is_retryable());
        assert!(!MediaError::render_failed("boom", Some(1)).is_retryable());
    }
}
