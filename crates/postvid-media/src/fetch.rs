//! Remote source download using yt-dlp.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::traits::MediaFetcher;

/// Platforms accepted as remote media sources.
const SUPPORTED_DOMAINS: [&str; 7] = [
    "youtube.com",
    "youtu.be",
    "vimeo.com",
    "twitter.com",
    "x.com",
    "twitch.tv",
    "tiktok.com",
];

/// stderr fragments that mean retrying cannot help.
const PERMANENT_PATTERNS: [&str; 9] = [
    "private video",
    "video unavailable",
    "this video is unavailable",
    "has been removed",
    "age-restricted",
    "confirm your age",
    "copyright",
    "http error 404",
    "unsupported url",
];

/// Check if a URL is an http(s) link on a supported video platform.
pub fn is_supported_url(raw: &str) -> bool {
    let Ok(parsed) = url::Url::parse(raw) else {
        return false;
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return false;
    }
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();

    SUPPORTED_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{}", domain)))
}

/// Classify a failed yt-dlp run by its stderr.
pub fn classify_failure(stderr: &str) -> MediaError {
    let message = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("Unknown error")
        .trim()
        .to_string();
    let lowered = stderr.to_ascii_lowercase();

    if PERMANENT_PATTERNS.iter().any(|p| lowered.contains(p)) {
        MediaError::fetch_terminal(message)
    } else {
        MediaError::fetch_retryable(message)
    }
}

/// Fetcher shelling out to `yt-dlp`.
#[derive(Debug, Clone, Default)]
pub struct YtDlpFetcher {
    /// Optional Netscape cookies file for authenticated downloads
    cookies: Option<PathBuf>,
}

impl YtDlpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookies(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookies = Some(path.into());
        self
    }

    /// Read `YTDLP_COOKIES` when present.
    pub fn from_env() -> Self {
        let fetcher = Self::new();
        match std::env::var("YTDLP_COOKIES") {
            Ok(path) if Path::new(&path).exists() => fetcher.with_cookies(path),
            _ => fetcher,
        }
    }

    fn build_args(&self, url: &str, output: &Path) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "-f".to_string(),
            "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".to_string(),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
            "-o".to_string(),
            output.to_string_lossy().to_string(),
        ];
        if let Some(cookies) = &self.cookies {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().to_string());
        }
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    fn supports(&self, url: &str) -> bool {
        is_supported_url(url)
    }

    async fn fetch(&self, url: &str, dest_dir: &Path) -> MediaResult<PathBuf> {
        if !is_supported_url(url) {
            return Err(MediaError::UnsupportedUrl(url.to_string()));
        }
        which::which("yt-dlp").map_err(|_| MediaError::YtDlpNotFound)?;

        let output_path = dest_dir.join("source.mp4");
        info!(url = %url, output = %output_path.display(), "Downloading source video");

        let output = Command::new("yt-dlp")
            .args(self.build_args(url, &output_path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("yt-dlp stderr: {}", stderr);
            let err = classify_failure(&stderr);
            warn!(url = %url, retryable = err.is_retryable(), "yt-dlp failed: {}", err);
            return Err(err);
        }

        if !output_path.exists() {
            return Err(MediaError::fetch_retryable("Output file not created"));
        }

        let size = output_path.metadata()?.len();
        info!(
            output = %output_path.display(),
            size_mb = size as f64 / (1024.0 * 1024.0),
            "Downloaded source video"
        );
        Ok(output_path)
    }
}
