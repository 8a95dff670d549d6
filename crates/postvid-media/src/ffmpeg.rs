//! FFmpeg/FFprobe wrappers for probing and trimming.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};
use crate::traits::MediaEditor;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Arguments placed before `-i`
    input_args: Vec<String>,
    /// Arguments placed after `-i`
    output_args: Vec<String>,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            log_level: "error".to_string(),
        }
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Limit the output to `seconds`.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// Copy streams without re-encoding.
    pub fn stream_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["-y".to_string(), "-v".to_string(), self.log_level.clone()];
        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());
        args
    }

    /// Run to completion.
    pub async fn run(&self) -> MediaResult<()> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = self.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let output = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(String::from_utf8_lossy(&output.stderr).to_string()),
                output.status.code(),
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Extract the container duration from `ffprobe -show_format` JSON.
fn parse_duration(json: &[u8]) -> MediaResult<f64> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;
    probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| MediaError::ProbeFailed("no duration in ffprobe output".to_string()))
}

/// Probe and trim with the FFmpeg CLI.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEditor;

impl FfmpegEditor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaEditor for FfmpegEditor {
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

        let output = Command::new("ffprobe")
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(MediaError::ProbeFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        parse_duration(&output.stdout)
    }

    async fn trim(&self, input: &Path, output: &Path, length: f64) -> MediaResult<()> {
        FfmpegCommand::new(input, output)
            .duration(length)
            .stream_copy()
            .run()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_command() {
        let args = FfmpegCommand::new("render.mp4", "final.mp4")
            .duration(11.0)
            .stream_copy()
            .build_args();

        assert_eq!(
            args,
            vec!["-y", "-v", "error", "-i", "render.mp4", "-t", "11.000", "-c", "copy", "final.mp4"]
        );
    }

    #[test]
    fn test_parse_duration() {
        let json = br#"{"format": {"filename": "a.mp4", "duration": "42.500000"}}"#;
        assert_eq!(parse_duration(json).unwrap(), 42.5);

        let missing = br#"{"format": {"filename": "a.mp4"}}"#;
        assert!(matches!(parse_duration(missing), Err(MediaError::ProbeFailed(_))));
    }
}
