//! Overlay renderer driven by an external command.
//!
//! The command receives the render request as a JSON file and writes the
//! composite to the requested output. It reports progress on stdout as
//! `progress=NN` lines (`progress=end` when done); other lines are ignored.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};
use crate::progress::RenderProgress;
use crate::traits::{RenderRequest, Renderer};

/// One parsed stdout line.
#[derive(Debug, Clone, PartialEq)]
enum ProgressLine {
    Percent(f64),
    End,
}

fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let (key, value) = line.trim().split_once('=')?;
    if key.trim() != "progress" {
        return None;
    }
    match value.trim() {
        "end" => Some(ProgressLine::End),
        v => v
            .trim_end_matches('%')
            .parse::<f64>()
            .ok()
            .map(ProgressLine::Percent),
    }
}

/// Renderer configuration.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Program and leading arguments, whitespace separated
    pub command: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            command: "postvid-render".to_string(),
        }
    }
}

impl RenderConfig {
    pub fn from_env() -> Self {
        Self {
            command: std::env::var("RENDER_COMMAND")
                .unwrap_or_else(|_| "postvid-render".to_string()),
        }
    }
}

/// Runs the configured render command per job.
pub struct CommandRenderer {
    program: String,
    base_args: Vec<String>,
}

impl CommandRenderer {
    pub fn new(config: RenderConfig) -> MediaResult<Self> {
        let mut parts = config.command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| MediaError::config("RENDER_COMMAND is empty"))?;
        Ok(Self {
            program,
            base_args: parts.collect(),
        })
    }

    fn request_path(request: &RenderRequest) -> PathBuf {
        request
            .output
            .with_file_name(format!("render-request-{}.json", request.job_id))
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(
        &self,
        request: &RenderRequest,
        mut progress: RenderProgress,
    ) -> MediaResult<PathBuf> {
        let request_path = Self::request_path(request);
        tokio::fs::write(&request_path, serde_json::to_vec_pretty(request)?).await?;

        debug!(
            job_id = %request.job_id,
            program = %self.program,
            items = request.schedule.len(),
            "Starting render"
        );

        let mut child = Command::new(&self.program)
            .args(&self.base_args)
            .arg("--request")
            .arg(&request_path)
            .arg("--output")
            .arg(&request.output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MediaError::render_failed(format!("failed to start {}: {}", self.program, e), None))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::render_failed("renderer stdout not captured", None))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::render_failed("renderer stderr not captured", None))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            match parse_progress_line(&line) {
                Some(ProgressLine::Percent(p)) => {
                    progress.report(p);
                }
                Some(ProgressLine::End) => progress.finish(),
                None => {}
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let message = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("renderer exited with non-zero status")
                .to_string();
            return Err(MediaError::render_failed(message, status.code()));
        }
        if !request.output.exists() {
            return Err(MediaError::render_failed("renderer produced no output", status.code()));
        }

        progress.finish();
        info!(job_id = %request.job_id, output = %request.output.display(), "Render complete");
        Ok(request.output.clone())
    }
}
