//! HTTP text-to-speech client.
//!
//! `POST {base_url}/synthesize` with `{text, voice, language}`. The service
//! answers with the audio bytes and the narration length in the
//! `x-audio-duration` header (seconds).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use postvid_models::Language;

use crate::error::{MediaError, MediaResult};
use crate::traits::{Narration, SpeechSynthesizer};

const DURATION_HEADER: &str = "x-audio-duration";

/// Configuration for the speech client.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Base URL of the speech service
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8002".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl SpeechConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("TTS_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8002".to_string()),
            timeout: Duration::from_secs(
                std::env::var("TTS_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
        }
    }
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice: &'a str,
    language: &'a str,
}

/// Speech synthesizer backed by an HTTP service.
pub struct HttpSpeechClient {
    http: Client,
    config: SpeechConfig,
}

impl HttpSpeechClient {
    pub fn new(config: SpeechConfig) -> MediaResult<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> MediaResult<Self> {
        Self::new(SpeechConfig::from_env())
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechClient {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        language: Language,
        out_dir: &Path,
    ) -> MediaResult<Narration> {
        let url = format!("{}/synthesize", self.config.base_url.trim_end_matches('/'));
        debug!(voice, chars = text.len(), "Requesting narration");

        let response = self
            .http
            .post(&url)
            .json(&SynthesizeRequest {
                text,
                voice,
                language: language.code(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::SpeechFailed(format!(
                "speech service returned {}: {}",
                status, body
            )));
        }

        let duration = response
            .headers()
            .get(DURATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0)
            .ok_or_else(|| {
                MediaError::SpeechFailed(format!("response missing {} header", DURATION_HEADER))
            })?;

        let bytes = response.bytes().await?;
        let audio = out_dir.join(format!("narration-{}.mp3", uuid::Uuid::new_v4()));
        tokio::fs::write(&audio, &bytes).await?;

        Ok(Narration { audio, duration })
    }
}
