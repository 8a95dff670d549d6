//! HTTP translation client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use postvid_models::Language;

use crate::error::{MediaError, MediaResult};
use crate::traits::Translator;

/// Configuration for the translation client.
#[derive(Debug, Clone)]
pub struct TranslateConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl TranslateConfig {
    /// Read `TRANSLATE_SERVICE_URL`. Translation is optional, so an unset
    /// URL yields `None`.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("TRANSLATE_SERVICE_URL").ok()?;
        Some(Self {
            base_url,
            timeout: Duration::from_secs(
                std::env::var("TRANSLATE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        })
    }
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    target: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    translated_text: String,
}

/// Translator backed by an HTTP service.
pub struct HttpTranslator {
    http: Client,
    config: TranslateConfig,
}

impl HttpTranslator {
    pub fn new(config: TranslateConfig) -> MediaResult<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str, target: Language) -> MediaResult<String> {
        let url = format!("{}/translate", self.config.base_url.trim_end_matches('/'));
        debug!(language = target.code(), "Translating text");

        let response = self
            .http
            .post(&url)
            .json(&TranslateRequest {
                text,
                target: target.translation_code(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::TranslationFailed(format!(
                "translation service returned {}: {}",
                status, body
            )));
        }

        let body: TranslateResponse = response.json().await?;
        Ok(body.translated_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_translate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .and(body_json(serde_json::json!({"text": "hello", "target": "vi"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"translated_text": "xin chào"})),
            )
            .mount(&server)
            .await;

        let translator = HttpTranslator::new(TranslateConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();

        let out = translator.translate("hello", Language::ViVn).await.unwrap();
        assert_eq!(out, "xin chào");
    }

    #[tokio::test]
    async fn test_translate_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let translator = HttpTranslator::new(TranslateConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();

        let err = translator.translate("hello", Language::FrFr).await.unwrap_err();
        assert!(matches!(err, MediaError::TranslationFailed(_)));
    }
}
