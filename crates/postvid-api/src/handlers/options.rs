//! Render option listings for clients.

use axum::Json;
use serde::Serialize;

use postvid_models::{Language, VoiceGender};

#[derive(Debug, Serialize)]
pub struct LanguageOption {
    pub code: &'static str,
    pub name: &'static str,
}

#[derive(Debug, Serialize)]
pub struct VoiceOption {
    pub language: &'static str,
    pub gender: VoiceGender,
    pub voice: &'static str,
}

/// GET /api/options/languages
pub async fn list_languages() -> Json<Vec<LanguageOption>> {
    Json(
        Language::ALL
            .iter()
            .map(|l| LanguageOption {
                code: l.code(),
                name: l.name(),
            })
            .collect(),
    )
}

/// GET /api/options/voices
pub async fn list_voices() -> Json<Vec<VoiceOption>> {
    let voices = Language::ALL
        .iter()
        .flat_map(|l| {
            [VoiceGender::Male, VoiceGender::Female].map(|gender| VoiceOption {
                language: l.code(),
                gender,
                voice: l.voice_name(gender),
            })
        })
        .collect();
    Json(voices)
}
