//! Submission payload: media selector, commentary items, render options.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Where the source clip comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaSelector {
    /// A template video held by media storage, addressed by file name
    Template { name: String },
    /// A remote video page (YouTube and similar) fetched by the worker
    Remote { url: String },
}

impl MediaSelector {
    pub fn template(name: impl Into<String>) -> Self {
        Self::Template { name: name.into() }
    }

    pub fn remote(url: impl Into<String>) -> Self {
        Self::Remote { url: url.into() }
    }

    /// Interpret a raw selector string: `http(s)://` URLs are remote, anything
    /// else names a template.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match url::Url::parse(raw) {
            Ok(u) if u.scheme() == "http" || u.scheme() == "https" => Self::remote(raw),
            _ => Self::template(raw),
        }
    }
}

impl fmt::Display for MediaSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaSelector::Template { name } => write!(f, "template:{}", name),
            MediaSelector::Remote { url } => write!(f, "remote:{}", url),
        }
    }
}

/// One raw commentary item as submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct CommentInput {
    /// Speaker label shown next to the text
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    /// Text displayed and narrated
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
    /// Avatar image reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl CommentInput {
    pub fn new(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            text: text.into(),
            avatar: None,
        }
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }
}

/// Narration voice gender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VoiceGender {
    Male,
    #[default]
    Female,
}

/// Narration language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum Language {
    #[default]
    #[serde(rename = "en-US")]
    EnUs,
    #[serde(rename = "fr-FR")]
    FrFr,
    #[serde(rename = "vi-VN")]
    ViVn,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::EnUs, Language::FrFr, Language::ViVn];

    /// BCP-47 code.
    pub fn code(&self) -> &'static str {
        match self {
            Language::EnUs => "en-US",
            Language::FrFr => "fr-FR",
            Language::ViVn => "vi-VN",
        }
    }

    /// Human readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Language::EnUs => "English",
            Language::FrFr => "French",
            Language::ViVn => "Vietnamese",
        }
    }

    /// Two-letter code used for translation requests.
    pub fn translation_code(&self) -> &'static str {
        match self {
            Language::EnUs => "en",
            Language::FrFr => "fr",
            Language::ViVn => "vi",
        }
    }

    /// Synthesis voice for this language and gender.
    pub fn voice_name(&self, gender: VoiceGender) -> &'static str {
        match (self, gender) {
            (Language::EnUs, VoiceGender::Male) => "en-US-Standard-B",
            (Language::EnUs, VoiceGender::Female) => "en-US-Standard-F",
            (Language::FrFr, VoiceGender::Male) => "fr-FR-Standard-B",
            (Language::FrFr, VoiceGender::Female) => "fr-FR-Standard-F",
            (Language::ViVn, VoiceGender::Male) => "vi-VN-Chirp3-HD-Orus",
            (Language::ViVn, VoiceGender::Female) => "vi-VN-Chirp3-HD-Aoede",
        }
    }
}

/// Output aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum AspectRatio {
    #[serde(rename = "16:9")]
    Landscape,
    #[default]
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
        }
    }
}

/// Overlay colour theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

/// Voice, language, layout and length options.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema, Validate)]
pub struct RenderOptions {
    #[serde(default)]
    pub voice: VoiceGender,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub theme: Theme,
    /// Title narrated before the first comment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 300))]
    pub title: Option<String>,
    /// Requested output length in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 3600))]
    pub target_length_secs: Option<u32>,
}

/// Immutable request payload of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct JobInput {
    pub media: MediaSelector,
    /// Commentary items in priority order
    #[validate(length(min = 1, max = 100), nested)]
    pub comments: Vec<CommentInput>,
    #[serde(default)]
    #[validate(nested)]
    pub options: RenderOptions,
}

impl JobInput {
    pub fn new(media: MediaSelector, comments: Vec<CommentInput>) -> Self {
        Self {
            media,
            comments,
            options: RenderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_parse() {
        assert_eq!(
            MediaSelector::parse("https://www.youtube.com/watch?v=ZkHKGWKq9mY"),
            MediaSelector::remote("https://www.youtube.com/watch?v=ZkHKGWKq9mY")
        );
        assert_eq!(
            MediaSelector::parse(" parkour.mp4 "),
            MediaSelector::template("parkour.mp4")
        );
        assert_eq!(
            MediaSelector::parse("ftp://example.com/a.mp4"),
            MediaSelector::template("ftp://example.com/a.mp4")
        );
    }

    #[test]
    fn test_option_wire_names() {
        let options: RenderOptions = serde_json::from_value(serde_json::json!({
            "voice": "male",
            "language": "vi-VN",
            "aspect_ratio": "16:9",
            "theme": "light"
        }))
        .unwrap();

        assert_eq!(options.voice, VoiceGender::Male);
        assert_eq!(options.language, Language::ViVn);
        assert_eq!(options.aspect_ratio, AspectRatio::Landscape);
        assert_eq!(options.theme, Theme::Light);
        assert_eq!(options.language.voice_name(options.voice), "vi-VN-Chirp3-HD-Orus");
    }

    #[test]
    fn test_validation() {
        let input = JobInput::new(
            MediaSelector::template("a.mp4"),
            vec![CommentInput::new("bob", "hello")],
        );
        assert!(input.validate().is_ok());

        let empty = JobInput::new(MediaSelector::template("a.mp4"), vec![]);
        assert!(empty.validate().is_err());

        let blank_text = JobInput::new(
            MediaSelector::template("a.mp4"),
            vec![CommentInput::new("bob", "")],
        );
        assert!(blank_text.validate().is_err());

        let zero_length = input.clone().with_options(RenderOptions {
            target_length_secs: Some(0),
            ..Default::default()
        });
        assert!(zero_length.validate().is_err());
    }
}
