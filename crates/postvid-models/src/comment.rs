//! Commentary items as they move through the pipeline.
//!
//! Each stage produces a new value rather than mutating the previous one:
//! `CommentItem` (built from input) -> `NarratedItem` (narration attached)
//! -> `ScheduledItem` (placed on the timeline).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::input::CommentInput;

/// One commentary unit shown and narrated in the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CommentItem {
    /// Speaker label
    pub speaker: String,
    /// Text displayed and narrated
    pub text: String,
    /// Avatar image reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Synthesized title card rather than a comment
    #[serde(default)]
    pub is_title: bool,
}

impl CommentItem {
    /// Build the title card placed before the comments.
    pub fn title(text: impl Into<String>) -> Self {
        Self {
            speaker: String::new(),
            text: text.into(),
            avatar: None,
            is_title: true,
        }
    }
}

impl From<&CommentInput> for CommentItem {
    fn from(input: &CommentInput) -> Self {
        Self {
            speaker: input.username.clone(),
            text: input.text.clone(),
            avatar: input.avatar.clone(),
            is_title: false,
        }
    }
}

/// A comment with its synthesized narration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NarratedItem {
    pub comment: CommentItem,
    /// Narration audio reference (local path or URL)
    pub audio: String,
    /// Narration length in seconds
    pub duration: f64,
}

impl NarratedItem {
    pub fn new(comment: CommentItem, audio: impl Into<String>, duration: f64) -> Self {
        Self {
            comment,
            audio: audio.into(),
            duration,
        }
    }
}

/// A comment placed on the output timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScheduledItem {
    pub comment: CommentItem,
    pub audio: String,
    /// Seconds from the start of the output
    pub start_time: f64,
    /// Seconds on screen (narration length)
    pub duration: f64,
}

impl ScheduledItem {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// Accepted items and the total timeline length they consume.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Schedule {
    pub items: Vec<ScheduledItem>,
    /// Sum of accepted narrations plus the pauses between them
    pub cumulative: f64,
}

impl Schedule {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Latest end time over all accepted items.
    pub fn last_end_time(&self) -> Option<f64> {
        self.items.iter().map(ScheduledItem::end_time).reduce(f64::max)
    }
}
