//! Provider-facing value types.
//!
//! The assembler produces `ContextBlock`s; the providers crate turns them
//! into a dialect-specific wire request and streams back `StreamDelta`s.
//! Chunk emission preserves arrival order — the channel between the SSE
//! reader and the consumer is the only queue.

use crate::message::{ImageRef, Role};
use serde::{Deserialize, Serialize};

/// A role-tagged block of assembled context, ready for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBlock {
    pub role: Role,
    pub content: String,

    /// Images travel only on user blocks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageRef>,
}

impl ContextBlock {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn with_images(mut self, images: Vec<ImageRef>) -> Self {
        self.images = images;
        self
    }
}

/// Generation parameters for a chat request.
///
/// Optional fields are omitted from the wire request entirely when a
/// dialect does not accept them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 4096,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
        }
    }
}

/// A notice surfaced inline with streamed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamNotice {
    /// The provider stopped at its output limit (`finish_reason: length`).
    Truncated,
    /// The provider filtered the output (`finish_reason: content_filter`).
    ContentFiltered,
    /// The stream stalled after partial output and was closed cleanly.
    Stalled,
}

impl StreamNotice {
    /// The user-visible text appended to the output.
    pub fn display_text(&self) -> &'static str {
        match self {
            Self::Truncated => "\n\n[response truncated: output limit reached]",
            Self::ContentFiltered => "\n\n[response filtered by the provider]",
            Self::Stalled => "\n\n[response stopped]",
        }
    }
}

/// A single incremental event from a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDelta {
    /// Partial content delta.
    #[serde(default)]
    pub content: Option<String>,

    /// A finish-reason notice, if the provider signalled one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<StreamNotice>,

    /// Whether this is the terminal event.
    #[serde(default)]
    pub done: bool,
}

impl StreamDelta {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            notice: None,
            done: false,
        }
    }

    pub fn notice(notice: StreamNotice) -> Self {
        Self {
            content: None,
            notice: Some(notice),
            done: false,
        }
    }

    pub fn done() -> Self {
        Self {
            content: None,
            notice: None,
            done: true,
        }
    }
}
