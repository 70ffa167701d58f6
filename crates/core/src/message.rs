//! Message and Conversation domain types.
//!
//! These are the core value objects that flow through the entire system:
//! the UI layer appends a user message → the assembler builds a prompt →
//! the provider streams a response → the engine persists the new turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions
    System,
}

/// A reference to an image attached to a message.
///
/// The payload is raw base64 without any data-URL prefix; each provider
/// dialect adds its own framing at request-build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Base64-encoded image bytes.
    pub data: String,

    /// MIME type, e.g. `image/png`.
    pub media_type: String,
}

/// A single message in a conversation.
///
/// Immutable once created, except that user turns may be edited in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Attached images (empty for text-only turns)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageRef>,

    /// Cached token estimate, filled lazily by the assembler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<usize>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Branching linkage: the message this one responds to. Regenerated
    /// assistant turns share the parent of the turn they replace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Message {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            images: Vec::new(),
            token_count: None,
            timestamp: Utc::now(),
            parent_id: None,
        }
    }

    /// Create a user message with attached images.
    pub fn user_with_images(content: impl Into<String>, images: Vec<ImageRef>) -> Self {
        Self {
            images,
            ..Self::user(content)
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.into(),
            images: Vec::new(),
            token_count: None,
            timestamp: Utc::now(),
            parent_id: None,
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::System,
            content: content.into(),
            images: Vec::new(),
            token_count: None,
            timestamp: Utc::now(),
            parent_id: None,
        }
    }

    /// Attach a parent linkage (builder style).
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// A conversation is an ordered sequence of messages with a rolling summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Optional title (auto-generated or user-set)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Ordered messages
    pub messages: Vec<Message>,

    /// Rolling summary of messages older than the recent window.
    /// Mutated only by the summarization flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Watermark: everything at or before this timestamp is folded into
    /// `summary`. Never moves backward.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summarized_up_to: Option<DateTime<Utc>>,

    /// Optional folder assignment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            title: None,
            messages: Vec::new(),
            summary: None,
            summarized_up_to: None,
            folder_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Find a message by id.
    pub fn find(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello there");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello there");
        assert!(msg.images.is_empty());
        assert!(msg.parent_id.is_none());
    }

    #[test]
    fn user_message_with_images() {
        let img = ImageRef {
            data: "aGVsbG8=".into(),
            media_type: "image/png".into(),
        };
        let msg = Message::user_with_images("look at this", vec![img.clone()]);
        assert_eq!(msg.images.len(), 1);
        assert_eq!(msg.images[0], img);
    }

    #[test]
    fn conversation_tracks_updates() {
        let mut conv = Conversation::new();
        let created = conv.created_at;

        conv.push(Message::user("First message"));
        assert_eq!(conv.messages.len(), 1);
        assert!(conv.updated_at >= created);
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::user("Test message").with_parent("msg_0");
        let json = serde_json::to_string(&msg).unwrap();
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.content, "Test message");
        assert_eq!(deserialized.role, Role::User);
        assert_eq!(deserialized.parent_id.as_deref(), Some("msg_0"));
    }

    #[test]
    fn conversation_serialization_keeps_watermark() {
        let mut conv = Conversation::new();
        conv.summary = Some("earlier talk about birds".into());
        conv.summarized_up_to = Some(Utc::now());
        let json = serde_json::to_string(&conv).unwrap();
        let back: Conversation = serde_json::from_str(&json).unwrap();
        assert_eq!(back.summary.as_deref(), Some("earlier talk about birds"));
        assert!(back.summarized_up_to.is_some());
    }
}
