//! Semantic memory domain types and the Embedder trait.
//!
//! Every eligible message gets one append-only `EmbeddingRecord` in its
//! conversation's collection. The collection is a single storage record
//! per conversation, linearly scanned at query time — per-conversation
//! collections stay small enough that an index would be overhead.

use crate::error::MemoryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One embedded message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// The message this record was built from.
    pub message_id: String,

    /// Owning conversation.
    pub conversation_id: String,

    /// Fixed-length embedding vector.
    pub vector: Vec<f32>,

    /// Truncated text (≤500 chars) for cheap re-display without a
    /// message lookup.
    pub content_snapshot: String,

    /// When the source message was created.
    pub timestamp: DateTime<Utc>,
}

/// The per-conversation embedding collection — one storage record holding
/// every embedded message for the conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingCollection {
    pub conversation_id: String,

    #[serde(default)]
    pub records: Vec<EmbeddingRecord>,
}

impl EmbeddingCollection {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            records: Vec::new(),
        }
    }

    /// Whether a record for this message already exists.
    pub fn contains(&self, message_id: &str) -> bool {
        self.records.iter().any(|r| r.message_id == message_id)
    }
}

/// The rolling summary for a conversation. At most one live record,
/// overwritten on every re-summarization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: String,

    /// The condensed text injected into assembled context.
    pub summary: String,

    /// Watermark: messages at or before this timestamp are covered.
    pub summarized_up_to: DateTime<Utc>,

    /// Estimated token cost of `summary`.
    pub token_count: usize,

    pub updated_at: DateTime<Utc>,
}

/// An embedding model.
///
/// Implementations are loaded lazily and shared process-wide; see the
/// memory crate's `EmbedderHandle` for the single-flight load coordinator.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// A stable identifier for the model (used in logs).
    fn id(&self) -> &str;

    /// Embedding dimensionality.
    fn dimensions(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError>;
}
