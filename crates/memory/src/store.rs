//! The semantic memory store.
//!
//! Wraps the storage backend's embedding and summary namespaces with
//! embedding-aware store/retrieve operations. Retrieval is best-effort
//! by contract: every failure path returns an empty result so context
//! assembly never blocks on memory.

use crate::embedder::EmbedderHandle;
use crate::vector::rank_records;
use boundless_core::error::MemoryError;
use boundless_core::memory::{ConversationSummary, EmbeddingCollection, EmbeddingRecord};
use boundless_core::message::{Message, Role};
use boundless_core::storage::{RecordKind, StorageBackend, StorageExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Messages shorter than this are not worth embedding.
const MIN_CONTENT_CHARS: usize = 10;

/// Snapshot text stored alongside each vector for cheap re-display.
const SNAPSHOT_CHARS: usize = 500;

/// A retrieval hit: the stored record plus its similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub score: f32,
    pub record: EmbeddingRecord,
}

/// The semantic memory store.
pub struct SemanticMemory {
    storage: Arc<dyn StorageBackend>,
    embedder: EmbedderHandle,
    enabled: AtomicBool,
    /// Serializes collection read-modify-write cycles so concurrent
    /// background embeds cannot drop each other's appends.
    write_lock: Mutex<()>,
}

impl SemanticMemory {
    pub fn new(storage: Arc<dyn StorageBackend>, embedder: EmbedderHandle, enabled: bool) -> Self {
        Self {
            storage,
            embedder,
            enabled: AtomicBool::new(enabled),
            write_lock: Mutex::new(()),
        }
    }

    /// Toggle memory at runtime. Non-destructive: stored embeddings stay
    /// put and become queryable again on re-enable.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Embed a message and append it to its conversation's collection.
    ///
    /// Skipped for system messages and content under 10 characters.
    /// Idempotent: a message id already in the collection is a no-op.
    /// Returns whether a record was written.
    pub async fn store(&self, conversation_id: &str, message: &Message) -> Result<bool, MemoryError> {
        if !self.is_enabled() {
            return Ok(false);
        }
        if message.role == Role::System || message.content.chars().count() < MIN_CONTENT_CHARS {
            return Ok(false);
        }

        let _guard = self.write_lock.lock().await;

        let mut collection: EmbeddingCollection = self
            .storage
            .get_json(RecordKind::Embeddings, conversation_id)
            .await?
            .unwrap_or_else(|| EmbeddingCollection::new(conversation_id));

        if collection.contains(&message.id) {
            debug!(message_id = %message.id, "Embedding already stored; skipping");
            return Ok(false);
        }

        let embedder = self.embedder.get().await?;
        let vector = embedder.embed(&message.content).await?;

        collection.records.push(EmbeddingRecord {
            message_id: message.id.clone(),
            conversation_id: conversation_id.to_string(),
            vector,
            content_snapshot: truncate_chars(&message.content, SNAPSHOT_CHARS),
            timestamp: message.timestamp,
        });

        self.storage
            .set_json(RecordKind::Embeddings, conversation_id, &collection)
            .await?;

        Ok(true)
    }

    /// Top-K similarity query over a conversation's collection.
    ///
    /// Returns an empty list when memory is disabled, the model is
    /// unavailable, or anything else goes wrong — retrieval never fails
    /// the caller.
    pub async fn retrieve(
        &self,
        conversation_id: &str,
        query: &str,
        top_k: usize,
        exclude: &[String],
    ) -> Vec<ScoredRecord> {
        if !self.is_enabled() {
            return Vec::new();
        }

        let embedder = match self.embedder.get().await {
            Ok(e) => e,
            Err(e) => {
                debug!(error = %e, "Embedding model unavailable; retrieval degraded to empty");
                return Vec::new();
            }
        };

        let query_vector = match embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Query embedding failed; retrieval degraded to empty");
                return Vec::new();
            }
        };

        let collection: EmbeddingCollection = match self
            .storage
            .get_json(RecordKind::Embeddings, conversation_id)
            .await
        {
            Ok(Some(c)) => c,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "Embedding collection unreadable; retrieval degraded to empty");
                return Vec::new();
            }
        };

        // Linear scan by design: per-conversation collections are small.
        rank_records(&collection.records, &query_vector, top_k, exclude)
            .into_iter()
            .map(|(score, record)| ScoredRecord { score, record })
            .collect()
    }

    /// Fetch the conversation's rolling summary, if one exists.
    pub async fn get_summary(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationSummary>, MemoryError> {
        Ok(self
            .storage
            .get_json(RecordKind::Summary, conversation_id)
            .await?)
    }

    /// Overwrite the conversation's rolling summary.
    pub async fn save_summary(&self, summary: &ConversationSummary) -> Result<(), MemoryError> {
        self.storage
            .set_json(RecordKind::Summary, &summary.conversation_id, summary)
            .await?;
        Ok(())
    }

    /// Remove the conversation's embedding collection and summary.
    /// Called when its conversation is deleted.
    pub async fn delete_all(&self, conversation_id: &str) -> Result<(), MemoryError> {
        self.storage
            .delete(RecordKind::Embeddings, conversation_id)
            .await?;
        self.storage
            .delete(RecordKind::Summary, conversation_id)
            .await?;
        Ok(())
    }
}

/// Truncate to at most `max` characters, respecting char boundaries.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::EmbedderFactory;
    use boundless_core::memory::Embedder;
    use boundless_storage::SqliteStore;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;

    /// Deterministic embedder: maps text to a 3-dim vector from simple
    /// character statistics, so similar prefixes score similarly.
    struct StubEmbedder {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Embedder for StubEmbedder {
        fn id(&self) -> &str {
            "stub"
        }
        fn dimensions(&self) -> usize {
            3
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let bytes = text.as_bytes();
            let first = *bytes.first().unwrap_or(&0) as f32;
            let len = bytes.len() as f32;
            Ok(vec![first, len, 1.0])
        }
    }

    fn stub_factory(calls: Arc<AtomicUsize>) -> EmbedderFactory {
        Box::new(move || {
            let calls = calls.clone();
            Box::pin(async move { Ok(Arc::new(StubEmbedder { calls }) as Arc<dyn Embedder>) })
        })
    }

    async fn test_memory(enabled: bool) -> (SemanticMemory, Arc<AtomicUsize>) {
        let storage = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = EmbedderHandle::new(stub_factory(calls.clone()));
        (SemanticMemory::new(storage, handle, enabled), calls)
    }

    #[tokio::test]
    async fn store_skips_system_and_short_messages() {
        let (memory, _) = test_memory(true).await;

        let system = Message::system("You are a helpful assistant with many instructions");
        assert!(!memory.store("conv", &system).await.unwrap());

        let short = Message::user("hi");
        assert!(!memory.store("conv", &short).await.unwrap());

        let normal = Message::user("tell me about the weather in Lisbon");
        assert!(memory.store("conv", &normal).await.unwrap());
    }

    #[tokio::test]
    async fn store_is_idempotent_per_message_id() {
        let (memory, _) = test_memory(true).await;
        let msg = Message::user("a long enough message to embed");

        assert!(memory.store("conv", &msg).await.unwrap());
        assert!(!memory.store("conv", &msg).await.unwrap());

        let hits = memory.retrieve("conv", "a long enough message", 10, &[]).await;
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn retrieve_ranks_and_excludes() {
        let (memory, _) = test_memory(true).await;
        let a = Message::user("alpha message about sailing boats");
        let b = Message::user("alpha message about sailing ships");
        memory.store("conv", &a).await.unwrap();
        memory.store("conv", &b).await.unwrap();

        let hits = memory
            .retrieve("conv", "alpha message about sailing boats", 10, &[])
            .await;
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);

        let hits = memory
            .retrieve(
                "conv",
                "alpha message about sailing boats",
                10,
                &[a.id.clone()],
            )
            .await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.message_id, b.id);
    }

    #[tokio::test]
    async fn disabled_retrieve_is_immediate_and_skips_the_model() {
        let (memory, calls) = test_memory(true).await;
        let msg = Message::user("something worth remembering here");
        memory.store("conv", &msg).await.unwrap();

        let calls_before = calls.load(Ordering::SeqCst);
        memory.set_enabled(false);
        let hits = memory.retrieve("conv", "something", 10, &[]).await;
        assert!(hits.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), calls_before);
    }

    #[tokio::test]
    async fn disabling_is_non_destructive() {
        let (memory, _) = test_memory(true).await;
        let msg = Message::user("records survive a disable toggle");
        memory.store("conv", &msg).await.unwrap();

        memory.set_enabled(false);
        assert!(memory.retrieve("conv", "records", 10, &[]).await.is_empty());

        memory.set_enabled(true);
        let hits = memory.retrieve("conv", "records survive", 10, &[]).await;
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn unavailable_model_degrades_to_empty() {
        let storage = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
        let handle = EmbedderHandle::new(Box::new(|| {
            Box::pin(async { Err(MemoryError::ModelUnavailable("gone".into())) })
        }));
        let memory = SemanticMemory::new(storage, handle, true);

        let hits = memory.retrieve("conv", "anything", 5, &[]).await;
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn snapshot_is_truncated() {
        let (memory, _) = test_memory(true).await;
        let long_text = "x".repeat(2000);
        let msg = Message::user(long_text);
        memory.store("conv", &msg).await.unwrap();

        let hits = memory.retrieve("conv", "xxxxxxxxxxxx", 1, &[]).await;
        assert_eq!(hits[0].record.content_snapshot.chars().count(), 500);
    }

    #[tokio::test]
    async fn summary_round_trip_and_cascade() {
        let (memory, _) = test_memory(true).await;
        let msg = Message::user("a message that will be embedded soon");
        memory.store("conv", &msg).await.unwrap();

        memory
            .save_summary(&ConversationSummary {
                conversation_id: "conv".into(),
                summary: "They talked.".into(),
                summarized_up_to: Utc::now(),
                token_count: 3,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(memory.get_summary("conv").await.unwrap().is_some());

        memory.delete_all("conv").await.unwrap();
        assert!(memory.get_summary("conv").await.unwrap().is_none());
        assert!(memory.retrieve("conv", "a message", 10, &[]).await.is_empty());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "héllo wörld über alles";
        let truncated = truncate_chars(text, 7);
        assert_eq!(truncated.chars().count(), 7);
        assert_eq!(truncated, "héllo w");
    }
}
