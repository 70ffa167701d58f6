//! The chat engine facade.
//!
//! Owns the send/regenerate/edit flows and the conversation, folder, and
//! media CRUD surface. Ordering rules enforced here:
//! - the user turn is persisted *before* context assembly, so assembly
//!   always reads a snapshot at least as fresh as the previous turn;
//! - embedding writes are spawned off the critical path and never block
//!   or fail a send;
//! - the summary watermark only moves forward;
//! - the storage substrate changes only through [`ChatEngine::switch_backend`],
//!   which migrates first and swaps after.

use crate::media::media_id;
use boundless_config::AppConfig;
use boundless_context::ContextAssembler;
use boundless_context::token::estimate_tokens;
use boundless_core::error::{Error, ProviderError};
use boundless_core::memory::ConversationSummary;
use boundless_core::message::{Conversation, ConversationId, ImageRef, Message, Role};
use boundless_core::provider::GenerationParams;
use boundless_core::storage::{RecordKind, StorageBackend, StorageExt};
use boundless_memory::{EmbedderHandle, SemanticMemory};
use boundless_providers::{ChatClient, IngestOptions, IngestOutcome, StreamHandler, ingest};
use boundless_storage::{DirectoryStore, SqliteStore, SwappableStore, migrate};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// The result of a completed send/regenerate turn.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// The persisted assistant message.
    pub message: Message,

    /// How the stream ended.
    pub outcome: IngestOutcome,

    /// Whether the caller should summarize now.
    pub needs_summarization: bool,

    /// Exactly the messages to hand to the summarizer.
    pub pending_summarization: Vec<Message>,
}

/// The engine facade consumed by the UI layer.
pub struct ChatEngine {
    storage: Arc<SwappableStore>,
    memory: Arc<SemanticMemory>,
    assembler: ContextAssembler,
    client: ChatClient,
    config: AppConfig,
}

impl ChatEngine {
    /// Build an engine from configuration.
    pub async fn new(config: AppConfig) -> Result<Self, Error> {
        let backend: Arc<dyn StorageBackend> = match config.storage.backend.as_str() {
            "directory" => {
                let root = config.storage.directory_root.clone().ok_or(Error::Config {
                    message: "directory backend requires a granted folder".into(),
                })?;
                Arc::new(DirectoryStore::open(root)?)
            }
            _ => Arc::new(SqliteStore::new(&config.storage.sqlite_path).await?),
        };
        let storage = Arc::new(SwappableStore::new(backend));

        let embedder = EmbedderHandle::http(
            config.memory.embedding_base_url.clone(),
            config.provider.api_key.clone(),
            config.memory.embedding_model.clone(),
        );
        let shared: Arc<dyn StorageBackend> = storage.clone();
        let memory = Arc::new(SemanticMemory::new(shared, embedder, config.memory.enabled));

        let client = ChatClient::new(
            config.provider.base_url.clone(),
            config.provider.api_key.clone(),
        );

        Ok(Self::with_parts(storage, memory, client, config))
    }

    /// Assemble an engine from pre-built collaborators (hosts and tests).
    pub fn with_parts(
        storage: Arc<SwappableStore>,
        memory: Arc<SemanticMemory>,
        client: ChatClient,
        config: AppConfig,
    ) -> Self {
        let assembler = ContextAssembler::new(memory.clone());
        Self {
            storage,
            memory,
            assembler,
            client,
            config,
        }
    }

    // ── Send / regenerate / edit ─────────────────────────────────────────

    /// Send a user message and stream the assistant's reply through the
    /// handler. Returns once the turn is persisted.
    pub async fn send_message<H: StreamHandler>(
        &self,
        conversation_id: &str,
        text: &str,
        images: Vec<ImageRef>,
        system_prompt: &str,
        handler: &H,
        cancel: watch::Receiver<bool>,
    ) -> Result<SendOutcome, Error> {
        // Input/config errors never reach the network.
        if self.config.provider.model.trim().is_empty() {
            let error = ProviderError::NoModelSelected;
            handler.on_error(&error).await;
            return Err(error.into());
        }
        if text.trim().is_empty() && images.is_empty() {
            let error = ProviderError::EmptyPrompt;
            handler.on_error(&error).await;
            return Err(error.into());
        }

        let mut conversation = self.load_or_create(conversation_id).await?;
        let parent_id = conversation.messages.last().map(|m| m.id.clone());
        let mut user_message = Message::user_with_images(text, images);
        user_message.parent_id = parent_id;
        let user_id = user_message.id.clone();

        conversation.push(user_message);
        // Persist before assembling: assembly must read a snapshot at
        // least as fresh as this turn's write.
        self.save_conversation(&conversation).await?;

        self.run_turn(conversation, user_id, system_prompt, handler, cancel)
            .await
    }

    /// Drop the trailing assistant turn and produce a replacement.
    /// The new turn shares the replaced turn's parent linkage.
    pub async fn regenerate<H: StreamHandler>(
        &self,
        conversation_id: &str,
        system_prompt: &str,
        handler: &H,
        cancel: watch::Receiver<bool>,
    ) -> Result<SendOutcome, Error> {
        let mut conversation = self.require_conversation(conversation_id).await?;

        let dropped_parent = match conversation.messages.last() {
            Some(m) if m.role == Role::Assistant => {
                let parent = m.parent_id.clone();
                conversation.messages.pop();
                parent
            }
            _ => None,
        };

        let parent_id = dropped_parent
            .or_else(|| {
                conversation
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.id.clone())
            })
            .unwrap_or_default();

        if conversation.messages.is_empty() {
            return Err(Error::Internal("nothing to regenerate".into()));
        }

        self.save_conversation(&conversation).await?;
        self.run_turn(conversation, parent_id, system_prompt, handler, cancel)
            .await
    }

    /// Edit a user turn in place. Assistant turns are immutable —
    /// regenerate instead.
    pub async fn edit_message(
        &self,
        conversation_id: &str,
        message_id: &str,
        new_text: &str,
    ) -> Result<(), Error> {
        let mut conversation = self.require_conversation(conversation_id).await?;
        let message = conversation
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| Error::Internal(format!("unknown message: {message_id}")))?;

        if message.role != Role::User {
            return Err(Error::Internal("only user messages can be edited".into()));
        }

        message.content = new_text.to_string();
        message.token_count = None;
        conversation.updated_at = Utc::now();
        self.save_conversation(&conversation).await
    }

    async fn run_turn<H: StreamHandler>(
        &self,
        mut conversation: Conversation,
        parent_user_id: String,
        system_prompt: &str,
        handler: &H,
        cancel: watch::Receiver<bool>,
    ) -> Result<SendOutcome, Error> {
        let model = &self.config.provider.model;

        let ctx = match self
            .assembler
            .assemble(&conversation.id.0, &conversation.messages, system_prompt, model)
            .await
        {
            Ok(ctx) => ctx,
            Err(e) => {
                // Degraded but available beats precise but down.
                warn!(error = %e, "Full context assembly failed; using memory-free fallback");
                ContextAssembler::assemble_minimal(
                    &conversation.messages,
                    system_prompt,
                    conversation.summary.as_deref(),
                    model,
                )
            }
        };

        let rx = match self
            .client
            .stream_chat(model, &ctx.blocks, &self.generation_params())
            .await
        {
            Ok(rx) => rx,
            Err(error) => {
                handler.on_error(&error).await;
                return Err(error.into());
            }
        };

        // ingest() invokes the handler callbacks, including on_error.
        let result = ingest(rx, handler, &self.ingest_options(), cancel).await?;

        let mut assistant = Message::assistant(result.text);
        assistant.parent_id = Some(parent_user_id);
        conversation.push(assistant.clone());
        self.save_conversation(&conversation).await?;

        // Fire-and-forget embedding of the new turns, off the send path.
        let new_user = conversation
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .cloned();
        if let Some(user) = new_user {
            self.spawn_embedding(conversation.id.0.clone(), user);
        }
        self.spawn_embedding(conversation.id.0.clone(), assistant.clone());

        Ok(SendOutcome {
            message: assistant,
            outcome: result.outcome,
            needs_summarization: ctx.needs_summarization,
            pending_summarization: ctx.pending_summarization,
        })
    }

    // ── Summaries ────────────────────────────────────────────────────────

    /// Persist a summary produced by the external summarizer.
    ///
    /// The watermark never moves backward; an `up_to` older than the
    /// stored one is rejected.
    pub async fn apply_summary(
        &self,
        conversation_id: &str,
        summary_text: &str,
        up_to: DateTime<Utc>,
    ) -> Result<(), Error> {
        let mut conversation = self.require_conversation(conversation_id).await?;

        if let Some(existing) = conversation.summarized_up_to {
            if up_to < existing {
                return Err(Error::Internal(
                    "summary watermark cannot move backward".into(),
                ));
            }
        }

        self.memory
            .save_summary(&ConversationSummary {
                conversation_id: conversation_id.to_string(),
                summary: summary_text.to_string(),
                summarized_up_to: up_to,
                token_count: estimate_tokens(summary_text),
                updated_at: Utc::now(),
            })
            .await?;

        conversation.summary = Some(summary_text.to_string());
        conversation.summarized_up_to = Some(up_to);
        self.save_conversation(&conversation).await
    }

    // ── Conversation CRUD ────────────────────────────────────────────────

    pub async fn create_conversation(&self, title: Option<String>) -> Result<Conversation, Error> {
        let mut conversation = Conversation::new();
        conversation.title = title;
        self.save_conversation(&conversation).await?;
        Ok(conversation)
    }

    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, Error> {
        Ok(self.storage.get_json(RecordKind::Conversation, id).await?)
    }

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, Error> {
        let ids = self.storage.list_ids(RecordKind::Conversation).await?;
        let mut conversations = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(conversation) = self.get_conversation(&id).await? {
                conversations.push(conversation);
            }
        }
        Ok(conversations)
    }

    pub async fn rename_conversation(&self, id: &str, title: &str) -> Result<(), Error> {
        let mut conversation = self.require_conversation(id).await?;
        conversation.title = Some(title.to_string());
        self.save_conversation(&conversation).await
    }

    /// Delete a conversation, cascading to its embeddings and summary.
    pub async fn delete_conversation(&self, id: &str) -> Result<(), Error> {
        self.storage.delete(RecordKind::Conversation, id).await?;
        self.memory.delete_all(id).await?;
        debug!(conversation_id = id, "Conversation deleted with cascade");
        Ok(())
    }

    /// Bulk data-clear: every record of every kind.
    pub async fn clear_all(&self) -> Result<(), Error> {
        for kind in RecordKind::all() {
            for id in self.storage.list_ids(kind).await? {
                self.storage.delete(kind, &id).await?;
            }
        }
        Ok(())
    }

    // ── Folders ──────────────────────────────────────────────────────────

    /// Folders are an attribute of conversations, not records of their own.
    pub async fn set_folder(&self, id: &str, folder_id: Option<String>) -> Result<(), Error> {
        let mut conversation = self.require_conversation(id).await?;
        conversation.folder_id = folder_id;
        self.save_conversation(&conversation).await
    }

    pub async fn list_folders(&self) -> Result<Vec<String>, Error> {
        let mut folders: Vec<String> = self
            .list_conversations()
            .await?
            .into_iter()
            .filter_map(|c| c.folder_id)
            .collect();
        folders.sort();
        folders.dedup();
        Ok(folders)
    }

    // ── Media ────────────────────────────────────────────────────────────

    /// Store a media blob; returns its content-hash id.
    pub async fn save_media(&self, bytes: &[u8], ext: &str) -> Result<String, Error> {
        let id = media_id(bytes, ext);
        self.storage.set(RecordKind::Media, &id, bytes).await?;
        Ok(id)
    }

    pub async fn load_media(&self, id: &str) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.storage.get(RecordKind::Media, id).await?)
    }

    /// Load a media blob re-encoded for message attachment.
    pub async fn load_media_as_image(
        &self,
        id: &str,
        media_type: &str,
    ) -> Result<Option<ImageRef>, Error> {
        use base64::Engine as _;
        Ok(self.load_media(id).await?.map(|bytes| ImageRef {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            media_type: media_type.to_string(),
        }))
    }

    // ── Backend switching & toggles ──────────────────────────────────────

    /// Migrate every record into `new`, then make it the active backend.
    /// Returns the number of records copied.
    pub async fn switch_backend(&self, new: Arc<dyn StorageBackend>) -> Result<usize, Error> {
        let current = self.storage.current().await;
        let copied = migrate(current.as_ref(), new.as_ref()).await?;
        self.storage.swap(new).await;
        Ok(copied)
    }

    pub fn set_memory_enabled(&self, enabled: bool) {
        self.memory.set_enabled(enabled);
    }

    pub fn memory(&self) -> &Arc<SemanticMemory> {
        &self.memory
    }

    pub fn storage(&self) -> &Arc<SwappableStore> {
        &self.storage
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    async fn load_or_create(&self, id: &str) -> Result<Conversation, Error> {
        if let Some(conversation) = self.get_conversation(id).await? {
            return Ok(conversation);
        }
        let mut conversation = Conversation::new();
        conversation.id = ConversationId::from(id);
        Ok(conversation)
    }

    async fn require_conversation(&self, id: &str) -> Result<Conversation, Error> {
        self.get_conversation(id)
            .await?
            .ok_or_else(|| Error::Internal(format!("unknown conversation: {id}")))
    }

    async fn save_conversation(&self, conversation: &Conversation) -> Result<(), Error> {
        Ok(self
            .storage
            .set_json(RecordKind::Conversation, &conversation.id.0, conversation)
            .await?)
    }

    fn generation_params(&self) -> GenerationParams {
        let p = &self.config.provider;
        GenerationParams {
            temperature: p.temperature,
            max_tokens: p.max_tokens,
            top_p: p.top_p,
            frequency_penalty: p.frequency_penalty,
            presence_penalty: p.presence_penalty,
        }
    }

    fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            stall_timeout: Duration::from_secs(self.config.stream.stall_timeout_secs),
            request_timeout: Duration::from_secs(self.config.stream.request_timeout_secs),
        }
    }

    fn spawn_embedding(&self, conversation_id: String, message: Message) {
        let memory = self.memory.clone();
        tokio::spawn(async move {
            // Errors reduce functionality, never correctness: log and move on.
            if let Err(e) = memory.store(&conversation_id, &message).await {
                warn!(error = %e, message_id = %message.id, "Background embedding failed");
            }
        });
    }
}
