//! # Boundless Core
//!
//! Domain types, traits, and error definitions for the Boundless chat engine.
//! This crate has **zero framework dependencies** — it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod memory;
pub mod message;
pub mod provider;
pub mod storage;

// Re-export key types at crate root for ergonomics
pub use error::{ContextError, Error, MemoryError, ProviderError, Result, StorageError};
pub use memory::{ConversationSummary, Embedder, EmbeddingCollection, EmbeddingRecord};
pub use message::{Conversation, ConversationId, ImageRef, Message, Role};
pub use provider::{ContextBlock, GenerationParams, StreamDelta, StreamNotice};
pub use storage::{RecordKind, StorageBackend, StorageExt};
