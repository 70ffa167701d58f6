//! Error types for the Boundless domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Boundless operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Storage errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Context assembly errors ---
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Errors from LLM provider interactions.
///
/// Non-2xx responses are classified into user-facing categories; each
/// variant's message carries the guidance text shown to the user.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("No model selected. Pick a model before sending.")]
    NoModelSelected,

    #[error("Nothing to send: the assembled context is empty.")]
    EmptyPrompt,

    #[error("Bad request: {0}. Check the model id and request options.")]
    BadRequest(String),

    #[error("Authentication failed: {0}. Check your API key.")]
    Authentication(String),

    #[error("Payment or quota issue: {0}. Check your plan and billing.")]
    PaymentRequired(String),

    #[error("Permission denied: {0}. Your key may not have access to this model.")]
    PermissionDenied(String),

    #[error("Model not found: {0}. Check the model id for this provider.")]
    ModelNotFound(String),

    #[error("Endpoint not found: {0}. Check the provider base URL.")]
    EndpointNotFound(String),

    #[error("This model does not support image input: {0}. Switch to a vision-capable model.")]
    VisionUnsupported(String),

    #[error("Rate limited by provider: {0}. Wait a moment and retry.")]
    RateLimited(String),

    #[error("The conversation no longer fits the model's context window: {0}")]
    ContextLengthExceeded(String),

    #[error("Provider server error: {0}. The provider is having trouble; retry later.")]
    UpstreamServer(String),

    #[error("Gateway timeout: {0}. The provider took too long to answer.")]
    GatewayTimeout(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}. Check your connection.")]
    Network(String),

    #[error("The model is not responding. The request timed out.")]
    Timeout,

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("The model returned an empty response. Check the model id and your quota.")]
    EmptyResponse,
}

/// Errors from the storage substrate.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The directory capability grant expired or the folder is gone.
    /// Distinct from a missing record, which reads as `Ok(None)`.
    #[error("Storage access revoked: {0}")]
    AccessRevoked(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Errors from the semantic memory subsystem.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),
}

/// Errors from context assembly.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Storage error during assembly: {0}")]
    Storage(String),

    #[error("Assembly failed: {0}")]
    Assembly(String),
}

impl From<StorageError> for ContextError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<StorageError> for MemoryError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e.to_string())
    }
}
