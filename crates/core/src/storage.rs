//! StorageBackend trait — the pluggable persistence substrate.
//!
//! Two implementations ship with the engine: an embedded SQLite key-value
//! store (always available) and a capability-gated directory store (one
//! file per record). Callers never branch on which backend is active.
//!
//! Failure semantics: a read of a missing key is `Ok(None)`, never an
//! error. Write failures surface to the caller.

use crate::error::StorageError;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// The four logical record namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Full conversation blobs, keyed by conversation id.
    Conversation,
    /// One embedding collection per conversation.
    Embeddings,
    /// One rolling summary per conversation.
    Summary,
    /// Binary media, keyed by content hash.
    Media,
}

impl RecordKind {
    /// The namespace string used for keys and directory names.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Conversation => "conversations",
            Self::Embeddings => "embeddings",
            Self::Summary => "summaries",
            Self::Media => "media",
        }
    }

    /// All namespaces, for migration sweeps.
    pub fn all() -> [RecordKind; 4] {
        [
            Self::Conversation,
            Self::Embeddings,
            Self::Summary,
            Self::Media,
        ]
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.namespace())
    }
}

/// The core storage trait.
///
/// Implementations: SQLite (embedded KV), directory (one file per record).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// The backend name (e.g., "sqlite", "directory").
    fn name(&self) -> &str;

    /// Fetch a record's raw bytes. Missing key → `Ok(None)`.
    async fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store (upsert) a record's raw bytes.
    async fn set(&self, kind: RecordKind, id: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a record. Returns whether anything was removed.
    async fn delete(&self, kind: RecordKind, id: &str) -> Result<bool, StorageError>;

    /// List all record ids in a namespace.
    async fn list_ids(&self, kind: RecordKind) -> Result<Vec<String>, StorageError>;

    /// Best-effort total size of stored data in bytes.
    async fn size_bytes(&self) -> Result<u64, StorageError>;
}

/// Typed JSON convenience layer over the raw byte API.
#[async_trait]
pub trait StorageExt: StorageBackend {
    /// Fetch and decode a JSON record. Missing key → `Ok(None)`.
    async fn get_json<T: DeserializeOwned + Send>(
        &self,
        kind: RecordKind,
        id: &str,
    ) -> Result<Option<T>, StorageError> {
        match self.get(kind, id).await? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Encode and store a JSON record.
    async fn set_json<T: Serialize + Sync>(
        &self,
        kind: RecordKind,
        id: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.set(kind, id, &bytes).await
    }
}

impl<S: StorageBackend + ?Sized> StorageExt for S {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_are_stable() {
        assert_eq!(RecordKind::Conversation.namespace(), "conversations");
        assert_eq!(RecordKind::Embeddings.namespace(), "embeddings");
        assert_eq!(RecordKind::Summary.namespace(), "summaries");
        assert_eq!(RecordKind::Media.namespace(), "media");
    }

    #[test]
    fn all_covers_every_kind() {
        let kinds = RecordKind::all();
        assert_eq!(kinds.len(), 4);
        assert!(kinds.contains(&RecordKind::Media));
    }
}
