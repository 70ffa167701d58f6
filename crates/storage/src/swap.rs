//! A storage handle whose underlying substrate can be swapped at runtime.
//!
//! Callers hold one `SwappableStore` for the life of the process and never
//! branch on which backend is active. The active substrate is mutated only
//! by the engine's explicit switch operation, after migration completes.

use async_trait::async_trait;
use boundless_core::error::StorageError;
use boundless_core::storage::{RecordKind, StorageBackend};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-wide storage handle delegating to the active backend.
pub struct SwappableStore {
    inner: RwLock<Arc<dyn StorageBackend>>,
}

impl SwappableStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            inner: RwLock::new(backend),
        }
    }

    /// The currently active backend.
    pub async fn current(&self) -> Arc<dyn StorageBackend> {
        self.inner.read().await.clone()
    }

    /// Atomically replace the active backend. The caller is responsible
    /// for migrating records first.
    pub async fn swap(&self, backend: Arc<dyn StorageBackend>) {
        *self.inner.write().await = backend;
    }
}

#[async_trait]
impl StorageBackend for SwappableStore {
    fn name(&self) -> &str {
        "swappable"
    }

    async fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.current().await.get(kind, id).await
    }

    async fn set(&self, kind: RecordKind, id: &str, data: &[u8]) -> Result<(), StorageError> {
        self.current().await.set(kind, id, data).await
    }

    async fn delete(&self, kind: RecordKind, id: &str) -> Result<bool, StorageError> {
        self.current().await.delete(kind, id).await
    }

    async fn list_ids(&self, kind: RecordKind) -> Result<Vec<String>, StorageError> {
        self.current().await.list_ids(kind).await
    }

    async fn size_bytes(&self) -> Result<u64, StorageError> {
        self.current().await.size_bytes().await
    }
}
