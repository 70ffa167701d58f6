//! Directory-backed store — one file per record under a user-granted folder.
//!
//! The grant is modelled as a marker file written when the user first
//! picks the folder. If the folder (or the marker) later disappears or
//! becomes unreadable, operations surface `StorageError::AccessRevoked`
//! — distinct from a missing record, which is `Ok(None)`. The remembered
//! root allows `reauthorize` to re-validate without re-picking.
//!
//! Layout: `<root>/<namespace>/<id>` with a `.json` suffix for structured
//! kinds; media ids already carry their own extension.

use async_trait::async_trait;
use boundless_core::error::StorageError;
use boundless_core::storage::{RecordKind, StorageBackend};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

const GRANT_MARKER: &str = ".boundless-grant";

/// A directory-backed storage backend.
pub struct DirectoryStore {
    root: PathBuf,
    granted: AtomicBool,
}

impl DirectoryStore {
    /// Open the store at a user-granted folder, creating the namespace
    /// subdirectories and the grant marker.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| StorageError::Io(format!("cannot use granted folder: {e}")))?;

        for kind in RecordKind::all() {
            std::fs::create_dir_all(root.join(kind.namespace()))
                .map_err(|e| StorageError::Io(format!("cannot create {kind} directory: {e}")))?;
        }

        std::fs::write(root.join(GRANT_MARKER), b"granted")
            .map_err(|e| StorageError::Io(format!("cannot write grant marker: {e}")))?;

        info!(root = %root.display(), "Directory storage backend opened");
        Ok(Self {
            root,
            granted: AtomicBool::new(true),
        })
    }

    /// The remembered root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Re-validate the remembered grant without re-picking the folder.
    ///
    /// Succeeds when the root and marker are still readable; restores
    /// normal operation after a transient revocation (e.g. an unmounted
    /// volume that came back).
    pub fn reauthorize(&self) -> Result<(), StorageError> {
        self.check_grant()?;
        self.granted.store(true, Ordering::SeqCst);
        debug!(root = %self.root.display(), "Directory grant re-validated");
        Ok(())
    }

    /// Verify the grant marker is still reachable.
    fn check_grant(&self) -> Result<(), StorageError> {
        let marker = self.root.join(GRANT_MARKER);
        match std::fs::metadata(&marker) {
            Ok(_) => Ok(()),
            Err(e) => {
                self.granted.store(false, Ordering::SeqCst);
                warn!(root = %self.root.display(), error = %e, "Directory grant no longer valid");
                Err(StorageError::AccessRevoked(format!(
                    "granted folder is no longer accessible: {e}"
                )))
            }
        }
    }

    /// Map (kind, id) to a file path. Structured kinds get a `.json`
    /// suffix; media ids carry their extension already.
    fn record_path(&self, kind: RecordKind, id: &str) -> PathBuf {
        let file_name = match kind {
            RecordKind::Media => sanitize(id),
            _ => format!("{}.json", sanitize(id)),
        };
        self.root.join(kind.namespace()).join(file_name)
    }
}

/// Strip path separators and parent references out of record ids.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect::<String>()
        .replace("..", "_")
}

#[async_trait]
impl StorageBackend for DirectoryStore {
    fn name(&self) -> &str {
        "directory"
    }

    async fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.check_grant()?;
        let path = self.record_path(kind, id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(format!(
                "read {} failed: {e}",
                path.display()
            ))),
        }
    }

    async fn set(&self, kind: RecordKind, id: &str, data: &[u8]) -> Result<(), StorageError> {
        self.check_grant()?;
        let path = self.record_path(kind, id);
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| StorageError::Io(format!("write {} failed: {e}", path.display())))
    }

    async fn delete(&self, kind: RecordKind, id: &str) -> Result<bool, StorageError> {
        self.check_grant()?;
        let path = self.record_path(kind, id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(format!(
                "delete {} failed: {e}",
                path.display()
            ))),
        }
    }

    async fn list_ids(&self, kind: RecordKind) -> Result<Vec<String>, StorageError> {
        self.check_grant()?;
        let dir = self.root.join(kind.namespace());
        let mut ids = Vec::new();

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| StorageError::Io(format!("list {} failed: {e}", dir.display())))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::Io(format!("list {} failed: {e}", dir.display())))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == GRANT_MARKER {
                continue;
            }
            let id = match kind {
                RecordKind::Media => name,
                _ => match name.strip_suffix(".json") {
                    Some(stem) => stem.to_string(),
                    None => continue,
                },
            };
            ids.push(id);
        }

        Ok(ids)
    }

    async fn size_bytes(&self) -> Result<u64, StorageError> {
        self.check_grant()?;
        let mut total = 0u64;
        for kind in RecordKind::all() {
            let dir = self.root.join(kind.namespace());
            let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                if let Ok(meta) = entry.metadata().await {
                    total += meta.len();
                }
            }
        }
        Ok(total)
    }
}
