//! One-time migration copy between storage substrates.
//!
//! Every record of every kind is copied from the old backend into the
//! new one. Records are copied content-equal; ids and namespaces are
//! preserved. Used exactly once per user-triggered backend switch.

use boundless_core::error::StorageError;
use boundless_core::storage::{RecordKind, StorageBackend};
use tracing::{info, warn};

/// Copy all records from `old` to `new`. Returns the number of records
/// copied. A record that fails to read is skipped with a warning; a
/// write failure aborts the migration so the switch is not committed.
pub async fn migrate(
    old: &dyn StorageBackend,
    new: &dyn StorageBackend,
) -> Result<usize, StorageError> {
    let mut copied = 0usize;

    for kind in RecordKind::all() {
        let ids = old.list_ids(kind).await?;
        for id in ids {
            let data = match old.get(kind, &id).await {
                Ok(Some(data)) => data,
                Ok(None) => continue,
                Err(e) => {
                    warn!(%kind, %id, error = %e, "Skipping unreadable record during migration");
                    continue;
                }
            };
            new.set(kind, &id, &data)
                .await
                .map_err(|e| StorageError::Migration(format!("{kind}/{id}: {e}")))?;
            copied += 1;
        }
    }

    info!(
        from = old.name(),
        to = new.name(),
        copied, "Storage migration complete"
    );
    Ok(copied)
}
