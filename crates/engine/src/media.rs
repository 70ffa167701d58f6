//! Binary media storage, keyed by content hash.
//!
//! Media ids are `<sha256-hex>.<ext>` so identical attachments share one
//! record regardless of how many messages reference them.

use sha2::{Digest, Sha256};

/// Compute the storage id for a media blob.
pub fn media_id(bytes: &[u8], ext: &str) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = String::with_capacity(64 + 1 + ext.len());
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    let ext = ext.trim_start_matches('.');
    format!("{hex}.{ext}")
}
