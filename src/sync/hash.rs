//! Content hashing for exported artifacts.
//!
//! The export ledger stores a SHA256 of each artifact so status can tell
//! whether the file on disk is still the one last written.

use sha2::{Digest, Sha256};

/// Compute a hex SHA256 of `content`.
#[must_use]
pub fn content_hash(content: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_ref());
    format!("{:x}", hasher.finalize())
}

/// Check if an artifact has changed since it was last exported.
///
/// Returns `true` if there is no stored hash or the hashes differ.
#[must_use]
pub fn has_changed(current_hash: &str, stored_hash: Option<&str>) -> bool {
    stored_hash.is_none_or(|h| h != current_hash)
}
