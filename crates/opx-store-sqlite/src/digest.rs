// crates/opx-store-sqlite/src/digest.rs
// ============================================================================
// Module: Integrity Digest
// Description: SHA-256 digest of serialized entity bytes, stored alongside
// every row and verified on read.
// Purpose: Detect on-disk corruption before a corrupted record is handed
// back to a caller.
// Dependencies: sha2
// ============================================================================

use sha2::Digest;
use sha2::Sha256;

/// Returns the lowercase hex SHA-256 digest of `bytes`.
#[must_use]
pub fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().iter().map(|byte| format!("{byte:02x}")).collect()
}
