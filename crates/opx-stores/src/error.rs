// crates/opx-stores/src/error.rs
// ============================================================================
// Module: Store Error & Put Outcome
// Description: The shared error and conditional-create result types used by
// every entity store.
// Purpose: Give every store trait a single vocabulary for I/O failure and
// create-if-absent semantics.
// Dependencies: none
// ============================================================================

//! ## Overview
//! Every append-only store's `put` returns [`PutOutcome`] rather than a
//! bare success, so callers can distinguish a fresh write from an
//! idempotent replay without a separate existence check.

/// Store errors, shared across every store trait in this crate.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying storage I/O failed.
    #[error("store io error: {0}")]
    Io(String),
    /// A stored item failed schema/invariant validation on read; an
    /// integrity fault, surfaced but not auto-repaired.
    #[error("store integrity fault reading {kind} {id}: {detail}")]
    Integrity {
        /// The entity kind being read.
        kind: &'static str,
        /// The id that failed validation.
        id: String,
        /// What validation found wrong.
        detail: String,
    },
}

/// Result of a conditional `put(entity)` — create-if-absent on the primary
/// key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// No prior record existed at this key; the new record was stored.
    Created,
    /// A record already existed at this key; the store did not overwrite
    /// it. Per the idempotency guarantee, the existing stored bytes must
    /// be identical content for a correct caller.
    AlreadyExists,
}
