// crates/opx-store-sqlite/src/error.rs
// ============================================================================
// Module: SQLite Store Error
// Description: The error type every durable store in this crate raises,
// plus its conversion into opx_stores::StoreError for trait conformance.
// Dependencies: opx_stores, rusqlite
// ============================================================================

use opx_stores::StoreError;

/// Errors raised by a durable `SQLite`-backed store.
#[derive(Debug, thiserror::Error)]
pub enum SqliteStoreError {
    /// The underlying `SQLite` engine returned an error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// A stored row's JSON body failed to deserialize.
    #[error("sqlite store deserialize error: {0}")]
    Deserialize(String),
    /// A stored row's digest did not match its body.
    #[error("sqlite store corruption: {kind} {id}: digest mismatch")]
    Corrupt {
        /// The entity kind being read.
        kind: &'static str,
        /// The id that failed verification.
        id: String,
    },
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Db(message) => Self::Io(message),
            SqliteStoreError::Deserialize(message) => Self::Io(message),
            SqliteStoreError::Corrupt { kind, id } => Self::Integrity {
                kind,
                id,
                detail: "stored digest does not match stored body".to_string(),
            },
        }
    }
}
