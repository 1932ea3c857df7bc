// crates/opx-stores/src/idempotency_store.rs
// ============================================================================
// Module: Idempotency Store
// Description: Permanent, conditional-create store for idempotency records;
// an allowed single mutation closes InProgress into Completed.
// Purpose: Back opx_core::idempotency's reconcile/start/complete lifecycle.
// Dependencies: opx_core::idempotency, crate::error
// ============================================================================

//! ## Overview
//! No TTL, no overwrite: once created under an idempotency key, a record
//! lives forever, matching spec's "idempotency records are never deleted"
//! rule. `complete` is the only update path and is only valid while the
//! record is still IN_PROGRESS.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use opx_core::idempotency::IdempotencyRecord;
use opx_core::idempotency::IdempotencyStatus;

use crate::error::PutOutcome;
use crate::error::StoreError;

/// Why an idempotency record `complete` was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdempotencyStoreError {
    /// No record exists at this key.
    #[error("idempotency key {0} does not exist")]
    NotFound(String),
    /// The record is already COMPLETED.
    #[error("idempotency key {0} is already completed")]
    AlreadyCompleted(String),
}

/// Combined error for [`IdempotencyStore::complete`].
#[derive(Debug, thiserror::Error)]
pub enum IdempotencyStoreOrState {
    /// Underlying store I/O failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The update was refused.
    #[error(transparent)]
    State(#[from] IdempotencyStoreError),
}

/// Permanent store for [`IdempotencyRecord`] entries.
pub trait IdempotencyStore {
    /// Conditionally creates `record` by `record.idempotency_key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn create(&self, record: IdempotencyRecord) -> Result<PutOutcome, StoreError>;

    /// Reads a record by key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure or integrity fault.
    fn get(&self, idempotency_key: &str) -> Result<Option<IdempotencyRecord>, StoreError>;

    /// Replaces the stored IN_PROGRESS record with `record`, which must be
    /// COMPLETED; refuses if the stored record is missing or already
    /// completed.
    ///
    /// # Errors
    ///
    /// Returns [`IdempotencyStoreError`] on a missing or already-completed
    /// record, or [`StoreError`] on I/O failure.
    fn complete(&self, record: IdempotencyRecord) -> Result<IdempotencyRecord, IdempotencyStoreOrState>;
}

/// Deterministic in-memory reference implementation of
/// [`IdempotencyStore`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryIdempotencyStore {
    /// Records keyed by `idempotency_key`.
    records: Arc<Mutex<BTreeMap<String, IdempotencyRecord>>>,
}

impl InMemoryIdempotencyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the record map, translating a poisoned mutex into
    /// [`StoreError::Io`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, IdempotencyRecord>>, StoreError> {
        self.records.lock().map_err(|_| StoreError::Io("idempotency store mutex poisoned".to_string()))
    }
}

impl IdempotencyStore for InMemoryIdempotencyStore {
    fn create(&self, record: IdempotencyRecord) -> Result<PutOutcome, StoreError> {
        let mut guard = self.lock()?;
        if guard.contains_key(&record.idempotency_key) {
            return Ok(PutOutcome::AlreadyExists);
        }
        guard.insert(record.idempotency_key.clone(), record);
        Ok(PutOutcome::Created)
    }

    fn get(&self, idempotency_key: &str) -> Result<Option<IdempotencyRecord>, StoreError> {
        Ok(self.lock()?.get(idempotency_key).cloned())
    }

    fn complete(&self, record: IdempotencyRecord) -> Result<IdempotencyRecord, IdempotencyStoreOrState> {
        let mut guard = self.lock()?;
        let Some(existing) = guard.get(&record.idempotency_key).cloned() else {
            return Err(IdempotencyStoreError::NotFound(record.idempotency_key).into());
        };
        if existing.status == IdempotencyStatus::Completed {
            return Err(IdempotencyStoreError::AlreadyCompleted(record.idempotency_key).into());
        }
        guard.insert(record.idempotency_key.clone(), record.clone());
        Ok(record)
    }
}

/// Shared, clonable handle to an [`IdempotencyStore`] implementation.
#[derive(Clone)]
pub struct SharedIdempotencyStore {
    /// Inner store implementation.
    inner: Arc<dyn IdempotencyStore + Send + Sync>,
}

impl SharedIdempotencyStore {
    /// Wraps an idempotency store in a shared, clonable handle.
    #[must_use]
    pub fn from_store(store: impl IdempotencyStore + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(store) }
    }
}

impl IdempotencyStore for SharedIdempotencyStore {
    fn create(&self, record: IdempotencyRecord) -> Result<PutOutcome, StoreError> {
        self.inner.create(record)
    }

    fn get(&self, idempotency_key: &str) -> Result<Option<IdempotencyRecord>, StoreError> {
        self.inner.get(idempotency_key)
    }

    fn complete(&self, record: IdempotencyRecord) -> Result<IdempotencyRecord, IdempotencyStoreOrState> {
        self.inner.complete(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opx_core::idempotency::RequestFingerprint;
    use opx_core::time::Timestamp;

    fn in_progress(key: &str) -> IdempotencyRecord {
        IdempotencyRecord {
            idempotency_key: key.to_string(),
            request_hash: "hash1".to_string(),
            status: IdempotencyStatus::InProgress,
            principal: "oncall@example.com".to_string(),
            created_at: Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts"),
            completed_at: None,
            request_fingerprint: RequestFingerprint {
                fields: vec!["incidentId".to_string()],
                hash: "hash1".to_string(),
            },
            incident_id: None,
            response: None,
        }
    }

    #[test]
    fn create_twice_is_idempotent() {
        let store = InMemoryIdempotencyStore::new();
        assert_eq!(store.create(in_progress("k1")).expect("create"), PutOutcome::Created);
        assert_eq!(store.create(in_progress("k1")).expect("create"), PutOutcome::AlreadyExists);
    }

    #[test]
    fn complete_twice_is_refused() {
        let store = InMemoryIdempotencyStore::new();
        store.create(in_progress("k1")).expect("create");
        let mut completed = in_progress("k1");
        completed.status = IdempotencyStatus::Completed;
        completed.completed_at = Some(Timestamp::parse("2026-03-05T00:01:00.000Z").expect("ts"));
        store.complete(completed.clone()).expect("complete");
        let err = store.complete(completed).unwrap_err();
        assert!(matches!(err, IdempotencyStoreOrState::State(IdempotencyStoreError::AlreadyCompleted(_))));
    }

    #[test]
    fn complete_against_missing_key_is_not_found() {
        let store = InMemoryIdempotencyStore::new();
        let err = store.complete(in_progress("missing")).unwrap_err();
        assert!(matches!(err, IdempotencyStoreOrState::State(IdempotencyStoreError::NotFound(_))));
    }
}
