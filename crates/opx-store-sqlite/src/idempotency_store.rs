// crates/opx-store-sqlite/src/idempotency_store.rs
// ============================================================================
// Module: SQLite Idempotency Store
// Description: Durable IdempotencyStore backed by SQLite. `complete` is
// gated on the stored status still being IN_PROGRESS.
// Dependencies: opx_core::idempotency, opx_stores::idempotency_store, rusqlite
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use opx_core::idempotency::IdempotencyRecord;
use opx_core::idempotency::IdempotencyStatus;
use opx_stores::IdempotencyStore;
use opx_stores::IdempotencyStoreError;
use opx_stores::IdempotencyStoreOrState;
use opx_stores::PutOutcome;
use opx_stores::StoreError;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::digest::hex_digest;
use crate::error::SqliteStoreError;

/// Renders an [`IdempotencyStatus`] as its storage string.
fn status_string(status: IdempotencyStatus) -> &'static str {
    match status {
        IdempotencyStatus::InProgress => "IN_PROGRESS",
        IdempotencyStatus::Completed => "COMPLETED",
    }
}

/// `SQLite`-backed [`IdempotencyStore`].
#[derive(Clone)]
pub struct SqliteIdempotencyStore {
    /// Shared connection, guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteIdempotencyStore {
    /// Wraps an already-initialized connection.
    #[must_use]
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    /// Locks the shared connection, translating a poisoned mutex into
    /// [`SqliteStoreError::Db`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("idempotency store connection mutex poisoned".to_string()))
    }
}

impl IdempotencyStore for SqliteIdempotencyStore {
    fn create(&self, record: IdempotencyRecord) -> Result<PutOutcome, StoreError> {
        let connection = self.lock()?;
        let body = serde_json::to_vec(&record).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?;
        let hash = hex_digest(&body);
        let rows = connection
            .execute(
                "INSERT OR IGNORE INTO idempotency_records (idempotency_key, status, body_json, body_hash) VALUES (?1, ?2, ?3, ?4)",
                params![record.idempotency_key, status_string(record.status), body, hash],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(if rows == 0 { PutOutcome::AlreadyExists } else { PutOutcome::Created })
    }

    fn get(&self, idempotency_key: &str) -> Result<Option<IdempotencyRecord>, StoreError> {
        let connection = self.lock()?;
        let row: Option<(Vec<u8>, String)> = connection
            .query_row("SELECT body_json, body_hash FROM idempotency_records WHERE idempotency_key = ?1", params![idempotency_key], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()
            .map_err(SqliteStoreError::from)?;
        let Some((body, hash)) = row else {
            return Ok(None);
        };
        if hex_digest(&body) != hash {
            return Err(SqliteStoreError::Corrupt { kind: "idempotency_record", id: idempotency_key.to_string() }.into());
        }
        Ok(Some(serde_json::from_slice(&body).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?))
    }

    fn complete(&self, record: IdempotencyRecord) -> Result<IdempotencyRecord, IdempotencyStoreOrState> {
        let connection = self.lock()?;
        let found_status: Option<String> = connection
            .query_row("SELECT status FROM idempotency_records WHERE idempotency_key = ?1", params![record.idempotency_key], |row| row.get(0))
            .optional()
            .map_err(SqliteStoreError::from)?;
        let Some(found_status) = found_status else {
            return Err(IdempotencyStoreError::NotFound(record.idempotency_key).into());
        };
        if found_status == status_string(IdempotencyStatus::Completed) {
            return Err(IdempotencyStoreError::AlreadyCompleted(record.idempotency_key).into());
        }
        let body = serde_json::to_vec(&record).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?;
        let hash = hex_digest(&body);
        let rows = connection
            .execute(
                "UPDATE idempotency_records SET status = ?2, body_json = ?3, body_hash = ?4 WHERE idempotency_key = ?1 AND status = 'IN_PROGRESS'",
                params![record.idempotency_key, status_string(record.status), body, hash],
            )
            .map_err(SqliteStoreError::from)?;
        if rows == 0 {
            return Err(IdempotencyStoreError::AlreadyCompleted(record.idempotency_key).into());
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SqliteStoreConfig;
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
            request_fingerprint: RequestFingerprint { fields: vec!["incidentId".to_string()], hash: "hash1".to_string() },
            incident_id: None,
            response: None,
        }
    }

    fn store() -> (tempfile::TempDir, SqliteIdempotencyStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SqliteStoreConfig::new(dir.path().join("opx.db"));
        let connection = crate::connection::open(&config).expect("open");
        (dir, SqliteIdempotencyStore::new(Arc::new(Mutex::new(connection))))
    }

    #[test]
    fn create_twice_is_idempotent() {
        let (_dir, store) = store();
        assert_eq!(store.create(in_progress("k1")).expect("create"), PutOutcome::Created);
        assert_eq!(store.create(in_progress("k1")).expect("create"), PutOutcome::AlreadyExists);
    }

    #[test]
    fn complete_twice_is_refused() {
        let (_dir, store) = store();
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
        let (_dir, store) = store();
        let err = store.complete(in_progress("missing")).unwrap_err();
        assert!(matches!(err, IdempotencyStoreOrState::State(IdempotencyStoreError::NotFound(_))));
    }
}
