// crates/opx-store-sqlite/src/promotion_store.rs
// ============================================================================
// Module: SQLite Promotion Store
// Description: Durable PromotionStore backed by SQLite.
// Dependencies: opx_core::promotion, opx_stores::promotion_store, rusqlite
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use opx_core::promotion::Decision;
use opx_core::promotion::PromotionResult;
use opx_stores::PromotionKey;
use opx_stores::PromotionStore;
use opx_stores::PutOutcome;
use opx_stores::StoreError;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::digest::hex_digest;
use crate::error::SqliteStoreError;

/// Renders a [`PromotionKey`] as the `result_key` primary key string.
fn result_key_string(key: &PromotionKey) -> String {
    match key {
        PromotionKey::Incident(incident_id) => format!("INCIDENT#{incident_id}"),
        PromotionKey::Candidate(candidate_id) => format!("CANDIDATE#{candidate_id}"),
    }
}

/// `SQLite`-backed [`PromotionStore`].
#[derive(Clone)]
pub struct SqlitePromotionStore {
    /// Shared connection, guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqlitePromotionStore {
    /// Wraps an already-initialized connection.
    #[must_use]
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    /// Locks the shared connection, translating a poisoned mutex into
    /// [`SqliteStoreError::Db`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("promotion store connection mutex poisoned".to_string()))
    }

    /// Reads and verifies a row by its `result_key`.
    fn get_by_key(&self, key: &PromotionKey) -> Result<Option<PromotionResult>, StoreError> {
        let connection = self.lock()?;
        let key_string = result_key_string(key);
        let row: Option<(Vec<u8>, String)> = connection
            .query_row("SELECT body_json, body_hash FROM promotion_results WHERE result_key = ?1", params![key_string], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()
            .map_err(SqliteStoreError::from)?;
        let Some((body, hash)) = row else {
            return Ok(None);
        };
        if hex_digest(&body) != hash {
            return Err(SqliteStoreError::Corrupt { kind: "promotion_result", id: key_string }.into());
        }
        let result = serde_json::from_slice(&body).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?;
        Ok(Some(result))
    }
}

impl PromotionStore for SqlitePromotionStore {
    fn put(&self, result: PromotionResult) -> Result<PutOutcome, StoreError> {
        let key = PromotionKey::for_result(&result);
        let key_string = result_key_string(&key);
        let (incident_id, candidate_id) = match &result.decision {
            Decision::Promote { incident_id } => (Some(incident_id.clone()), None),
            Decision::Reject { .. } => (None, Some(result.candidate_id.clone())),
        };
        let connection = self.lock()?;
        let body = serde_json::to_vec(&result).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?;
        let hash = hex_digest(&body);
        let rows = connection
            .execute(
                "INSERT OR IGNORE INTO promotion_results (result_key, incident_id, candidate_id, body_json, body_hash) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![key_string, incident_id, candidate_id, body, hash],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(if rows == 0 { PutOutcome::AlreadyExists } else { PutOutcome::Created })
    }

    fn get_by_incident(&self, incident_id: &str) -> Result<Option<PromotionResult>, StoreError> {
        self.get_by_key(&PromotionKey::Incident(incident_id.to_string()))
    }

    fn get_by_candidate(&self, candidate_id: &str) -> Result<Option<PromotionResult>, StoreError> {
        self.get_by_key(&PromotionKey::Candidate(candidate_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SqliteStoreConfig;
    use opx_core::confidence::ConfidenceBand;
    use opx_core::promotion::EvidenceWindow;
    use opx_core::promotion::RejectionCode;
    use opx_core::time::Timestamp;

    fn base(decision: Decision, candidate_id: &str) -> PromotionResult {
        PromotionResult {
            decision,
            candidate_id: candidate_id.to_string(),
            evidence_id: "evid1".to_string(),
            confidence_score: 0.7,
            confidence_band: ConfidenceBand::High,
            evidence_window: EvidenceWindow {
                start: Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts"),
                end: Timestamp::parse("2026-03-05T01:00:00.000Z").expect("ts"),
            },
            evaluated_at: Timestamp::parse("2026-03-05T01:00:01.000Z").expect("ts"),
            gate_version: "gate-v1.0.0".to_string(),
        }
    }

    fn store() -> (tempfile::TempDir, SqlitePromotionStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SqliteStoreConfig::new(dir.path().join("opx.db"));
        let connection = crate::connection::open(&config).expect("open");
        (dir, SqlitePromotionStore::new(Arc::new(Mutex::new(connection))))
    }

    #[test]
    fn promote_is_keyed_by_incident_id() {
        let (_dir, store) = store();
        let result = base(Decision::Promote { incident_id: "inc1".to_string() }, "cand1");
        assert_eq!(store.put(result).expect("put"), PutOutcome::Created);
        assert!(store.get_by_incident("inc1").expect("get").is_some());
        assert!(store.get_by_candidate("cand1").expect("get").is_none());
    }

    #[test]
    fn reject_is_keyed_by_candidate_id() {
        let (_dir, store) = store();
        let result = base(Decision::Reject { rejection_reason: "confidence too low".to_string(), rejection_code: RejectionCode::ConfidenceTooLow }, "cand1");
        assert_eq!(store.put(result).expect("put"), PutOutcome::Created);
        assert!(store.get_by_candidate("cand1").expect("get").is_some());
    }
}
