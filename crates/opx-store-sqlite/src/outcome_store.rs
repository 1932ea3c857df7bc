// crates/opx-store-sqlite/src/outcome_store.rs
// ============================================================================
// Module: SQLite Outcome Store
// Description: Durable OutcomeStore backed by SQLite.
// Dependencies: opx_core::outcome, opx_core::time, opx_stores::outcome_store,
// rusqlite
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use opx_core::outcome::IncidentOutcome;
use opx_core::time::Window;
use opx_stores::OutcomeStore;
use opx_stores::PutOutcome;
use opx_stores::StoreError;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::digest::hex_digest;
use crate::error::SqliteStoreError;

/// `SQLite`-backed [`OutcomeStore`].
#[derive(Clone)]
pub struct SqliteOutcomeStore {
    /// Shared connection, guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteOutcomeStore {
    /// Wraps an already-initialized connection.
    #[must_use]
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    /// Locks the shared connection, translating a poisoned mutex into
    /// [`SqliteStoreError::Db`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("outcome store connection mutex poisoned".to_string()))
    }

    /// Deserializes and verifies a row's body against its stored hash.
    fn verify_row(body: Vec<u8>, hash: &str, id: &str) -> Result<IncidentOutcome, StoreError> {
        if hex_digest(&body) != hash {
            return Err(SqliteStoreError::Corrupt { kind: "outcome", id: id.to_string() }.into());
        }
        Ok(serde_json::from_slice(&body).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?)
    }
}

impl OutcomeStore for SqliteOutcomeStore {
    fn put(&self, outcome: IncidentOutcome) -> Result<PutOutcome, StoreError> {
        let connection = self.lock()?;
        let body = serde_json::to_vec(&outcome).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?;
        let hash = hex_digest(&body);
        let rows = connection
            .execute(
                "INSERT OR IGNORE INTO outcomes (outcome_id, incident_id, service, recorded_at_rfc3339, body_json, body_hash) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![outcome.outcome_id, outcome.incident_id, outcome.service, outcome.recorded_at.to_rfc3339(), body, hash],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(if rows == 0 { PutOutcome::AlreadyExists } else { PutOutcome::Created })
    }

    fn get(&self, outcome_id: &str) -> Result<Option<IncidentOutcome>, StoreError> {
        let connection = self.lock()?;
        let row: Option<(Vec<u8>, String)> = connection
            .query_row("SELECT body_json, body_hash FROM outcomes WHERE outcome_id = ?1", params![outcome_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()
            .map_err(SqliteStoreError::from)?;
        row.map(|(body, hash)| Self::verify_row(body, &hash, outcome_id)).transpose()
    }

    fn get_by_incident(&self, incident_id: &str) -> Result<Option<IncidentOutcome>, StoreError> {
        let connection = self.lock()?;
        let row: Option<(Vec<u8>, String)> = connection
            .query_row("SELECT body_json, body_hash FROM outcomes WHERE incident_id = ?1 LIMIT 1", params![incident_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()
            .map_err(SqliteStoreError::from)?;
        row.map(|(body, hash)| Self::verify_row(body, &hash, incident_id)).transpose()
    }

    fn list_in_window(&self, service: Option<&str>, window: &Window) -> Result<Vec<IncidentOutcome>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(
                "SELECT body_json FROM outcomes \
                 WHERE (?1 IS NULL OR service = ?1) AND recorded_at_rfc3339 >= ?2 AND recorded_at_rfc3339 < ?3 \
                 ORDER BY recorded_at_rfc3339 ASC",
            )
            .map_err(SqliteStoreError::from)?;
        let rows = statement
            .query_map(params![service, window.start.to_rfc3339(), window.end.to_rfc3339()], |row| row.get::<_, Vec<u8>>(0))
            .map_err(SqliteStoreError::from)?;
        let mut outcomes = Vec::new();
        for row in rows {
            let body = row.map_err(SqliteStoreError::from)?;
            outcomes.push(serde_json::from_slice(&body).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?);
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SqliteStoreConfig;
    use opx_core::authority::Authority;
    use opx_core::outcome::Classification;
    use opx_core::outcome::HumanAssessment;
    use opx_core::outcome::Timing;
    use opx_core::time::Timestamp;

    fn outcome(id: &str, incident_id: &str, service: &str, recorded_at: &str) -> IncidentOutcome {
        IncidentOutcome {
            outcome_id: id.to_string(),
            incident_id: incident_id.to_string(),
            service: service.to_string(),
            recorded_at: Timestamp::parse(recorded_at).expect("ts"),
            validated_at: Timestamp::parse(recorded_at).expect("ts"),
            recorded_by: Authority::system(),
            classification: Classification {
                true_positive: true,
                false_positive: false,
                root_cause: "database pool exhaustion".to_string(),
                resolution_type: opx_core::incident::ResolutionType::Fixed,
            },
            timing: Timing {
                detected_at: Timestamp::parse(recorded_at).expect("ts"),
                resolved_at: Timestamp::parse(recorded_at).expect("ts"),
                closed_at: Timestamp::parse(recorded_at).expect("ts"),
                ttd_seconds: 0,
                ttr_seconds: 0,
            },
            human_assessment: HumanAssessment { confidence_rating: 0.9, severity_accuracy: true, detection_quality: true, notes: None },
            predicted_band: "HIGH".to_string(),
            version: 1,
        }
    }

    fn store() -> (tempfile::TempDir, SqliteOutcomeStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SqliteStoreConfig::new(dir.path().join("opx.db"));
        let connection = crate::connection::open(&config).expect("open");
        (dir, SqliteOutcomeStore::new(Arc::new(Mutex::new(connection))))
    }

    #[test]
    fn put_twice_is_idempotent() {
        let (_dir, store) = store();
        let o = outcome("o1", "inc1", "checkout", "2026-03-05T00:00:00.000Z");
        assert_eq!(store.put(o.clone()).expect("put"), PutOutcome::Created);
        assert_eq!(store.put(o).expect("put"), PutOutcome::AlreadyExists);
    }

    #[test]
    fn list_in_window_filters_by_service_and_bounds() {
        let (_dir, store) = store();
        store.put(outcome("o1", "inc1", "checkout", "2026-03-05T00:00:00.000Z")).expect("put");
        store.put(outcome("o2", "inc2", "payments", "2026-03-05T00:30:00.000Z")).expect("put");
        let window = Window { start: Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts"), end: Timestamp::parse("2026-03-05T01:00:00.000Z").expect("ts") };
        let checkout_only = store.list_in_window(Some("checkout"), &window).expect("list");
        assert_eq!(checkout_only.len(), 1);
        let all = store.list_in_window(None, &window).expect("list");
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn get_by_incident_finds_recorded_outcome() {
        let (_dir, store) = store();
        store.put(outcome("o1", "inc1", "checkout", "2026-03-05T00:00:00.000Z")).expect("put");
        assert!(store.get_by_incident("inc1").expect("get").is_some());
        assert!(store.get_by_incident("inc2").expect("get").is_none());
    }
}
