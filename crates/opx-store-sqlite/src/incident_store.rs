// crates/opx-store-sqlite/src/incident_store.rs
// ============================================================================
// Module: SQLite Incident Store
// Description: Durable IncidentStore backed by SQLite. Sole mutation path
// in this crate; CAS update via conditional UPDATE + affected-row-count.
// Dependencies: opx_core::incident, opx_stores::incident_store, rusqlite
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use opx_core::incident::Incident;
use opx_core::incident::IncidentStatus;
use opx_stores::IncidentFilters;
use opx_stores::IncidentStore;
use opx_stores::IncidentStoreError;
use opx_stores::IncidentStoreOrConflict;
use opx_stores::PutOutcome;
use opx_stores::StoreError;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::digest::hex_digest;
use crate::error::SqliteStoreError;

/// Maximum records returned from [`IncidentStore::list`], matching the
/// HTTP surface contract regardless of what the caller requests.
const MAX_LIST_LIMIT: usize = 100;

/// Renders an [`IncidentStatus`] as its storage string.
fn status_string(status: IncidentStatus) -> &'static str {
    match status {
        IncidentStatus::Pending => "PENDING",
        IncidentStatus::Open => "OPEN",
        IncidentStatus::Mitigating => "MITIGATING",
        IncidentStatus::Resolved => "RESOLVED",
        IncidentStatus::FalsePositive => "FALSE_POSITIVE",
        IncidentStatus::Suppressed => "SUPPRESSED",
    }
}

/// `SQLite`-backed [`IncidentStore`].
#[derive(Clone)]
pub struct SqliteIncidentStore {
    /// Shared connection, guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteIncidentStore {
    /// Wraps an already-initialized connection.
    #[must_use]
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    /// Locks the shared connection, translating a poisoned mutex into
    /// [`SqliteStoreError::Db`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("incident store connection mutex poisoned".to_string()))
    }
}

impl IncidentStore for SqliteIncidentStore {
    fn create(&self, incident: Incident) -> Result<PutOutcome, StoreError> {
        let connection = self.lock()?;
        let body = serde_json::to_vec(&incident).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?;
        let hash = hex_digest(&body);
        let next_sequence: i64 = connection.query_row("SELECT COALESCE(MAX(sequence), 0) + 1 FROM incidents", [], |row| row.get(0)).map_err(SqliteStoreError::from)?;
        let rows = connection
            .execute(
                "INSERT OR IGNORE INTO incidents (incident_id, service, status, incident_version, sequence, body_json, body_hash) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![incident.incident_id, incident.service, status_string(incident.status), incident.incident_version, next_sequence, body, hash],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(if rows == 0 { PutOutcome::AlreadyExists } else { PutOutcome::Created })
    }

    fn get(&self, incident_id: &str) -> Result<Option<Incident>, StoreError> {
        let connection = self.lock()?;
        let row: Option<(Vec<u8>, String)> = connection
            .query_row("SELECT body_json, body_hash FROM incidents WHERE incident_id = ?1", params![incident_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()
            .map_err(SqliteStoreError::from)?;
        let Some((body, hash)) = row else {
            return Ok(None);
        };
        if hex_digest(&body) != hash {
            return Err(SqliteStoreError::Corrupt { kind: "incident", id: incident_id.to_string() }.into());
        }
        let incident = serde_json::from_slice(&body).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?;
        Ok(Some(incident))
    }

    fn update(&self, incident: Incident, expected_version: u64) -> Result<Incident, IncidentStoreOrConflict> {
        let connection = self.lock()?;
        let found_version: Option<i64> = connection
            .query_row("SELECT incident_version FROM incidents WHERE incident_id = ?1", params![incident.incident_id], |row| row.get(0))
            .optional()
            .map_err(SqliteStoreError::from)?;
        let Some(found_version) = found_version else {
            return Err(IncidentStoreError::NotFound(incident.incident_id).into());
        };
        #[allow(clippy::cast_sign_loss, reason = "incident_version is stored as a non-negative counter")]
        let found_version = found_version as u64;
        if found_version != expected_version {
            return Err(IncidentStoreError::Conflict { incident_id: incident.incident_id, expected: expected_version, found: found_version }.into());
        }
        let next_sequence: i64 = connection.query_row("SELECT COALESCE(MAX(sequence), 0) + 1 FROM incidents", [], |row| row.get(0)).map_err(SqliteStoreError::from)?;
        let body = serde_json::to_vec(&incident).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?;
        let hash = hex_digest(&body);
        let rows = connection
            .execute(
                "UPDATE incidents SET service = ?2, status = ?3, incident_version = ?4, sequence = ?5, body_json = ?6, body_hash = ?7 \
                 WHERE incident_id = ?1 AND incident_version = ?8",
                params![incident.incident_id, incident.service, status_string(incident.status), incident.incident_version, next_sequence, body, hash, found_version],
            )
            .map_err(SqliteStoreError::from)?;
        if rows == 0 {
            return Err(IncidentStoreError::Conflict { incident_id: incident.incident_id, expected: expected_version, found: found_version }.into());
        }
        Ok(incident)
    }

    fn list(&self, filters: &IncidentFilters) -> Result<Vec<Incident>, StoreError> {
        let connection = self.lock()?;
        let limit = filters.limit.min(MAX_LIST_LIMIT).max(1);
        let status = filters.status.map(status_string);
        let mut statement = connection
            .prepare(
                "SELECT body_json FROM incidents \
                 WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR service = ?2) \
                 ORDER BY sequence DESC LIMIT ?3",
            )
            .map_err(SqliteStoreError::from)?;
        let rows = statement.query_map(params![status, filters.service, limit as i64], |row| row.get::<_, Vec<u8>>(0)).map_err(SqliteStoreError::from)?;
        let mut incidents = Vec::new();
        for row in rows {
            let body = row.map_err(SqliteStoreError::from)?;
            incidents.push(serde_json::from_slice(&body).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?);
        }
        Ok(incidents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SqliteStoreConfig;
    use opx_core::authority::Authority;
    use opx_core::incident::IncidentTimestamps;
    use opx_core::signal::NormalizedSeverity;
    use opx_core::time::Timestamp;

    fn incident(id: &str, service: &str) -> Incident {
        Incident {
            incident_id: id.to_string(),
            service: service.to_string(),
            severity: NormalizedSeverity::High,
            status: IncidentStatus::Pending,
            evidence_id: "evid1".to_string(),
            candidate_id: "cand1".to_string(),
            confidence_score: 0.7,
            timestamps: IncidentTimestamps { created_at: Some(Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts")), ..Default::default() },
            resolution: None,
            title: "title".to_string(),
            description: "description".to_string(),
            tags: vec![],
            created_by: Authority::system(),
            last_modified_by: Authority::system(),
            incident_version: 0,
            blast_radius_scope: None,
            detection_count: 2,
            evidence_graph_count: 1,
        }
    }

    fn store() -> (tempfile::TempDir, SqliteIncidentStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SqliteStoreConfig::new(dir.path().join("opx.db"));
        let connection = crate::connection::open(&config).expect("open");
        (dir, SqliteIncidentStore::new(Arc::new(Mutex::new(connection))))
    }

    #[test]
    fn create_twice_is_idempotent() {
        let (_dir, store) = store();
        assert_eq!(store.create(incident("inc1", "checkout")).expect("create"), PutOutcome::Created);
        assert_eq!(store.create(incident("inc1", "checkout")).expect("create"), PutOutcome::AlreadyExists);
    }

    #[test]
    fn update_with_stale_version_conflicts() {
        let (_dir, store) = store();
        store.create(incident("inc1", "checkout")).expect("create");
        let mut updated = incident("inc1", "checkout");
        updated.status = IncidentStatus::Open;
        updated.incident_version = 1;
        let err = store.update(updated, 5).unwrap_err();
        assert!(matches!(err, IncidentStoreOrConflict::State(IncidentStoreError::Conflict { expected: 5, found: 0, .. })));
    }

    #[test]
    fn update_with_matching_version_succeeds_and_advances() {
        let (_dir, store) = store();
        store.create(incident("inc1", "checkout")).expect("create");
        let mut updated = incident("inc1", "checkout");
        updated.status = IncidentStatus::Open;
        updated.incident_version = 1;
        let saved = store.update(updated, 0).expect("update");
        assert_eq!(saved.status, IncidentStatus::Open);
        assert_eq!(store.get("inc1").expect("get").expect("present").incident_version, 1);
    }

    #[test]
    fn update_against_missing_incident_is_not_found() {
        let (_dir, store) = store();
        let err = store.update(incident("missing", "checkout"), 0).unwrap_err();
        assert!(matches!(err, IncidentStoreOrConflict::State(IncidentStoreError::NotFound(_))));
    }

    #[test]
    fn list_filters_by_status_and_service() {
        let (_dir, store) = store();
        store.create(incident("inc1", "checkout")).expect("create");
        store.create(incident("inc2", "payments")).expect("create");
        let checkout_only = store.list(&IncidentFilters { status: Some(IncidentStatus::Pending), service: Some("checkout".to_string()), limit: 100 }).expect("list");
        assert_eq!(checkout_only.len(), 1);
        assert_eq!(checkout_only[0].incident_id, "inc1");
    }
}
