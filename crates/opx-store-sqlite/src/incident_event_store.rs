// crates/opx-store-sqlite/src/incident_event_store.rs
// ============================================================================
// Module: SQLite Incident Event Store
// Description: Durable IncidentEventStore backed by SQLite.
// Dependencies: opx_core::incident, opx_stores::incident_event_store, rusqlite
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use opx_core::incident::IncidentEvent;
use opx_stores::IncidentEventStore;
use opx_stores::PutOutcome;
use opx_stores::StoreError;
use rusqlite::Connection;
use rusqlite::params;

use crate::digest::hex_digest;
use crate::error::SqliteStoreError;

/// `SQLite`-backed [`IncidentEventStore`].
#[derive(Clone)]
pub struct SqliteIncidentEventStore {
    /// Shared connection, guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteIncidentEventStore {
    /// Wraps an already-initialized connection.
    #[must_use]
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    /// Locks the shared connection, translating a poisoned mutex into
    /// [`SqliteStoreError::Db`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("incident event store connection mutex poisoned".to_string()))
    }
}

impl IncidentEventStore for SqliteIncidentEventStore {
    fn append(&self, event: IncidentEvent) -> Result<PutOutcome, StoreError> {
        let connection = self.lock()?;
        let body = serde_json::to_vec(&event).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?;
        let hash = hex_digest(&body);
        let rows = connection
            .execute(
                "INSERT OR IGNORE INTO incident_events (event_id, incident_id, created_at_rfc3339, body_json, body_hash) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![event.event_id, event.incident_id, event.created_at.to_rfc3339(), body, hash],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(if rows == 0 { PutOutcome::AlreadyExists } else { PutOutcome::Created })
    }

    fn list_by_incident(&self, incident_id: &str) -> Result<Vec<IncidentEvent>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare("SELECT body_json FROM incident_events WHERE incident_id = ?1 ORDER BY created_at_rfc3339 ASC, event_id ASC")
            .map_err(SqliteStoreError::from)?;
        let rows = statement.query_map(params![incident_id], |row| row.get::<_, Vec<u8>>(0)).map_err(SqliteStoreError::from)?;
        let mut events = Vec::new();
        for row in rows {
            let body = row.map_err(SqliteStoreError::from)?;
            events.push(serde_json::from_slice(&body).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SqliteStoreConfig;
    use opx_core::incident::IncidentEventType;
    use opx_core::time::Timestamp;
    use serde_json::json;

    fn event(event_id: &str, incident_id: &str, at: &str) -> IncidentEvent {
        IncidentEvent {
            event_id: event_id.to_string(),
            incident_id: incident_id.to_string(),
            event_type: IncidentEventType::StateTransitioned,
            created_at: Timestamp::parse(at).expect("ts"),
            payload: json!({"from": "PENDING", "to": "OPEN"}),
        }
    }

    fn store() -> (tempfile::TempDir, SqliteIncidentEventStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SqliteStoreConfig::new(dir.path().join("opx.db"));
        let connection = crate::connection::open(&config).expect("open");
        (dir, SqliteIncidentEventStore::new(Arc::new(Mutex::new(connection))))
    }

    #[test]
    fn append_twice_is_idempotent() {
        let (_dir, store) = store();
        let e = event("ev1", "inc1", "2026-03-05T00:00:00.000Z");
        assert_eq!(store.append(e.clone()).expect("append"), PutOutcome::Created);
        assert_eq!(store.append(e).expect("append"), PutOutcome::AlreadyExists);
    }

    #[test]
    fn list_by_incident_is_chronological() {
        let (_dir, store) = store();
        store.append(event("ev2", "inc1", "2026-03-05T01:00:00.000Z")).expect("append");
        store.append(event("ev1", "inc1", "2026-03-05T00:00:00.000Z")).expect("append");
        store.append(event("ev3", "inc2", "2026-03-05T00:00:00.000Z")).expect("append");
        let history = store.list_by_incident("inc1").expect("list");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].event_id, "ev1");
        assert_eq!(history[1].event_id, "ev2");
    }
}
