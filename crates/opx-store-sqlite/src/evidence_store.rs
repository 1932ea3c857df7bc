// crates/opx-store-sqlite/src/evidence_store.rs
// ============================================================================
// Module: SQLite Evidence Store
// Description: Durable EvidenceStore backed by SQLite.
// Dependencies: opx_core::evidence, opx_stores::evidence_store, rusqlite
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use opx_core::evidence::EvidenceBundle;
use opx_stores::EvidenceStore;
use opx_stores::PutOutcome;
use opx_stores::StoreError;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::digest::hex_digest;
use crate::error::SqliteStoreError;

/// `SQLite`-backed [`EvidenceStore`].
#[derive(Clone)]
pub struct SqliteEvidenceStore {
    /// Shared connection, guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteEvidenceStore {
    /// Wraps an already-initialized connection.
    #[must_use]
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    /// Locks the shared connection, translating a poisoned mutex into
    /// [`SqliteStoreError::Db`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("evidence store connection mutex poisoned".to_string()))
    }
}

impl EvidenceStore for SqliteEvidenceStore {
    fn put(&self, bundle: EvidenceBundle) -> Result<PutOutcome, StoreError> {
        let connection = self.lock()?;
        let body = serde_json::to_vec(&bundle).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?;
        let hash = hex_digest(&body);
        let next_sequence: i64 =
            connection.query_row("SELECT COALESCE(MAX(sequence), 0) + 1 FROM evidence_bundles", [], |row| row.get(0)).map_err(SqliteStoreError::from)?;
        let rows = connection
            .execute(
                "INSERT OR IGNORE INTO evidence_bundles (evidence_id, service, sequence, body_json, body_hash) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![bundle.evidence_id, bundle.service, next_sequence, body, hash],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(if rows == 0 { PutOutcome::AlreadyExists } else { PutOutcome::Created })
    }

    fn get(&self, evidence_id: &str) -> Result<Option<EvidenceBundle>, StoreError> {
        let connection = self.lock()?;
        let row: Option<(Vec<u8>, String)> = connection
            .query_row("SELECT body_json, body_hash FROM evidence_bundles WHERE evidence_id = ?1", params![evidence_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()
            .map_err(SqliteStoreError::from)?;
        let Some((body, hash)) = row else {
            return Ok(None);
        };
        if hex_digest(&body) != hash {
            return Err(SqliteStoreError::Corrupt { kind: "evidence_bundle", id: evidence_id.to_string() }.into());
        }
        let bundle = serde_json::from_slice(&body).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?;
        Ok(Some(bundle))
    }

    fn list_by_service(&self, service: &str, limit: usize) -> Result<Vec<EvidenceBundle>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare("SELECT body_json FROM evidence_bundles WHERE service = ?1 ORDER BY sequence DESC LIMIT ?2")
            .map_err(SqliteStoreError::from)?;
        let rows = statement
            .query_map(params![service, limit as i64], |row| row.get::<_, Vec<u8>>(0))
            .map_err(SqliteStoreError::from)?;
        let mut bundles = Vec::new();
        for row in rows {
            let body = row.map_err(SqliteStoreError::from)?;
            bundles.push(serde_json::from_slice(&body).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?);
        }
        Ok(bundles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SqliteStoreConfig;
    use opx_core::evidence::SignalSummary;
    use opx_core::time::Timestamp;
    use std::collections::BTreeMap as Map;

    fn bundle(id: &str, service: &str) -> EvidenceBundle {
        EvidenceBundle {
            evidence_id: id.to_string(),
            service: service.to_string(),
            detections: vec![],
            window_start: Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts"),
            window_end: Timestamp::parse("2026-03-05T01:00:00.000Z").expect("ts"),
            bundled_at: Timestamp::parse("2026-03-05T01:00:01.000Z").expect("ts"),
            signal_summary: SignalSummary {
                signal_count: 0,
                severity_distribution: Map::new(),
                time_spread_seconds: 0,
                unique_rules: 0,
            },
        }
    }

    fn store() -> (tempfile::TempDir, SqliteEvidenceStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SqliteStoreConfig::new(dir.path().join("opx.db"));
        let connection = crate::connection::open(&config).expect("open");
        (dir, SqliteEvidenceStore::new(Arc::new(Mutex::new(connection))))
    }

    #[test]
    fn put_is_conditional_create() {
        let (_dir, store) = store();
        assert_eq!(store.put(bundle("e1", "checkout")).expect("put"), PutOutcome::Created);
        assert_eq!(store.put(bundle("e1", "checkout")).expect("put"), PutOutcome::AlreadyExists);
    }

    #[test]
    fn list_by_service_orders_newest_first() {
        let (_dir, store) = store();
        store.put(bundle("e1", "checkout")).expect("put");
        store.put(bundle("e2", "checkout")).expect("put");
        let results = store.list_by_service("checkout", 10).expect("list");
        assert_eq!(results[0].evidence_id, "e2");
        assert_eq!(results[1].evidence_id, "e1");
    }
}
