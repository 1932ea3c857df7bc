// crates/opx-store-sqlite/src/signal_store.rs
// ============================================================================
// Module: SQLite Signal Store
// Description: Durable SignalStore backed by SQLite.
// Dependencies: opx_core::signal, opx_stores::signal_store, rusqlite
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use opx_core::signal::Signal;
use opx_stores::PutOutcome;
use opx_stores::SignalStore;
use opx_stores::StoreError;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::digest::hex_digest;
use crate::error::SqliteStoreError;

/// `SQLite`-backed [`SignalStore`].
#[derive(Clone)]
pub struct SqliteSignalStore {
    /// Shared connection, guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteSignalStore {
    /// Wraps an already-initialized connection.
    #[must_use]
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    /// Locks the shared connection, translating a poisoned mutex into
    /// [`SqliteStoreError::Db`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("signal store connection mutex poisoned".to_string()))
    }
}

impl SignalStore for SqliteSignalStore {
    fn put(&self, signal: Signal) -> Result<PutOutcome, StoreError> {
        let connection = self.lock()?;
        let body = serde_json::to_vec(&signal).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?;
        let hash = hex_digest(&body);
        let next_sequence: i64 = connection.query_row("SELECT COALESCE(MAX(sequence), 0) + 1 FROM signals", [], |row| row.get(0)).map_err(SqliteStoreError::from)?;
        let rows = connection
            .execute(
                "INSERT OR IGNORE INTO signals (signal_id, service, sequence, body_json, body_hash) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![signal.signal_id, signal.service, next_sequence, body, hash],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(if rows == 0 { PutOutcome::AlreadyExists } else { PutOutcome::Created })
    }

    fn get(&self, signal_id: &str) -> Result<Option<Signal>, StoreError> {
        let connection = self.lock()?;
        let row: Option<(Vec<u8>, String)> = connection
            .query_row("SELECT body_json, body_hash FROM signals WHERE signal_id = ?1", params![signal_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()
            .map_err(SqliteStoreError::from)?;
        let Some((body, hash)) = row else {
            return Ok(None);
        };
        if hex_digest(&body) != hash {
            return Err(SqliteStoreError::Corrupt { kind: "signal", id: signal_id.to_string() }.into());
        }
        let signal = serde_json::from_slice(&body).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?;
        Ok(Some(signal))
    }

    fn list_by_service(&self, service: &str, limit: usize) -> Result<Vec<Signal>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare("SELECT body_json FROM signals WHERE service = ?1 ORDER BY sequence DESC LIMIT ?2")
            .map_err(SqliteStoreError::from)?;
        let rows = statement
            .query_map(params![service, limit as i64], |row| row.get::<_, Vec<u8>>(0))
            .map_err(SqliteStoreError::from)?;
        let mut signals = Vec::new();
        for row in rows {
            let body = row.map_err(SqliteStoreError::from)?;
            signals.push(serde_json::from_slice(&body).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?);
        }
        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SqliteStoreConfig;
    use opx_core::signal::NormalizedSeverity;
    use opx_core::signal::SignalSource;
    use opx_core::signal::VendorSeverity;
    use opx_core::time::Timestamp;
    use serde_json::json;

    fn signal(id: &str, service: &str) -> Signal {
        Signal {
            signal_id: id.to_string(),
            source: SignalSource::Alarm,
            signal_type: "latency-breach".to_string(),
            service: service.to_string(),
            severity: VendorSeverity::Sev1,
            normalized_severity: NormalizedSeverity::Critical,
            observed_at: Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts"),
            identity_window: "2026-03-05T00:00Z".to_string(),
            metadata: json!({}),
            ingested_at: Timestamp::parse("2026-03-05T00:00:01.000Z").expect("ts"),
        }
    }

    fn store() -> (tempfile::TempDir, SqliteSignalStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SqliteStoreConfig::new(dir.path().join("opx.db"));
        let connection = crate::connection::open(&config).expect("open");
        (dir, SqliteSignalStore::new(Arc::new(Mutex::new(connection))))
    }

    #[test]
    fn put_twice_is_created_then_already_exists() {
        let (_dir, store) = store();
        assert_eq!(store.put(signal("s1", "checkout")).expect("put"), PutOutcome::Created);
        assert_eq!(store.put(signal("s1", "checkout")).expect("put"), PutOutcome::AlreadyExists);
        assert_eq!(store.get("s1").expect("get").expect("present").service, "checkout");
    }

    #[test]
    fn list_by_service_orders_newest_first() {
        let (_dir, store) = store();
        store.put(signal("s1", "checkout")).expect("put");
        store.put(signal("s2", "checkout")).expect("put");
        let results = store.list_by_service("checkout", 10).expect("list");
        assert_eq!(results[0].signal_id, "s2");
        assert_eq!(results[1].signal_id, "s1");
    }
}
