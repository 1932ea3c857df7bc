// crates/opx-store-sqlite/src/kill_switch_store.rs
// ============================================================================
// Module: SQLite Kill Switch Store
// Description: Durable single-document KillSwitchStore backed by SQLite.
// Dependencies: opx_stores::kill_switch_store, rusqlite
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use opx_stores::KillSwitch;
use opx_stores::KillSwitchStore;
use opx_stores::StoreError;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::error::SqliteStoreError;

/// `SQLite`-backed [`KillSwitchStore`], enforcing a single row via
/// `CHECK (id = 1)`.
#[derive(Clone)]
pub struct SqliteKillSwitchStore {
    /// Shared connection, guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteKillSwitchStore {
    /// Wraps an already-initialized connection.
    #[must_use]
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    /// Locks the shared connection, translating a poisoned mutex into
    /// [`SqliteStoreError::Db`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("kill switch store connection mutex poisoned".to_string()))
    }
}

impl KillSwitchStore for SqliteKillSwitchStore {
    fn read(&self) -> Result<Option<KillSwitch>, StoreError> {
        let connection = self.lock()?;
        let body: Option<Vec<u8>> = connection.query_row("SELECT body_json FROM kill_switch WHERE id = 1", [], |row| row.get(0)).optional().map_err(SqliteStoreError::from)?;
        let Some(body) = body else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&body).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?))
    }

    fn write(&self, switch: KillSwitch) -> Result<(), StoreError> {
        let connection = self.lock()?;
        let body = serde_json::to_vec(&switch).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?;
        connection
            .execute("INSERT INTO kill_switch (id, body_json) VALUES (1, ?1) ON CONFLICT(id) DO UPDATE SET body_json = excluded.body_json", params![body])
            .map_err(SqliteStoreError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SqliteStoreConfig;
    use opx_core::authority::Authority;
    use opx_core::time::Timestamp;

    fn store() -> (tempfile::TempDir, SqliteKillSwitchStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SqliteStoreConfig::new(dir.path().join("opx.db"));
        let connection = crate::connection::open(&config).expect("open");
        (dir, SqliteKillSwitchStore::new(Arc::new(Mutex::new(connection))))
    }

    #[test]
    fn absent_document_reads_as_none() {
        let (_dir, store) = store();
        assert!(store.read().expect("read").is_none());
    }

    #[test]
    fn writing_twice_overwrites_the_single_row() {
        let (_dir, store) = store();
        let now = Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts");
        let disabled = KillSwitch { enabled: false, disabled_at: Some(now), disabled_by: Some(Authority::system()), reason: Some("incident storm".to_string()), last_modified: now };
        store.write(disabled).expect("write");
        assert!(store.read().expect("read").expect("present").is_active());

        let later = Timestamp::parse("2026-03-05T01:00:00.000Z").expect("ts");
        let reenabled = KillSwitch { enabled: true, disabled_at: None, disabled_by: None, reason: None, last_modified: later };
        store.write(reenabled).expect("write");
        assert!(!store.read().expect("read").expect("present").is_active());
    }
}
