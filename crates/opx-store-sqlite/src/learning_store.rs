// crates/opx-store-sqlite/src/learning_store.rs
// ============================================================================
// Module: SQLite Learning Store
// Description: Durable SummaryStore, CalibrationStore, and SnapshotStore
// backed by SQLite.
// Dependencies: opx_core::learning, opx_stores::learning_store, rusqlite
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use opx_core::learning::ConfidenceCalibration;
use opx_core::learning::LearningSnapshot;
use opx_core::learning::ResolutionSummary;
use opx_stores::CalibrationStore;
use opx_stores::PutOutcome;
use opx_stores::SnapshotStore;
use opx_stores::StoreError;
use opx_stores::SummaryStore;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::digest::hex_digest;
use crate::error::SqliteStoreError;

/// `SQLite`-backed [`SummaryStore`].
#[derive(Clone)]
pub struct SqliteSummaryStore {
    /// Shared connection, guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteSummaryStore {
    /// Wraps an already-initialized connection.
    #[must_use]
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    /// Locks the shared connection, translating a poisoned mutex into
    /// [`SqliteStoreError::Db`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("summary store connection mutex poisoned".to_string()))
    }
}

impl SummaryStore for SqliteSummaryStore {
    fn put(&self, summary: ResolutionSummary) -> Result<PutOutcome, StoreError> {
        let connection = self.lock()?;
        let body = serde_json::to_vec(&summary).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?;
        let hash = hex_digest(&body);
        let rows = connection
            .execute("INSERT OR IGNORE INTO resolution_summaries (summary_id, body_json, body_hash) VALUES (?1, ?2, ?3)", params![summary.summary_id, body, hash])
            .map_err(SqliteStoreError::from)?;
        Ok(if rows == 0 { PutOutcome::AlreadyExists } else { PutOutcome::Created })
    }

    fn get(&self, summary_id: &str) -> Result<Option<ResolutionSummary>, StoreError> {
        let connection = self.lock()?;
        let row: Option<(Vec<u8>, String)> = connection
            .query_row("SELECT body_json, body_hash FROM resolution_summaries WHERE summary_id = ?1", params![summary_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()
            .map_err(SqliteStoreError::from)?;
        let Some((body, hash)) = row else {
            return Ok(None);
        };
        if hex_digest(&body) != hash {
            return Err(SqliteStoreError::Corrupt { kind: "resolution_summary", id: summary_id.to_string() }.into());
        }
        Ok(Some(serde_json::from_slice(&body).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?))
    }
}

/// `SQLite`-backed [`CalibrationStore`].
#[derive(Clone)]
pub struct SqliteCalibrationStore {
    /// Shared connection, guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteCalibrationStore {
    /// Wraps an already-initialized connection.
    #[must_use]
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    /// Locks the shared connection, translating a poisoned mutex into
    /// [`SqliteStoreError::Db`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("calibration store connection mutex poisoned".to_string()))
    }
}

impl CalibrationStore for SqliteCalibrationStore {
    fn put(&self, calibration: ConfidenceCalibration) -> Result<PutOutcome, StoreError> {
        let connection = self.lock()?;
        let body = serde_json::to_vec(&calibration).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?;
        let hash = hex_digest(&body);
        let rows = connection
            .execute(
                "INSERT OR IGNORE INTO confidence_calibrations (calibration_id, body_json, body_hash) VALUES (?1, ?2, ?3)",
                params![calibration.calibration_id, body, hash],
            )
            .map_err(SqliteStoreError::from)?;
        Ok(if rows == 0 { PutOutcome::AlreadyExists } else { PutOutcome::Created })
    }

    fn get(&self, calibration_id: &str) -> Result<Option<ConfidenceCalibration>, StoreError> {
        let connection = self.lock()?;
        let row: Option<(Vec<u8>, String)> = connection
            .query_row(
                "SELECT body_json, body_hash FROM confidence_calibrations WHERE calibration_id = ?1",
                params![calibration_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(SqliteStoreError::from)?;
        let Some((body, hash)) = row else {
            return Ok(None);
        };
        if hex_digest(&body) != hash {
            return Err(SqliteStoreError::Corrupt { kind: "confidence_calibration", id: calibration_id.to_string() }.into());
        }
        Ok(Some(serde_json::from_slice(&body).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?))
    }
}

/// `SQLite`-backed [`SnapshotStore`].
#[derive(Clone)]
pub struct SqliteSnapshotStore {
    /// Shared connection, guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteSnapshotStore {
    /// Wraps an already-initialized connection.
    #[must_use]
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    /// Locks the shared connection, translating a poisoned mutex into
    /// [`SqliteStoreError::Db`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("snapshot store connection mutex poisoned".to_string()))
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn put(&self, snapshot: LearningSnapshot) -> Result<PutOutcome, StoreError> {
        let connection = self.lock()?;
        let body = serde_json::to_vec(&snapshot).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?;
        let hash = hex_digest(&body);
        let rows = connection
            .execute("INSERT OR IGNORE INTO learning_snapshots (snapshot_id, body_json, body_hash) VALUES (?1, ?2, ?3)", params![snapshot.snapshot_id, body, hash])
            .map_err(SqliteStoreError::from)?;
        Ok(if rows == 0 { PutOutcome::AlreadyExists } else { PutOutcome::Created })
    }

    fn get(&self, snapshot_id: &str) -> Result<Option<LearningSnapshot>, StoreError> {
        let connection = self.lock()?;
        let row: Option<(Vec<u8>, String)> = connection
            .query_row("SELECT body_json, body_hash FROM learning_snapshots WHERE snapshot_id = ?1", params![snapshot_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()
            .map_err(SqliteStoreError::from)?;
        let Some((body, hash)) = row else {
            return Ok(None);
        };
        if hex_digest(&body) != hash {
            return Err(SqliteStoreError::Corrupt { kind: "learning_snapshot", id: snapshot_id.to_string() }.into());
        }
        Ok(Some(serde_json::from_slice(&body).map_err(|err| SqliteStoreError::Deserialize(err.to_string()))?))
    }
}
