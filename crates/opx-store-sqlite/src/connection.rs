// crates/opx-store-sqlite/src/connection.rs
// ============================================================================
// Module: Connection & Schema
// Description: Connection opening, pragma configuration, and schema
// initialization shared by every durable store in this crate.
// Purpose: One table per entity kind, each a JSON blob keyed by the
// entity's primary key, plus a digest column for integrity verification.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! Every entity is stored as canonical JSON alongside a SHA-256 digest of
//! those bytes; a load recomputes the digest and fails closed with
//! [`SqliteStoreError::Corrupt`] on mismatch, mirroring the teacher's
//! hash-then-verify discipline for run-state snapshots.

use std::path::Path;
use std::path::PathBuf;

use rusqlite::Connection;
use rusqlite::OpenFlags;

/// `SQLite` schema version for this store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Configuration for a durable `SQLite`-backed store.
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl SqliteStoreConfig {
    /// Builds a config for `path` with the default busy timeout.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Errors raised opening or initializing a durable store connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The database could not be opened.
    #[error("sqlite connection error: {0}")]
    Open(String),
    /// Schema initialization failed.
    #[error("sqlite schema init error: {0}")]
    Schema(String),
}

/// Opens a `SQLite` connection with durability pragmas applied, then
/// initializes every table this crate owns (idempotent:
/// `CREATE TABLE IF NOT EXISTS`).
///
/// # Errors
///
/// Returns [`ConnectionError`] if the database cannot be opened or the
/// schema cannot be created.
pub fn open(config: &SqliteStoreConfig) -> Result<Connection, ConnectionError> {
    ensure_parent_dir(&config.path)?;
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(|err| ConnectionError::Open(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    initialize_schema(&connection)?;
    Ok(connection)
}

/// Ensures the parent directory of `path` exists.
fn ensure_parent_dir(path: &Path) -> Result<(), ConnectionError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|err| ConnectionError::Open(err.to_string()))?;
        }
    }
    Ok(())
}

/// Applies the durability pragmas (WAL, full sync, busy timeout).
fn apply_pragmas(connection: &Connection, config: &SqliteStoreConfig) -> Result<(), ConnectionError> {
    connection.execute_batch("PRAGMA journal_mode = WAL;").map_err(|err| ConnectionError::Open(err.to_string()))?;
    connection.execute_batch("PRAGMA synchronous = FULL;").map_err(|err| ConnectionError::Open(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| ConnectionError::Open(err.to_string()))?;
    Ok(())
}

/// Creates every table this crate's stores write to, if absent.
fn initialize_schema(connection: &Connection) -> Result<(), ConnectionError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);

             CREATE TABLE IF NOT EXISTS signals (
                 signal_id TEXT PRIMARY KEY,
                 service TEXT NOT NULL,
                 sequence INTEGER NOT NULL,
                 body_json BLOB NOT NULL,
                 body_hash TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_signals_service ON signals (service, sequence DESC);

             CREATE TABLE IF NOT EXISTS evidence_bundles (
                 evidence_id TEXT PRIMARY KEY,
                 service TEXT NOT NULL,
                 sequence INTEGER NOT NULL,
                 body_json BLOB NOT NULL,
                 body_hash TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_evidence_service ON evidence_bundles (service, sequence DESC);

             CREATE TABLE IF NOT EXISTS promotion_results (
                 result_key TEXT PRIMARY KEY,
                 incident_id TEXT,
                 candidate_id TEXT,
                 body_json BLOB NOT NULL,
                 body_hash TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_promotion_incident ON promotion_results (incident_id);
             CREATE INDEX IF NOT EXISTS idx_promotion_candidate ON promotion_results (candidate_id);

             CREATE TABLE IF NOT EXISTS incidents (
                 incident_id TEXT PRIMARY KEY,
                 service TEXT NOT NULL,
                 status TEXT NOT NULL,
                 incident_version INTEGER NOT NULL,
                 sequence INTEGER NOT NULL,
                 body_json BLOB NOT NULL,
                 body_hash TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_incidents_status_service ON incidents (status, service, sequence DESC);

             CREATE TABLE IF NOT EXISTS incident_events (
                 event_id TEXT PRIMARY KEY,
                 incident_id TEXT NOT NULL,
                 created_at_rfc3339 TEXT NOT NULL,
                 body_json BLOB NOT NULL,
                 body_hash TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_incident_events_incident ON incident_events (incident_id, created_at_rfc3339, event_id);

             CREATE TABLE IF NOT EXISTS outcomes (
                 outcome_id TEXT PRIMARY KEY,
                 incident_id TEXT NOT NULL,
                 service TEXT NOT NULL,
                 recorded_at_rfc3339 TEXT NOT NULL,
                 body_json BLOB NOT NULL,
                 body_hash TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_outcomes_incident ON outcomes (incident_id);
             CREATE INDEX IF NOT EXISTS idx_outcomes_service_time ON outcomes (service, recorded_at_rfc3339);

             CREATE TABLE IF NOT EXISTS resolution_summaries (
                 summary_id TEXT PRIMARY KEY,
                 body_json BLOB NOT NULL,
                 body_hash TEXT NOT NULL
             );

             CREATE TABLE IF NOT EXISTS confidence_calibrations (
                 calibration_id TEXT PRIMARY KEY,
                 body_json BLOB NOT NULL,
                 body_hash TEXT NOT NULL
             );

             CREATE TABLE IF NOT EXISTS learning_snapshots (
                 snapshot_id TEXT PRIMARY KEY,
                 body_json BLOB NOT NULL,
                 body_hash TEXT NOT NULL
             );

             CREATE TABLE IF NOT EXISTS automation_audits (
                 audit_id TEXT PRIMARY KEY,
                 status TEXT NOT NULL,
                 sequence INTEGER NOT NULL,
                 body_json BLOB NOT NULL,
                 body_hash TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_audits_status ON automation_audits (status, sequence DESC);

             CREATE TABLE IF NOT EXISTS idempotency_records (
                 idempotency_key TEXT PRIMARY KEY,
                 status TEXT NOT NULL,
                 body_json BLOB NOT NULL,
                 body_hash TEXT NOT NULL
             );

             CREATE TABLE IF NOT EXISTS kill_switch (
                 id INTEGER PRIMARY KEY CHECK (id = 1),
                 body_json BLOB NOT NULL
             );

             CREATE TABLE IF NOT EXISTS rate_limit_entries (
                 principal TEXT NOT NULL,
                 operation_type TEXT NOT NULL,
                 recorded_at_rfc3339 TEXT NOT NULL,
                 expires_at_rfc3339 TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_rate_limit_key ON rate_limit_entries (principal, operation_type, recorded_at_rfc3339);
             ",
        )
        .map_err(|err| ConnectionError::Schema(err.to_string()))?;

    let version: i64 = connection
        .query_row("SELECT version FROM store_meta LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);
    if version == 0 {
        connection
            .execute("INSERT INTO store_meta (version) VALUES (?1)", rusqlite::params![SCHEMA_VERSION])
            .map_err(|err| ConnectionError::Schema(err.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_twice_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SqliteStoreConfig::new(dir.path().join("opx.db"));
        open(&config).expect("first open");
        open(&config).expect("second open");
    }
}
