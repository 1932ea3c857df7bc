// crates/opx-store-sqlite/src/lib.rs
// ============================================================================
// Crate: opx-store-sqlite
// Description: Durable SQLite-backed implementations of every opx-stores
// trait, swappable for the in-memory reference stores without touching
// call sites.
// Purpose: Give opx-automation and opx-cli a persistence layer that
// survives process restarts, modeled on the teacher's single-file,
// WAL-journaled run-state store.
// ============================================================================

//! ## Overview
//! One `SQLite` connection backs every entity table; each `Sqlite*Store`
//! wraps the same `Arc<Mutex<Connection>>` and implements the matching
//! `opx_stores` trait. [`OpxSqliteStore`] opens the connection once and
//! hands out every store, mirroring the teacher's single constructed
//! `SqliteRunStateStore` wired up at server start.

pub mod audit_store;
pub mod connection;
pub mod digest;
pub mod error;
pub mod evidence_store;
pub mod idempotency_store;
pub mod incident_event_store;
pub mod incident_store;
pub mod kill_switch_store;
pub mod learning_store;
pub mod outcome_store;
pub mod promotion_store;
pub mod rate_limit_store;
pub mod signal_store;

pub use audit_store::SqliteAuditStore;
pub use connection::ConnectionError;
pub use connection::SqliteStoreConfig;
pub use error::SqliteStoreError;
pub use evidence_store::SqliteEvidenceStore;
pub use idempotency_store::SqliteIdempotencyStore;
pub use incident_event_store::SqliteIncidentEventStore;
pub use incident_store::SqliteIncidentStore;
pub use kill_switch_store::SqliteKillSwitchStore;
pub use learning_store::SqliteCalibrationStore;
pub use learning_store::SqliteSnapshotStore;
pub use learning_store::SqliteSummaryStore;
pub use outcome_store::SqliteOutcomeStore;
pub use promotion_store::SqlitePromotionStore;
pub use rate_limit_store::SqliteRateLimitStore;
pub use signal_store::SqliteSignalStore;

use std::sync::Arc;
use std::sync::Mutex;

/// Every durable store this crate provides, sharing one connection.
///
/// Opening one of these per process (rather than one connection per
/// store) keeps the `WAL` file and busy-timeout pragmas meaningful: all
/// writes serialize through the same `rusqlite::Connection` behind its
/// shared mutex.
#[derive(Clone)]
pub struct OpxSqliteStore {
    /// Signals ingested from upstream detectors.
    pub signals: SqliteSignalStore,
    /// Bundled evidence for candidate promotion.
    pub evidence: SqliteEvidenceStore,
    /// Promotion decisions, keyed by incident or rejected candidate.
    pub promotions: SqlitePromotionStore,
    /// The incident FSM's durable record.
    pub incidents: SqliteIncidentStore,
    /// Incident state-transition audit log.
    pub incident_events: SqliteIncidentEventStore,
    /// Recorded incident outcomes feeding the learning pipeline.
    pub outcomes: SqliteOutcomeStore,
    /// Aggregate resolution summaries.
    pub summaries: SqliteSummaryStore,
    /// Confidence calibration reports.
    pub calibrations: SqliteCalibrationStore,
    /// Point-in-time learning snapshots.
    pub snapshots: SqliteSnapshotStore,
    /// Automation job run audit log.
    pub audits: SqliteAuditStore,
    /// Idempotency records for manual-trigger endpoints.
    pub idempotency: SqliteIdempotencyStore,
    /// The global automation kill switch.
    pub kill_switch: SqliteKillSwitchStore,
    /// Manual-trigger rate limit counters.
    pub rate_limits: SqliteRateLimitStore,
}

impl OpxSqliteStore {
    /// Opens a `SQLite` database at `config.path`, initializing its schema
    /// if absent, and returns every entity store sharing that connection.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] if the database cannot be opened or its
    /// schema cannot be created.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, ConnectionError> {
        let connection = Arc::new(Mutex::new(connection::open(config)?));
        Ok(Self {
            signals: SqliteSignalStore::new(Arc::clone(&connection)),
            evidence: SqliteEvidenceStore::new(Arc::clone(&connection)),
            promotions: SqlitePromotionStore::new(Arc::clone(&connection)),
            incidents: SqliteIncidentStore::new(Arc::clone(&connection)),
            incident_events: SqliteIncidentEventStore::new(Arc::clone(&connection)),
            outcomes: SqliteOutcomeStore::new(Arc::clone(&connection)),
            summaries: SqliteSummaryStore::new(Arc::clone(&connection)),
            calibrations: SqliteCalibrationStore::new(Arc::clone(&connection)),
            snapshots: SqliteSnapshotStore::new(Arc::clone(&connection)),
            audits: SqliteAuditStore::new(Arc::clone(&connection)),
            idempotency: SqliteIdempotencyStore::new(Arc::clone(&connection)),
            kill_switch: SqliteKillSwitchStore::new(Arc::clone(&connection)),
            rate_limits: SqliteRateLimitStore::new(connection),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opx_stores::KillSwitchStore;
    use opx_stores::SignalStore;

    #[test]
    fn opening_wires_up_every_store_against_one_connection() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = SqliteStoreConfig::new(dir.path().join("opx.db"));
        let store = OpxSqliteStore::open(&config).expect("open");
        assert!(store.kill_switch.read().expect("read").is_none());
        assert_eq!(store.signals.list_by_service("checkout", 10).expect("list").len(), 0);
    }
}
