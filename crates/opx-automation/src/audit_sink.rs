// crates/opx-automation/src/audit_sink.rs
// ============================================================================
// Module: Audit Recorder
// Description: Persists the audit lifecycle (start/succeed/fail) to an
// AuditStore, with a stderr-only variant for local/manual runs.
// Purpose: Give every handler one call each for starting and terminating an
// audit, instead of re-deriving create/replace call sequences inline.
// Dependencies: opx_core::audit, opx-stores::audit_store
// ============================================================================

//! ## Overview
//! [`AuditRecorder`] wraps a [`SharedAuditStore`] and exposes exactly the
//! three audit lifecycle transitions opx_core::audit defines:
//! [`opx_core::audit::start_audit`], [`opx_core::audit::succeed`], and
//! [`opx_core::audit::fail`]. `start` creates the RUNNING record; `succeed`
//! and `fail` replace it with a terminal one. A create/replace conflict is
//! surfaced as [`AuditRecorderError`] rather than silently retried, since a
//! duplicate audit id means a handler is being invoked twice for the same
//! logical run.

use opx_core::audit::AuditError;
use opx_core::audit::AutomationAudit;
use opx_core::audit::OperationType;
use opx_core::audit::TriggerType;
use opx_core::authority::Authority;
use opx_core::time::Timestamp;
use opx_stores::audit_store::AuditStore;
use opx_stores::audit_store::AuditStoreOrState;
use opx_stores::audit_store::SharedAuditStore;
use opx_stores::error::PutOutcome;
use opx_stores::error::StoreError;
use serde_json::Value;

/// Why the audit recorder could not complete a lifecycle transition.
#[derive(Debug, thiserror::Error)]
pub enum AuditRecorderError {
    /// Starting, succeeding, or failing the audit value itself was
    /// rejected (e.g. not RUNNING).
    #[error("audit lifecycle error: {0}")]
    Lifecycle(#[from] AuditError),
    /// The store already held a record at this audit id when starting.
    #[error("audit {0} already exists")]
    DuplicateAuditId(String),
    /// The store refused the terminal write (missing or already terminal).
    #[error("audit store state error: {0}")]
    State(#[from] opx_stores::audit_store::AuditStoreError),
    /// The underlying store faulted.
    #[error("audit store error: {0}")]
    Store(#[from] StoreError),
}

/// Records the audit lifecycle for handler invocations.
pub struct AuditRecorder {
    /// Backing store.
    store: SharedAuditStore,
}

impl AuditRecorder {
    /// Wraps a store handle in a recorder.
    #[must_use]
    pub fn new(store: SharedAuditStore) -> Self {
        Self { store }
    }

    /// Starts a new RUNNING audit and persists it.
    ///
    /// # Errors
    ///
    /// Returns [`AuditRecorderError::Lifecycle`] if the audit id cannot be
    /// computed, [`AuditRecorderError::DuplicateAuditId`] if one already
    /// exists, or [`AuditRecorderError::Store`] on I/O failure.
    pub fn start(&self, operation_type: OperationType, trigger_type: TriggerType, start_time: Timestamp, parameters: Value, triggered_by: Authority) -> Result<AutomationAudit, AuditRecorderError> {
        let audit = opx_core::audit::start_audit(operation_type, trigger_type, start_time, parameters, triggered_by)?;
        match self.store.create(audit.clone())? {
            PutOutcome::Created => Ok(audit),
            PutOutcome::AlreadyExists => Err(AuditRecorderError::DuplicateAuditId(audit.audit_id)),
        }
    }

    /// Marks `audit` SUCCESS and persists the terminal record.
    ///
    /// # Errors
    ///
    /// Returns [`AuditRecorderError::Lifecycle`] if `audit` is not RUNNING,
    /// or [`AuditRecorderError::State`]/[`AuditRecorderError::Store`] if the
    /// terminal write is refused or faults.
    pub fn succeed(&self, audit: AutomationAudit, end_time: Timestamp, results: Value) -> Result<AutomationAudit, AuditRecorderError> {
        let terminal = opx_core::audit::succeed(audit, end_time, results)?;
        Ok(self.store.replace(terminal).map_err(flatten_replace_error)?)
    }

    /// Marks `audit` FAILED and persists the terminal record.
    ///
    /// # Errors
    ///
    /// Returns [`AuditRecorderError::Lifecycle`] if `audit` is not RUNNING,
    /// or [`AuditRecorderError::State`]/[`AuditRecorderError::Store`] if the
    /// terminal write is refused or faults.
    pub fn fail(&self, audit: AutomationAudit, end_time: Timestamp, error_message: String, error_stack: Option<String>) -> Result<AutomationAudit, AuditRecorderError> {
        let terminal = opx_core::audit::fail(audit, end_time, error_message, error_stack)?;
        Ok(self.store.replace(terminal).map_err(flatten_replace_error)?)
    }
}

/// Unwraps the two-variant [`AuditStoreOrState`] into [`AuditRecorderError`]
/// directly, since `?` can't cross the intermediate enum automatically.
fn flatten_replace_error(error: AuditStoreOrState) -> AuditRecorderError {
    match error {
        AuditStoreOrState::Store(store) => AuditRecorderError::Store(store),
        AuditStoreOrState::State(state) => AuditRecorderError::State(state),
    }
}

#[cfg(test)]
mod tests {
    use opx_stores::audit_store::InMemoryAuditStore;
    use serde_json::json;

    use super::*;

    fn now() -> Timestamp {
        Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts")
    }

    #[test]
    fn start_then_succeed_round_trips_through_the_store() {
        let recorder = AuditRecorder::new(SharedAuditStore::from_store(InMemoryAuditStore::new()));
        let audit = recorder.start(OperationType::Snapshot, TriggerType::Scheduled, now(), json!({}), Authority::system()).expect("start");
        let succeeded = recorder.succeed(audit, now(), json!({"recordCount": 3})).expect("succeed");
        assert_eq!(succeeded.status, opx_core::audit::AuditStatus::Success);
    }

    #[test]
    fn starting_twice_with_the_same_identity_is_rejected() {
        let recorder = AuditRecorder::new(SharedAuditStore::from_store(InMemoryAuditStore::new()));
        recorder.start(OperationType::Snapshot, TriggerType::Scheduled, now(), json!({}), Authority::system()).expect("start");
        let err = recorder.start(OperationType::Snapshot, TriggerType::Scheduled, now(), json!({}), Authority::system()).unwrap_err();
        assert!(matches!(err, AuditRecorderError::DuplicateAuditId(_)));
    }

    #[test]
    fn fail_records_the_error_message() {
        let recorder = AuditRecorder::new(SharedAuditStore::from_store(InMemoryAuditStore::new()));
        let audit = recorder.start(OperationType::Calibration, TriggerType::Scheduled, now(), json!({}), Authority::system()).expect("start");
        let failed = recorder.fail(audit, now(), "INSUFFICIENT_DATA: 12 outcomes available, need at least 30".to_string(), None).expect("fail");
        assert_eq!(failed.status, opx_core::audit::AuditStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("INSUFFICIENT_DATA: 12 outcomes available, need at least 30"));
    }
}
