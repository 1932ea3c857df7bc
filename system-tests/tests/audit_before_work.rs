//! Exercises the audit-before-work invariant against a real, file-backed
//! store: the dispatcher observes the RUNNING audit already committed by
//! the time it runs, not some time after.

use std::sync::Arc;
use std::sync::Mutex;

use opx_automation::AuditRecorder;
use opx_automation::AutomationEngine;
use opx_automation::DispatchError;
use opx_automation::JobDispatcher;
use opx_automation::KillSwitchGuard;
use opx_automation::NoopAlertSink;
use opx_automation::NoopMetricsSink;
use opx_automation::RateLimiter;
use opx_automation::RetryPolicy;
use opx_core::audit::AuditStatus;
use opx_core::audit::OperationType;
use opx_core::audit::TriggerType;
use opx_core::authority::Authority;
use opx_core::authority::AuthorityType;
use opx_core::time::Timestamp;
use opx_store_sqlite::OpxSqliteStore;
use opx_store_sqlite::SqliteStoreConfig;
use opx_stores::AuditStore as _;
use opx_stores::SharedAuditStore;
use opx_stores::SharedCalibrationStore;
use opx_stores::SharedKillSwitchStore;
use opx_stores::SharedOutcomeStore;
use opx_stores::SharedRateLimitStore;
use opx_stores::SharedSnapshotStore;
use opx_stores::SharedSummaryStore;
use serde_json::json;

/// Instead of enqueueing real work, reads the audit straight back from the
/// durable store a manual trigger just wrote to, and records what status it
/// found. A real job runtime would see exactly what this sees.
struct PeekingDispatcher {
    audits: SharedAuditStore,
    observed: Mutex<Option<AuditStatus>>,
}

impl JobDispatcher for PeekingDispatcher {
    fn dispatch(&self, _operation_type: OperationType, audit_id: &str, _payload: serde_json::Value) -> Result<(), DispatchError> {
        let audit = self.audits.get(audit_id).expect("read audit back from the durable store").expect("audit exists by dispatch time");
        *self.observed.lock().expect("lock") = Some(audit.status);
        Ok(())
    }
}

#[test]
fn manual_trigger_writes_the_running_audit_before_the_dispatcher_observes_it() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = OpxSqliteStore::open(&SqliteStoreConfig::new(dir.path().join("opx.db"))).expect("open store");
    let audits = SharedAuditStore::from_store(store.audits.clone());
    let dispatcher = Arc::new(PeekingDispatcher { audits: audits.clone(), observed: Mutex::new(None) });

    let engine = AutomationEngine::new(
        AuditRecorder::new(audits.clone()),
        Arc::new(NoopMetricsSink),
        Arc::new(NoopAlertSink),
        KillSwitchGuard::new(SharedKillSwitchStore::from_store(store.kill_switch.clone())),
        RateLimiter::new(SharedRateLimitStore::from_store(store.rate_limits.clone())),
        dispatcher.clone(),
        RetryPolicy::default(),
        SharedOutcomeStore::from_store(store.outcomes.clone()),
        SharedSummaryStore::from_store(store.summaries.clone()),
        SharedCalibrationStore::from_store(store.calibrations.clone()),
        SharedSnapshotStore::from_store(store.snapshots.clone()),
    );

    let now = Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts");
    let authority = Authority::new(AuthorityType::HumanOperator, "sre@example.com");
    let accepted = engine
        .trigger_manual(OperationType::Snapshot, "sre@example.com", authority, TriggerType::Manual, json!({"snapshotType": "DAILY"}), now)
        .expect("trigger accepted");

    assert_eq!(*dispatcher.observed.lock().expect("lock"), Some(AuditStatus::Running));

    // The audit is still RUNNING after dispatch returns: trigger_manual's
    // contract ends at "accepted and enqueued", not "completed". Whatever
    // executes the job is responsible for the eventual SUCCESS/FAILED write.
    let after_dispatch = audits.get(&accepted.audit_id).expect("read").expect("present");
    assert_eq!(after_dispatch.status, AuditStatus::Running);
}
