// crates/opx-core/src/audit.rs
// ============================================================================
// Module: Automation Audit Entity
// Description: The AutomationAudit record and its RUNNING -> terminal
// status transition.
// Purpose: Give every automation invocation (scheduled or manual) a
// durable, append-mostly audit trail with exactly-once terminal status.
// Dependencies: crate::authority, crate::identity, crate::time
// ============================================================================

//! ## Overview
//! `AutomationAudit` is created RUNNING before any substantive work
//! (audit-before-work, see `opx_automation::handler`) and mutated to a
//! terminal status exactly once. Every other field is fixed at creation;
//! this module only defines the entity and the one legal status edge.

use serde_json::Value;

use crate::authority::Authority;
use crate::identity::IdentityError;
use crate::identity::compute_audit_id;
use crate::time::Timestamp;

/// The automation operation an audit record covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    /// Pattern extraction (`ResolutionSummary` production).
    PatternExtraction,
    /// Confidence calibration.
    Calibration,
    /// Learning snapshot.
    Snapshot,
    /// Kill switch was enabled.
    KillSwitchEnable,
    /// Kill switch was disabled.
    KillSwitchDisable,
}

impl OperationType {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PatternExtraction => "PATTERN_EXTRACTION",
            Self::Calibration => "CALIBRATION",
            Self::Snapshot => "SNAPSHOT",
            Self::KillSwitchEnable => "KILL_SWITCH_ENABLE",
            Self::KillSwitchDisable => "KILL_SWITCH_DISABLE",
        }
    }
}

/// How an invocation was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    /// Invoked by the scheduler.
    Scheduled,
    /// Invoked via the manual API.
    Manual,
    /// Invoked via the manual API with `emergency=true`.
    ManualEmergency,
}

/// Audit record lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    /// Work is in progress.
    Running,
    /// Work completed successfully (including intentional skips).
    Success,
    /// Work failed.
    Failed,
}

/// Append-mostly audit record for one automation invocation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AutomationAudit {
    /// Deterministic `digest(operationType | startTime | version)` audit id.
    pub audit_id: String,
    /// Operation this audit covers.
    pub operation_type: OperationType,
    /// How the invocation was triggered.
    pub trigger_type: TriggerType,
    /// When the invocation started.
    pub start_time: Timestamp,
    /// When the invocation reached a terminal status.
    pub end_time: Option<Timestamp>,
    /// Current status.
    pub status: AuditStatus,
    /// Operation-specific input parameters.
    pub parameters: Value,
    /// Operation-specific results; for intentional skips, carries
    /// `{"skipped": "<reason>"}`.
    pub results: Value,
    /// Who triggered the invocation.
    pub triggered_by: Authority,
    /// Schema version of this audit record.
    pub version: u32,
    /// Error message, present only on FAILED.
    pub error_message: Option<String>,
    /// Error stack/trace, present only on FAILED.
    pub error_stack: Option<String>,
}

/// Why an attempted status update was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    /// The audit is not RUNNING, so it cannot move to a terminal status.
    #[error("audit {0} is not RUNNING and cannot be updated again")]
    NotRunning(String),
    /// Computing the deterministic audit id failed.
    #[error("failed to compute audit id: {0}")]
    Identity(#[from] IdentityError),
}

const AUDIT_SCHEMA_VERSION: u32 = 1;

/// Creates a new RUNNING audit record. `audit_id` is computed from
/// `operation_type`, `start_time`, and the fixed audit schema version, so
/// distinct start times never collide and a retried create-if-absent is
/// safe.
///
/// # Errors
///
/// Returns [`AuditError::Identity`] if the id cannot be computed.
pub fn start_audit(
    operation_type: OperationType,
    trigger_type: TriggerType,
    start_time: Timestamp,
    parameters: Value,
    triggered_by: Authority,
) -> Result<AutomationAudit, AuditError> {
    let audit_id = compute_audit_id(operation_type.as_str(), &start_time.to_rfc3339(), &AUDIT_SCHEMA_VERSION.to_string())?;
    Ok(AutomationAudit {
        audit_id,
        operation_type,
        trigger_type,
        start_time,
        end_time: None,
        status: AuditStatus::Running,
        parameters,
        results: Value::Null,
        triggered_by,
        version: AUDIT_SCHEMA_VERSION,
        error_message: None,
        error_stack: None,
    })
}

/// Moves a RUNNING audit to SUCCESS, attaching `results` and `end_time`.
///
/// # Errors
///
/// Returns [`AuditError::NotRunning`] if `audit.status != RUNNING`.
pub fn succeed(mut audit: AutomationAudit, end_time: Timestamp, results: Value) -> Result<AutomationAudit, AuditError> {
    if audit.status != AuditStatus::Running {
        return Err(AuditError::NotRunning(audit.audit_id));
    }
    audit.status = AuditStatus::Success;
    audit.end_time = Some(end_time);
    audit.results = results;
    Ok(audit)
}

/// Moves a RUNNING audit to FAILED, attaching the error and `end_time`.
///
/// # Errors
///
/// Returns [`AuditError::NotRunning`] if `audit.status != RUNNING`.
pub fn fail(mut audit: AutomationAudit, end_time: Timestamp, error_message: String, error_stack: Option<String>) -> Result<AutomationAudit, AuditError> {
    if audit.status != AuditStatus::Running {
        return Err(AuditError::NotRunning(audit.audit_id));
    }
    audit.status = AuditStatus::Failed;
    audit.end_time = Some(end_time);
    audit.error_message = Some(error_message);
    audit.error_stack = error_stack;
    Ok(audit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn start_time() -> Timestamp {
        Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts")
    }

    #[test]
    fn starting_an_audit_sets_running() {
        let audit = start_audit(
            OperationType::PatternExtraction,
            TriggerType::Scheduled,
            start_time(),
            json!({}),
            Authority::system(),
        )
        .expect("start");
        assert_eq!(audit.status, AuditStatus::Running);
        assert_eq!(audit.audit_id.len(), 64);
    }

    #[test]
    fn succeed_then_fail_is_rejected() {
        let audit = start_audit(
            OperationType::PatternExtraction,
            TriggerType::Scheduled,
            start_time(),
            json!({}),
            Authority::system(),
        )
        .expect("start");
        let succeeded = succeed(audit, Timestamp::parse("2026-03-05T00:01:00.000Z").expect("ts"), json!({"recordsProcessed": 10})).expect("succeed");
        let err = fail(succeeded, Timestamp::parse("2026-03-05T00:02:00.000Z").expect("ts"), "boom".into(), None).unwrap_err();
        assert!(matches!(err, AuditError::NotRunning(_)));
    }

    #[test]
    fn distinct_start_times_yield_distinct_audit_ids() {
        let a = start_audit(OperationType::Calibration, TriggerType::Scheduled, start_time(), json!({}), Authority::system()).expect("start");
        let b = start_audit(
            OperationType::Calibration,
            TriggerType::Scheduled,
            Timestamp::parse("2026-03-05T00:00:00.001Z").expect("ts"),
            json!({}),
            Authority::system(),
        )
        .expect("start");
        assert_ne!(a.audit_id, b.audit_id);
    }
}
