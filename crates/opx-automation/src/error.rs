// crates/opx-automation/src/error.rs
// ============================================================================
// Module: Handler Error
// Description: The error taxonomy a handler invocation can terminate with.
// Purpose: Give every failure a stable label for metrics/alerts, and a
// single type the dispatch layer converts into a FAILED audit.
// Dependencies: opx_core::audit, opx_core::learning, opx-stores::error
// ============================================================================

//! ## Overview
//! [`HandlerError`] is the union of everything that can stop a handler
//! short of recording a terminal audit: kill switch blocks, rate limit
//! blocks, store faults (after retries are exhausted), and calibration's
//! insufficient-data gate. [`HandlerError::label`] gives the stable string
//! every metric/alert uses, since `Display` text is meant for humans and
//! can change wording without breaking a dashboard.

use opx_core::identity::IdentityError;
use opx_core::learning::CalibrationError;
use opx_stores::error::StoreError;

use crate::audit_sink::AuditRecorderError;
use crate::dispatch::DispatchError;
use crate::kill_switch::KillSwitchError;

/// Everything that can stop a handler invocation before it reaches a
/// terminal audit status.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The kill switch is active; the invocation never started.
    #[error("automation kill switch is active")]
    KillSwitchActive,
    /// The caller exceeded its manual-trigger rate limit.
    #[error("rate limit exceeded: {current_count}/{limit} in the current window, retry after {0}ms", retry_after_ms.map_or_else(|| "unknown".to_string(), |ms| ms.to_string()))]
    RateLimited {
        /// Invocations already recorded in the window.
        current_count: u32,
        /// The cap in effect.
        limit: u32,
        /// Milliseconds until the caller may retry, if known.
        retry_after_ms: Option<u64>,
    },
    /// Calibration was skipped for lack of outcome data.
    #[error("calibration skipped: {0}")]
    InsufficientData(#[from] CalibrationError),
    /// A backing store failed after retries were exhausted.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// The audit lifecycle itself faulted (e.g. a double-terminal write).
    #[error("audit recorder error: {0}")]
    AuditRecorder(#[from] AuditRecorderError),
    /// A kill switch mutation was rejected.
    #[error("kill switch error: {0}")]
    KillSwitch(#[from] KillSwitchError),
    /// Enqueuing the async invocation for a manual trigger failed.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
    /// Computing a deterministic entity id failed.
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),
}

impl HandlerError {
    /// Stable label for metrics and alert dedup, independent of the
    /// human-readable `Display` text.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::KillSwitchActive => "KILL_SWITCH_ACTIVE",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::InsufficientData(_) => "INSUFFICIENT_DATA",
            Self::Store(_) => "STORE_ERROR",
            Self::AuditRecorder(_) => "AUDIT_ERROR",
            Self::KillSwitch(_) => "KILL_SWITCH_ERROR",
            Self::Dispatch(_) => "DISPATCH_ERROR",
            Self::Identity(_) => "IDENTITY_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable_strings() {
        assert_eq!(HandlerError::KillSwitchActive.label(), "KILL_SWITCH_ACTIVE");
        assert_eq!(HandlerError::RateLimited { current_count: 3, limit: 3, retry_after_ms: Some(1_000) }.label(), "RATE_LIMITED");
    }
}
