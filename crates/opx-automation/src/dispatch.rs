// crates/opx-automation/src/dispatch.rs
// ============================================================================
// Module: Job Dispatcher
// Description: The seam between a manual trigger's synchronous acceptance
// and the asynchronous invocation of the actual handler.
// Purpose: Represent "enqueue the operation handler for async invocation"
// without depending on a specific runtime (out of scope per spec).
// Dependencies: opx_core::audit
// ============================================================================

//! ## Overview
//! Manual triggers never do substantive work synchronously: step 7 of the
//! manual trigger orchestration enqueues an asynchronous invocation carrying
//! `auditId` and the request payload, then step 8 returns 202 immediately.
//! [`JobDispatcher`] is that enqueue call. The runtime backing it (Lambda,
//! a task queue, whatever invokes the scheduled handlers) is out of scope;
//! this crate only needs the seam.

use opx_core::audit::OperationType;
use serde_json::Value;

/// Enqueues the asynchronous invocation of an operation handler.
pub trait JobDispatcher: Send + Sync {
    /// Dispatches `operation_type` for `audit_id` with `payload`. Errors are
    /// the caller's problem to surface as a 500 to the manual-trigger
    /// client; dispatch itself is not retried here.
    ///
    /// # Errors
    ///
    /// Returns a boxed error on dispatch failure.
    fn dispatch(&self, operation_type: OperationType, audit_id: &str, payload: Value) -> Result<(), DispatchError>;
}

/// Why a dispatch attempt failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to dispatch {} for audit {audit_id}: {message}", operation_type.as_str())]
pub struct DispatchError {
    /// Operation that could not be dispatched.
    pub operation_type: OperationType,
    /// The audit id the dispatch was for.
    pub audit_id: String,
    /// Transport-level failure detail.
    pub message: String,
}

/// A dispatcher that discards every request, for tests and local runs with
/// no invocation runtime wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopJobDispatcher;

impl JobDispatcher for NoopJobDispatcher {
    fn dispatch(&self, _operation_type: OperationType, _audit_id: &str, _payload: Value) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// One recorded dispatch call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDispatch {
    /// Operation dispatched.
    pub operation_type: OperationType,
    /// The audit id carried.
    pub audit_id: String,
    /// The payload carried.
    pub payload: Value,
}

/// A dispatcher that records every request, for test assertions.
#[derive(Default)]
pub struct RecordingJobDispatcher {
    /// Dispatches recorded so far, in call order.
    calls: std::sync::Mutex<Vec<RecordedDispatch>>,
}

impl RecordingJobDispatcher {
    /// Builds an empty recording dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every dispatch recorded so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned; acceptable in a test-only
    /// dispatcher.
    #[must_use]
    #[allow(clippy::expect_used, reason = "test-double dispatcher; a poisoned mutex here means an earlier assertion already failed")]
    pub fn calls(&self) -> Vec<RecordedDispatch> {
        self.calls.lock().expect("recording dispatcher mutex poisoned").clone()
    }
}

impl JobDispatcher for RecordingJobDispatcher {
    #[allow(clippy::expect_used, reason = "test-double dispatcher; a poisoned mutex here means an earlier assertion already failed")]
    fn dispatch(&self, operation_type: OperationType, audit_id: &str, payload: Value) -> Result<(), DispatchError> {
        self.calls.lock().expect("recording dispatcher mutex poisoned").push(RecordedDispatch { operation_type, audit_id: audit_id.to_string(), payload });
        Ok(())
    }
}
