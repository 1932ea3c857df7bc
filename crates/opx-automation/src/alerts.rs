// crates/opx-automation/src/alerts.rs
// ============================================================================
// Module: Alert Envelope & Sink
// Description: The SNS-shaped advisory alert envelope and its sinks.
// Purpose: Give every alert a deduplication id and a fixed attribute set,
// with emission failures logged and swallowed rather than propagated.
// Dependencies: opx_core::audit
// ============================================================================

//! ## Overview
//! Alerts are best-effort: [`AlertSink::publish`] never returns a `Result`.
//! Every envelope carries the spec-mandated message attributes and a
//! deduplication id of `{operationType}-{auditId}`, computed once in
//! [`AlertEnvelope::new`] so no call site can construct one inconsistently.

use std::sync::Mutex;

use opx_core::audit::OperationType;
use opx_core::audit::TriggerType;

/// Category of an advisory alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertType {
    /// A handler invocation failed after exhausting retries.
    Failure,
    /// A handler invocation exceeded its time budget.
    Timeout,
    /// A confidence band's drift exceeded the advisory threshold.
    Drift,
    /// Calibration was skipped for lack of data.
    InsufficientData,
}

impl AlertType {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Failure => "FAILURE",
            Self::Timeout => "TIMEOUT",
            Self::Drift => "DRIFT",
            Self::InsufficientData => "INSUFFICIENT_DATA",
        }
    }
}

/// An SNS-shaped advisory alert, carrying the spec-mandated message
/// attributes and deduplication id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEnvelope {
    /// Operation the alert concerns.
    pub operation_type: OperationType,
    /// How the underlying invocation was triggered.
    pub trigger_type: TriggerType,
    /// The audit record the alert is about.
    pub audit_id: String,
    /// Alert category.
    pub alert_type: AlertType,
    /// Human-readable message body.
    pub message: String,
    /// `{operationType}-{auditId}`, used for publisher-side deduplication.
    pub deduplication_id: String,
}

impl AlertEnvelope {
    /// Builds an envelope, computing its deduplication id from
    /// `operation_type` and `audit_id`.
    #[must_use]
    pub fn new(operation_type: OperationType, trigger_type: TriggerType, audit_id: impl Into<String>, alert_type: AlertType, message: impl Into<String>) -> Self {
        let audit_id = audit_id.into();
        let deduplication_id = format!("{}-{audit_id}", operation_type.as_str());
        Self {
            operation_type,
            trigger_type,
            audit_id,
            alert_type,
            message: message.into(),
            deduplication_id,
        }
    }
}

/// Receives advisory alert envelopes. Never fails: a sink backed by a
/// fallible transport must catch and swallow its own error internally.
pub trait AlertSink: Send + Sync {
    /// Publishes one alert envelope.
    fn publish(&self, envelope: AlertEnvelope);
}

/// A sink that discards every envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAlertSink;

impl AlertSink for NoopAlertSink {
    fn publish(&self, _envelope: AlertEnvelope) {}
}

/// An in-memory sink that records every envelope, for test assertions.
#[derive(Default)]
pub struct RecordingAlertSink {
    /// Envelopes published so far, in publish order.
    envelopes: Mutex<Vec<AlertEnvelope>>,
}

impl RecordingAlertSink {
    /// Builds an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every envelope published so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned; acceptable in a test-only
    /// sink.
    #[must_use]
    #[allow(clippy::expect_used, reason = "test-double sink; a poisoned mutex here means an earlier assertion already failed")]
    pub fn envelopes(&self) -> Vec<AlertEnvelope> {
        self.envelopes.lock().expect("recording alert sink mutex poisoned").clone()
    }
}

impl AlertSink for RecordingAlertSink {
    #[allow(clippy::expect_used, reason = "test-double sink; a poisoned mutex here means an earlier assertion already failed")]
    fn publish(&self, envelope: AlertEnvelope) {
        self.envelopes.lock().expect("recording alert sink mutex poisoned").push(envelope);
    }
}
