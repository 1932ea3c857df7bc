// crates/opx-automation/src/metrics.rs
// ============================================================================
// Module: Metrics Sink
// Description: The raw-counter-only metrics taxonomy emitted by the
// automation orchestration layer, and the sinks that receive it.
// Purpose: Give every handler one typed emission point per named metric,
// instead of ad-hoc string-keyed counters.
// Dependencies: opx_core::audit, opx_core::confidence, opx_core::learning
// ============================================================================

//! ## Overview
//! Only raw counters and durations are emitted; nothing here precomputes a
//! rate. [`MetricsSink::emit`] never returns a `Result` — a concrete sink
//! that can fail (a real CloudWatch client, out of scope here) catches and
//! swallows its own error, per spec's "Metric/alert emission failure —
//! logged, swallowed".

use std::sync::Mutex;

use opx_core::audit::OperationType;
use opx_core::audit::TriggerType;
use opx_core::confidence::ConfidenceBand;
use opx_core::learning::SnapshotType;

/// One raw metric emission, named and dimensioned per spec.md §4.9.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricEvent {
    /// A handler invocation completed successfully.
    Success {
        /// Operation that succeeded.
        operation_type: OperationType,
        /// How the invocation was triggered.
        trigger_type: TriggerType,
    },
    /// A handler invocation failed.
    Failure {
        /// Operation that failed.
        operation_type: OperationType,
        /// How the invocation was triggered.
        trigger_type: TriggerType,
        /// Stable label for the error kind.
        error_type: String,
    },
    /// Wall-clock duration of a handler invocation, in milliseconds.
    Duration {
        /// Operation this duration covers.
        operation_type: OperationType,
        /// How the invocation was triggered.
        trigger_type: TriggerType,
        /// Duration in milliseconds.
        millis: u64,
    },
    /// Count of records processed by a successful operation.
    RecordsProcessed {
        /// Operation that produced the count.
        operation_type: OperationType,
        /// Records processed.
        count: u64,
    },
    /// Count of services flagged during pattern extraction.
    FailedServices {
        /// Operation that produced the count.
        operation_type: OperationType,
        /// Services flagged.
        count: u64,
    },
    /// Calibration was skipped before running.
    CalibrationSkipped {
        /// Stable reason label, e.g. `"INSUFFICIENT_DATA"`.
        reason: String,
    },
    /// A confidence band's drift exceeded the advisory threshold.
    DriftDetected {
        /// The band that drifted.
        band: ConfidenceBand,
    },
    /// A handler invocation was skipped by the kill switch.
    KillSwitchBlocked {
        /// Operation that was blocked.
        operation_type: OperationType,
        /// How the invocation was triggered.
        trigger_type: TriggerType,
    },
    /// Count of records projected into a learning snapshot.
    SnapshotRecordCount {
        /// The snapshot's cadence.
        snapshot_type: SnapshotType,
        /// Records projected.
        count: u64,
    },
    /// A handler invocation was accepted, regardless of outcome.
    InvocationCount {
        /// Operation invoked.
        operation_type: OperationType,
        /// How the invocation was triggered.
        trigger_type: TriggerType,
    },
}

/// Receives raw metric emissions from the automation orchestration layer.
pub trait MetricsSink: Send + Sync {
    /// Records one metric event. Never fails: a sink backed by a fallible
    /// transport must catch and swallow its own error internally.
    fn emit(&self, event: MetricEvent);
}

/// A sink that discards every event, used where metrics are not needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn emit(&self, _event: MetricEvent) {}
}

/// An in-memory sink that records every event, for test assertions.
#[derive(Default)]
pub struct RecordingMetricsSink {
    /// Events recorded so far, in emission order.
    events: Mutex<Vec<MetricEvent>>,
}

impl RecordingMetricsSink {
    /// Builds an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every event recorded so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned; acceptable in a test-only
    /// sink.
    #[must_use]
    #[allow(clippy::expect_used, reason = "test-double sink; a poisoned mutex here means an earlier assertion already failed")]
    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().expect("recording metrics sink mutex poisoned").clone()
    }
}

impl MetricsSink for RecordingMetricsSink {
    #[allow(clippy::expect_used, reason = "test-double sink; a poisoned mutex here means an earlier assertion already failed")]
    fn emit(&self, event: MetricEvent) {
        self.events.lock().expect("recording metrics sink mutex poisoned").push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_preserves_emission_order() {
        let sink = RecordingMetricsSink::new();
        sink.emit(MetricEvent::InvocationCount { operation_type: OperationType::Calibration, trigger_type: TriggerType::Scheduled });
        sink.emit(MetricEvent::Success { operation_type: OperationType::Calibration, trigger_type: TriggerType::Scheduled });
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], MetricEvent::InvocationCount { .. }));
        assert!(matches!(events[1], MetricEvent::Success { .. }));
    }

    #[test]
    fn noop_sink_never_panics() {
        let sink = NoopMetricsSink;
        sink.emit(MetricEvent::KillSwitchBlocked { operation_type: OperationType::Snapshot, trigger_type: TriggerType::Manual });
    }
}
