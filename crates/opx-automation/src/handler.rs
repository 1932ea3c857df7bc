// crates/opx-automation/src/handler.rs
// ============================================================================
// Module: Automation Engine
// Description: The shared handler skeleton for pattern extraction,
// calibration, and snapshot, plus the manual-trigger acceptance path.
// Purpose: Give every scheduled/manual invocation the same kill-switch
// check, audit-before-work, retry wrapper, and metric/alert emission
// sequence, with only the operation-specific compute swapped in.
// Dependencies: opx_core::{audit,authority,confidence,learning,time},
// opx-stores, crate::{alerts,audit_sink,dispatch,error,kill_switch,
// metrics,rate_limiter,retry}
// ============================================================================

//! ## Overview
//! [`AutomationEngine`] bundles every collaborator a handler invocation
//! needs: the audit recorder, the kill switch guard, the rate limiter, the
//! three learning-entity stores, the metrics/alert sinks, the job
//! dispatcher, and the retry policy. Every method takes an explicit `now:
//! Timestamp` rather than reading the wall clock itself — the caller (a CLI
//! entry point or scheduler shim, both out of this crate's scope) stamps
//! `now` once and passes it through, so a single invocation's `startTime`
//! is consistent everywhere it's used.
//!
//! `run_pattern_extraction`, `run_calibration`, and `run_snapshot` implement
//! the ten-step handler skeleton; `trigger_manual` implements the eight-step
//! manual trigger orchestration, which never runs the operation itself —
//! it only validates, checks the kill switch and rate limit, starts the
//! RUNNING audit, and enqueues the async invocation via
//! [`crate::dispatch::JobDispatcher`].

use std::sync::Arc;

use opx_core::audit::AutomationAudit;
use opx_core::audit::OperationType;
use opx_core::audit::TriggerType;
use opx_core::authority::Authority;
use opx_core::authority::AuthorityType;
use opx_core::learning::CalibrationError;
use opx_core::learning::DRIFT_THRESHOLD;
use opx_core::learning::SnapshotType;
use opx_core::time::Timestamp;
use opx_core::time::Window;
use opx_core::time::daily_window;
use opx_core::time::monthly_window;
use opx_core::time::weekly_window;
use opx_stores::OutcomeStore;
use opx_stores::SharedCalibrationStore;
use opx_stores::SharedOutcomeStore;
use opx_stores::SharedSnapshotStore;
use opx_stores::SharedSummaryStore;
use opx_stores::learning_store::CalibrationStore;
use opx_stores::learning_store::SnapshotStore;
use opx_stores::learning_store::SummaryStore;
use serde_json::Value;
use serde_json::json;

use crate::alerts::AlertEnvelope;
use crate::alerts::AlertSink;
use crate::alerts::AlertType;
use crate::audit_sink::AuditRecorder;
use crate::dispatch::JobDispatcher;
use crate::error::HandlerError;
use crate::kill_switch::KillSwitchGuard;
use crate::metrics::MetricEvent;
use crate::metrics::MetricsSink;
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;
use crate::retry::with_retry;

/// How a handler invocation resolves the window it operates over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowCadence {
    /// `[yesterday 00:00, today 00:00)`.
    Daily,
    /// Previous Monday 00:00 through previous Sunday 23:59:59.999.
    Weekly,
    /// Full previous calendar month.
    Monthly,
    /// Explicit, caller-supplied bounds.
    Custom {
        /// Window start, inclusive.
        start: Timestamp,
        /// Window end, exclusive.
        end: Timestamp,
    },
}

impl WindowCadence {
    /// Resolves the concrete window for this cadence as of `now`.
    #[must_use]
    pub fn resolve(&self, now: Timestamp) -> Window {
        match self {
            Self::Daily => daily_window(now),
            Self::Weekly => weekly_window(now),
            Self::Monthly => monthly_window(now),
            Self::Custom { start, end } => Window { start: *start, end: *end },
        }
    }
}

/// How an invocation was triggered, and the authority it carries.
#[derive(Debug, Clone)]
pub struct TriggerContext {
    /// Scheduled, manual, or manual-emergency.
    pub trigger_type: TriggerType,
    /// The authority to attribute the audit and any kill-switch bypass to.
    pub authority: Authority,
}

impl TriggerContext {
    /// Builds the context for a scheduler-invoked handler: SYSTEM
    /// authority, `SCHEDULED` trigger type.
    #[must_use]
    pub fn scheduled() -> Self {
        Self { trigger_type: TriggerType::Scheduled, authority: Authority::system() }
    }

    /// Builds the context for a manually invoked handler.
    #[must_use]
    pub fn manual(authority: Authority, emergency: bool) -> Self {
        let trigger_type = if emergency { TriggerType::ManualEmergency } else { TriggerType::Manual };
        Self { trigger_type, authority }
    }
}

/// A pattern extraction request.
#[derive(Debug, Clone)]
pub struct PatternExtractionRequest {
    /// Restrict to one service, or `None` for `"ALL"`.
    pub service: Option<String>,
    /// How to resolve the window.
    pub cadence: WindowCadence,
}

/// A calibration request. The window defaults to the previous calendar
/// month but may be overridden with [`WindowCadence::Custom`].
#[derive(Debug, Clone)]
pub struct CalibrationRequest {
    /// How to resolve the window.
    pub cadence: WindowCadence,
}

/// A snapshot request.
#[derive(Debug, Clone)]
pub struct SnapshotRequest {
    /// The snapshot cadence being recorded.
    pub snapshot_type: SnapshotType,
    /// How to resolve the window.
    pub cadence: WindowCadence,
    /// Summary ids to fold into the snapshot.
    pub summary_ids: Vec<String>,
    /// Calibration ids to fold into the snapshot.
    pub calibration_ids: Vec<String>,
}

/// The terminal outcome of a handler invocation that reached a terminal
/// audit without error: either it ran to completion, or it was skipped by
/// the kill switch or a gate, both recorded as `SUCCESS` with
/// `results.skipped` set, per spec.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    /// The operation ran and its results were recorded.
    Completed(AutomationAudit),
    /// The operation was skipped; the audit is still `SUCCESS`.
    Skipped(AutomationAudit),
}

impl HandlerOutcome {
    /// Returns the terminal audit regardless of which variant this is.
    #[must_use]
    pub const fn audit(&self) -> &AutomationAudit {
        match self {
            Self::Completed(audit) | Self::Skipped(audit) => audit,
        }
    }
}

/// Accepted response for a manual trigger: no substantive work has run yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualTriggerAccepted {
    /// The audit id the async invocation will continue under.
    pub audit_id: String,
    /// Always `"ACCEPTED"`.
    pub status: &'static str,
}

/// Bundles every collaborator a handler invocation needs.
pub struct AutomationEngine {
    /// Records the audit lifecycle.
    audit: AuditRecorder,
    /// Emits raw metric counters.
    metrics: Arc<dyn MetricsSink>,
    /// Publishes advisory alerts.
    alerts: Arc<dyn AlertSink>,
    /// Guards handler entry on the global kill switch.
    kill_switch: KillSwitchGuard,
    /// Enforces manual-trigger rate limits.
    rate_limiter: RateLimiter,
    /// Enqueues the async invocation for manual triggers.
    dispatcher: Arc<dyn JobDispatcher>,
    /// Backoff schedule for the underlying store call.
    retry_policy: RetryPolicy,
    /// Recorded incident outcomes.
    outcome_store: SharedOutcomeStore,
    /// Resolution summaries.
    summary_store: SharedSummaryStore,
    /// Confidence calibrations.
    calibration_store: SharedCalibrationStore,
    /// Learning snapshots.
    snapshot_store: SharedSnapshotStore,
}

impl AutomationEngine {
    /// Builds an engine from its collaborators.
    #[must_use]
    #[allow(clippy::too_many_arguments, reason = "mirrors the handler skeleton's full collaborator set; no subset is optional")]
    pub fn new(
        audit: AuditRecorder,
        metrics: Arc<dyn MetricsSink>,
        alerts: Arc<dyn AlertSink>,
        kill_switch: KillSwitchGuard,
        rate_limiter: RateLimiter,
        dispatcher: Arc<dyn JobDispatcher>,
        retry_policy: RetryPolicy,
        outcome_store: SharedOutcomeStore,
        summary_store: SharedSummaryStore,
        calibration_store: SharedCalibrationStore,
        snapshot_store: SharedSnapshotStore,
    ) -> Self {
        Self {
            audit,
            metrics,
            alerts,
            kill_switch,
            rate_limiter,
            dispatcher,
            retry_policy,
            outcome_store,
            summary_store,
            calibration_store,
            snapshot_store,
        }
    }

    /// Runs the pattern extraction handler.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] if the audit lifecycle faults or the
    /// underlying store write fails after retries are exhausted.
    pub async fn run_pattern_extraction(&self, request: PatternExtractionRequest, ctx: TriggerContext, now: Timestamp) -> Result<HandlerOutcome, HandlerError> {
        let window = request.cadence.resolve(now);
        let parameters = json!({
            "service": request.service,
            "windowStart": window.start.to_rfc3339(),
            "windowEnd": window.end.to_rfc3339(),
        });
        let Some(audit) = self.start_unless_blocked(OperationType::PatternExtraction, &ctx, now, parameters)? else {
            return Ok(HandlerOutcome::Skipped(self.skip_kill_switch(OperationType::PatternExtraction, ctx.trigger_type, now)?));
        };

        let service_or_all = request.service.as_deref().unwrap_or("ALL");
        let outcomes = self.outcome_store.list_in_window(request.service.as_deref(), &window)?;

        let summary = match opx_core::learning::extract_patterns(service_or_all, window.start, window.end, &outcomes) {
            Ok(summary) => summary,
            Err(identity_error) => {
                return self.fail(audit, now, HandlerError::Identity(identity_error)).await;
            }
        };

        let store = self.summary_store.clone();
        let persisted = summary.clone();
        match with_retry(&self.retry_policy, || {
            let store = store.clone();
            let summary = persisted.clone();
            async move { store.put(summary) }
        })
        .await
        {
            Ok(_) => {}
            Err(store_error) => return self.fail(audit, now, store_error.into()).await,
        }

        let results = json!({
            "summaryId": summary.summary_id,
            "recordsProcessed": outcomes.len(),
            "failedServices": summary.patterns.detection_warnings.len(),
        });
        self.metrics.emit(MetricEvent::RecordsProcessed { operation_type: OperationType::PatternExtraction, count: u64::try_from(outcomes.len()).unwrap_or(u64::MAX) });
        self.metrics.emit(MetricEvent::FailedServices { operation_type: OperationType::PatternExtraction, count: u64::try_from(summary.patterns.detection_warnings.len()).unwrap_or(u64::MAX) });
        self.succeed(audit, now, ctx.trigger_type, results).await.map(HandlerOutcome::Completed)
    }

    /// Runs the calibration handler, including the insufficient-data gate
    /// and advisory drift alerting.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] if the audit lifecycle faults or the
    /// underlying store write fails after retries are exhausted.
    pub async fn run_calibration(&self, request: CalibrationRequest, ctx: TriggerContext, now: Timestamp) -> Result<HandlerOutcome, HandlerError> {
        let window = request.cadence.resolve(now);
        let parameters = json!({
            "windowStart": window.start.to_rfc3339(),
            "windowEnd": window.end.to_rfc3339(),
        });
        let Some(audit) = self.start_unless_blocked(OperationType::Calibration, &ctx, now, parameters)? else {
            return Ok(HandlerOutcome::Skipped(self.skip_kill_switch(OperationType::Calibration, ctx.trigger_type, now)?));
        };

        let outcomes = self.outcome_store.list_in_window(None, &window)?;

        let calibration = match opx_core::learning::calibrate(window.start, window.end, &outcomes) {
            Ok(calibration) => calibration,
            Err(CalibrationError::InsufficientData(count)) => {
                self.metrics.emit(MetricEvent::CalibrationSkipped { reason: "INSUFFICIENT_DATA".to_string() });
                self.metrics.emit(MetricEvent::Failure { operation_type: OperationType::Calibration, trigger_type: ctx.trigger_type, error_type: "INSUFFICIENT_DATA".to_string() });
                self.alerts.publish(AlertEnvelope::new(
                    OperationType::Calibration,
                    ctx.trigger_type,
                    audit.audit_id.clone(),
                    AlertType::InsufficientData,
                    format!("calibration skipped: {count} outcomes available, need at least 30"),
                ));
                let results = json!({"skipped": "INSUFFICIENT_DATA", "outcomeCount": count});
                let terminal = self.audit.succeed(audit, now, results)?;
                return Ok(HandlerOutcome::Skipped(terminal));
            }
            Err(CalibrationError::Identity(identity_error)) => {
                return self.fail(audit, now, HandlerError::Identity(identity_error)).await;
            }
        };

        let store = self.calibration_store.clone();
        let persisted = calibration.clone();
        match with_retry(&self.retry_policy, || {
            let store = store.clone();
            let calibration = persisted.clone();
            async move { store.put(calibration) }
        })
        .await
        {
            Ok(_) => {}
            Err(store_error) => return self.fail(audit, now, store_error.into()).await,
        }

        for band_calibration in &calibration.band_calibrations {
            if band_calibration.drift.abs() > DRIFT_THRESHOLD {
                self.metrics.emit(MetricEvent::DriftDetected { band: band_calibration.band });
                self.alerts.publish(AlertEnvelope::new(
                    OperationType::Calibration,
                    ctx.trigger_type,
                    audit.audit_id.clone(),
                    AlertType::Drift,
                    format!("band {} drifted {:.3}, exceeding threshold {DRIFT_THRESHOLD}", band_calibration.band.as_str(), band_calibration.drift),
                ));
            }
        }

        let results = json!({
            "calibrationId": calibration.calibration_id,
            "recordsProcessed": outcomes.len(),
        });
        self.metrics.emit(MetricEvent::RecordsProcessed { operation_type: OperationType::Calibration, count: u64::try_from(outcomes.len()).unwrap_or(u64::MAX) });
        self.succeed(audit, now, ctx.trigger_type, results).await.map(HandlerOutcome::Completed)
    }

    /// Runs the snapshot handler.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] if the audit lifecycle faults or the
    /// underlying store write fails after retries are exhausted.
    pub async fn run_snapshot(&self, request: SnapshotRequest, ctx: TriggerContext, now: Timestamp) -> Result<HandlerOutcome, HandlerError> {
        let window = request.cadence.resolve(now);
        let parameters = json!({
            "snapshotType": request.snapshot_type.as_str(),
            "windowStart": window.start.to_rfc3339(),
            "windowEnd": window.end.to_rfc3339(),
        });
        let Some(audit) = self.start_unless_blocked(OperationType::Snapshot, &ctx, now, parameters)? else {
            return Ok(HandlerOutcome::Skipped(self.skip_kill_switch(OperationType::Snapshot, ctx.trigger_type, now)?));
        };

        let outcomes = self.outcome_store.list_in_window(None, &window)?;

        let snapshot = match opx_core::learning::build_snapshot(request.snapshot_type, window.start, window.end, &outcomes, &request.summary_ids, &request.calibration_ids) {
            Ok(snapshot) => snapshot,
            Err(identity_error) => {
                return self.fail(audit, now, HandlerError::Identity(identity_error)).await;
            }
        };

        let store = self.snapshot_store.clone();
        let persisted = snapshot.clone();
        match with_retry(&self.retry_policy, || {
            let store = store.clone();
            let snapshot = persisted.clone();
            async move { store.put(snapshot) }
        })
        .await
        {
            Ok(_) => {}
            Err(store_error) => return self.fail(audit, now, store_error.into()).await,
        }

        let results = json!({
            "snapshotId": snapshot.snapshot_id,
            "recordsProcessed": outcomes.len(),
        });
        self.metrics.emit(MetricEvent::SnapshotRecordCount { snapshot_type: request.snapshot_type, count: u64::try_from(outcomes.len()).unwrap_or(u64::MAX) });
        self.succeed(audit, now, ctx.trigger_type, results).await.map(HandlerOutcome::Completed)
    }

    /// Runs the manual trigger orchestration: validates the rate limit,
    /// checks the kill switch, starts the RUNNING audit, and enqueues the
    /// async invocation. No operation-specific work runs here.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::RateLimited`] if the caller is over its
    /// hourly cap, [`HandlerError::KillSwitchActive`] if blocked and not
    /// bypassed by emergency override, or an error from the audit lifecycle
    /// or dispatch.
    pub fn trigger_manual(&self, operation_type: OperationType, principal: &str, authority: Authority, trigger_type: TriggerType, payload: Value, now: Timestamp) -> Result<ManualTriggerAccepted, HandlerError> {
        if !authority.is_emergency_override() {
            let decision = self.rate_limiter.check(principal, operation_type, now);
            if !decision.allowed {
                return Err(HandlerError::RateLimited { current_count: decision.current_count, limit: decision.limit, retry_after_ms: decision.retry_after_ms });
            }
        }

        if self.kill_switch.is_blocking() && !authority.is_emergency_override() {
            self.metrics.emit(MetricEvent::KillSwitchBlocked { operation_type, trigger_type });
            self.skip_kill_switch(operation_type, trigger_type, now)?;
            return Err(HandlerError::KillSwitchActive);
        }

        let audit = self.audit.start(operation_type, trigger_type, now, payload.clone(), authority.clone())?;

        if !authority.is_emergency_override() {
            self.rate_limiter.record(principal, operation_type, now).map_err(HandlerError::Store)?;
        }

        self.dispatcher.dispatch(operation_type, &audit.audit_id, payload)?;

        Ok(ManualTriggerAccepted { audit_id: audit.audit_id, status: "ACCEPTED" })
    }

    /// Step 5 (kill-switch check) + step 6 (RUNNING audit) of the handler
    /// skeleton. Returns `Ok(None)` when blocked, leaving the caller to
    /// build the SKIPPED terminal audit via [`Self::skip_kill_switch`].
    fn start_unless_blocked(&self, operation_type: OperationType, ctx: &TriggerContext, now: Timestamp, parameters: Value) -> Result<Option<AutomationAudit>, HandlerError> {
        if self.kill_switch.is_blocking() && !ctx.authority.is_emergency_override() {
            self.metrics.emit(MetricEvent::KillSwitchBlocked { operation_type, trigger_type: ctx.trigger_type });
            return Ok(None);
        }
        self.metrics.emit(MetricEvent::InvocationCount { operation_type, trigger_type: ctx.trigger_type });
        let audit = self.audit.start(operation_type, ctx.trigger_type, now, parameters, ctx.authority.clone())?;
        Ok(Some(audit))
    }

    /// Records a kill-switch-blocked invocation as `SUCCESS` with
    /// `results.skipped = KILL_SWITCH_ACTIVE`, per spec.
    fn skip_kill_switch(&self, operation_type: OperationType, trigger_type: TriggerType, now: Timestamp) -> Result<AutomationAudit, HandlerError> {
        let parameters = json!({});
        let audit = self.audit.start(operation_type, trigger_type, now, parameters, Authority::system())?;
        let results = json!({"skipped": "KILL_SWITCH_ACTIVE"});
        Ok(self.audit.succeed(audit, now, results)?)
    }

    /// Step 9: marks the audit `SUCCESS` and emits the shared success
    /// metrics.
    async fn succeed(&self, audit: AutomationAudit, now: Timestamp, trigger_type: TriggerType, results: Value) -> Result<AutomationAudit, HandlerError> {
        let operation_type = audit.operation_type;
        let start_time = audit.start_time;
        let terminal = self.audit.succeed(audit, now, results)?;
        self.metrics.emit(MetricEvent::Success { operation_type, trigger_type });
        self.metrics.emit(MetricEvent::Duration { operation_type, trigger_type, millis: elapsed_millis(start_time, now) });
        Ok(terminal)
    }

    /// Step 10: marks the audit `FAILED`, emits `Failure`, and publishes a
    /// `FAILURE` alert, then returns the original error to the caller so it
    /// propagates (rethrown, per spec, so the invocation runtime may retry
    /// the whole handler).
    async fn fail(&self, audit: AutomationAudit, now: Timestamp, error: HandlerError) -> Result<HandlerOutcome, HandlerError> {
        let operation_type = audit.operation_type;
        let trigger_type = audit.trigger_type;
        let audit_id = audit.audit_id.clone();
        let message = error.to_string();
        self.audit.fail(audit, now, message.clone(), None)?;
        self.metrics.emit(MetricEvent::Failure { operation_type, trigger_type, error_type: error.label().to_string() });
        self.alerts.publish(AlertEnvelope::new(operation_type, trigger_type, audit_id, AlertType::Failure, message));
        Err(error)
    }
}

/// Milliseconds between `start` and `end`, saturating at zero if `end`
/// precedes `start`.
fn elapsed_millis(start: Timestamp, end: Timestamp) -> u64 {
    let start_nanos = start.as_offset_date_time().unix_timestamp_nanos();
    let end_nanos = end.as_offset_date_time().unix_timestamp_nanos();
    u64::try_from((end_nanos - start_nanos) / 1_000_000).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use opx_core::outcome::Classification;
    use opx_core::outcome::HumanAssessment;
    use opx_core::outcome::Timing;
    use opx_core::outcome::IncidentOutcome;
    use opx_stores::InMemoryCalibrationStore;
    use opx_stores::InMemoryKillSwitchStore;
    use opx_stores::InMemoryOutcomeStore;
    use opx_stores::InMemoryRateLimitStore;
    use opx_stores::InMemorySnapshotStore;
    use opx_stores::InMemorySummaryStore;
    use opx_stores::AuditStore as _;
    use opx_stores::audit_store::InMemoryAuditStore;
    use opx_stores::SharedAuditStore;
    use opx_stores::SharedKillSwitchStore;
    use opx_stores::SharedRateLimitStore;

    use crate::dispatch::RecordingJobDispatcher;
    use crate::metrics::RecordingMetricsSink;
    use crate::alerts::RecordingAlertSink;

    use super::*;

    fn build_engine() -> (AutomationEngine, Arc<RecordingMetricsSink>, Arc<RecordingAlertSink>, SharedOutcomeStore) {
        let metrics = Arc::new(RecordingMetricsSink::new());
        let alerts = Arc::new(RecordingAlertSink::new());
        let outcome_store = SharedOutcomeStore::from_store(InMemoryOutcomeStore::new());
        let engine = AutomationEngine::new(
            AuditRecorder::new(SharedAuditStore::from_store(InMemoryAuditStore::new())),
            metrics.clone(),
            alerts.clone(),
            KillSwitchGuard::new(SharedKillSwitchStore::from_store(InMemoryKillSwitchStore::new())),
            RateLimiter::new(SharedRateLimitStore::from_store(InMemoryRateLimitStore::new())),
            Arc::new(RecordingJobDispatcher::new()),
            RetryPolicy { initial_delay: std::time::Duration::from_millis(1), max_delay: std::time::Duration::from_millis(2), max_retries: 1, backoff_multiplier: 2 },
            outcome_store.clone(),
            SharedSummaryStore::from_store(InMemorySummaryStore::new()),
            SharedCalibrationStore::from_store(InMemoryCalibrationStore::new()),
            SharedSnapshotStore::from_store(InMemorySnapshotStore::new()),
        );
        (engine, metrics, alerts, outcome_store)
    }

    fn outcome(id: &str, recorded_at: &str) -> IncidentOutcome {
        let ts = Timestamp::parse(recorded_at).expect("ts");
        IncidentOutcome {
            outcome_id: id.to_string(),
            incident_id: format!("incident-{id}"),
            service: "checkout".to_string(),
            recorded_at: ts,
            validated_at: ts,
            recorded_by: Authority::system(),
            classification: Classification {
                true_positive: true,
                false_positive: false,
                root_cause: "database pool exhaustion".to_string(),
                resolution_type: opx_core::incident::ResolutionType::Fixed,
            },
            timing: Timing { detected_at: ts, resolved_at: ts, closed_at: ts, ttd_seconds: 60, ttr_seconds: 300 },
            human_assessment: HumanAssessment { confidence_rating: 0.9, severity_accuracy: true, detection_quality: true, notes: None },
            predicted_band: "HIGH".to_string(),
            version: 1,
        }
    }

    #[tokio::test]
    async fn pattern_extraction_completes_and_records_a_summary() {
        let (engine, metrics, _alerts, outcome_store) = build_engine();
        outcome_store.put(outcome("o1", "2026-03-04T01:00:00.000Z")).expect("put");
        let now = Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts");
        let request = PatternExtractionRequest { service: Some("checkout".to_string()), cadence: WindowCadence::Daily };
        let outcome_result = engine.run_pattern_extraction(request, TriggerContext::scheduled(), now).await.expect("run");
        assert!(matches!(outcome_result, HandlerOutcome::Completed(_)));
        assert_eq!(outcome_result.audit().status, opx_core::audit::AuditStatus::Success);
        assert!(metrics.events().iter().any(|event| matches!(event, MetricEvent::Success { .. })));
    }

    #[tokio::test]
    async fn kill_switch_active_skips_without_running_the_operation() {
        let (engine, metrics, _alerts, _outcome_store) = build_engine();
        let now = Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts");
        let guard = KillSwitchGuard::new(SharedKillSwitchStore::from_store(InMemoryKillSwitchStore::new()));
        guard.disable(&Authority::new(AuthorityType::EmergencyOverride, "oncall"), "storm", now).expect("disable");
        let engine = AutomationEngine::new(
            AuditRecorder::new(SharedAuditStore::from_store(InMemoryAuditStore::new())),
            Arc::new(RecordingMetricsSink::new()),
            Arc::new(RecordingAlertSink::new()),
            guard,
            RateLimiter::new(SharedRateLimitStore::from_store(InMemoryRateLimitStore::new())),
            Arc::new(RecordingJobDispatcher::new()),
            RetryPolicy::default(),
            SharedOutcomeStore::from_store(InMemoryOutcomeStore::new()),
            SharedSummaryStore::from_store(InMemorySummaryStore::new()),
            SharedCalibrationStore::from_store(InMemoryCalibrationStore::new()),
            SharedSnapshotStore::from_store(InMemorySnapshotStore::new()),
        );
        let request = SnapshotRequest { snapshot_type: SnapshotType::Daily, cadence: WindowCadence::Daily, summary_ids: vec![], calibration_ids: vec![] };
        let result = engine.run_snapshot(request, TriggerContext::scheduled(), now).await.expect("run");
        assert!(matches!(result, HandlerOutcome::Skipped(_)));
        assert_eq!(result.audit().status, opx_core::audit::AuditStatus::Success);
        let _ = metrics;
    }

    #[tokio::test]
    async fn calibration_below_minimum_outcomes_is_skipped_as_success() {
        let (engine, metrics, alerts, _outcome_store) = build_engine();
        let now = Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts");
        let request = CalibrationRequest { cadence: WindowCadence::Monthly };
        let result = engine.run_calibration(request, TriggerContext::scheduled(), now).await.expect("run");
        assert!(matches!(result, HandlerOutcome::Skipped(_)));
        assert_eq!(result.audit().status, opx_core::audit::AuditStatus::Success);
        assert!(metrics.events().iter().any(|event| matches!(event, MetricEvent::CalibrationSkipped { .. })));
        assert!(alerts.envelopes().iter().any(|envelope| envelope.alert_type == AlertType::InsufficientData));
    }

    #[test]
    fn manual_trigger_blocked_by_kill_switch_still_records_a_skipped_audit() {
        let audit_store = SharedAuditStore::from_store(InMemoryAuditStore::new());
        let guard = KillSwitchGuard::new(SharedKillSwitchStore::from_store(InMemoryKillSwitchStore::new()));
        let now = Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts");
        guard.disable(&Authority::new(AuthorityType::EmergencyOverride, "oncall"), "storm", now).expect("disable");
        let engine = AutomationEngine::new(
            AuditRecorder::new(audit_store.clone()),
            Arc::new(RecordingMetricsSink::new()),
            Arc::new(RecordingAlertSink::new()),
            guard,
            RateLimiter::new(SharedRateLimitStore::from_store(InMemoryRateLimitStore::new())),
            Arc::new(RecordingJobDispatcher::new()),
            RetryPolicy::default(),
            SharedOutcomeStore::from_store(InMemoryOutcomeStore::new()),
            SharedSummaryStore::from_store(InMemorySummaryStore::new()),
            SharedCalibrationStore::from_store(InMemoryCalibrationStore::new()),
            SharedSnapshotStore::from_store(InMemorySnapshotStore::new()),
        );
        let authority = Authority::new(AuthorityType::HumanOperator, "sre@example.com");
        let err = engine.trigger_manual(OperationType::Snapshot, "sre@example.com", authority, TriggerType::Manual, json!({}), now).unwrap_err();
        assert!(matches!(err, HandlerError::KillSwitchActive));
        let recorded = audit_store.list_recent(None, 10).expect("list");
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].status, opx_core::audit::AuditStatus::Success);
        assert_eq!(recorded[0].results.get("skipped").and_then(serde_json::Value::as_str), Some("KILL_SWITCH_ACTIVE"));
    }

    #[test]
    fn manual_trigger_with_emergency_override_bypasses_an_active_kill_switch() {
        let guard = KillSwitchGuard::new(SharedKillSwitchStore::from_store(InMemoryKillSwitchStore::new()));
        let now = Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts");
        guard.disable(&Authority::new(AuthorityType::EmergencyOverride, "oncall"), "storm", now).expect("disable");
        let engine = AutomationEngine::new(
            AuditRecorder::new(SharedAuditStore::from_store(InMemoryAuditStore::new())),
            Arc::new(RecordingMetricsSink::new()),
            Arc::new(RecordingAlertSink::new()),
            guard,
            RateLimiter::new(SharedRateLimitStore::from_store(InMemoryRateLimitStore::new())),
            Arc::new(RecordingJobDispatcher::new()),
            RetryPolicy::default(),
            SharedOutcomeStore::from_store(InMemoryOutcomeStore::new()),
            SharedSummaryStore::from_store(InMemorySummaryStore::new()),
            SharedCalibrationStore::from_store(InMemoryCalibrationStore::new()),
            SharedSnapshotStore::from_store(InMemorySnapshotStore::new()),
        );
        let authority = Authority::new(AuthorityType::EmergencyOverride, "oncall");
        let accepted = engine.trigger_manual(OperationType::Snapshot, "oncall", authority, TriggerType::ManualEmergency, json!({}), now).expect("trigger proceeds despite active kill switch");
        assert_eq!(accepted.status, "ACCEPTED");
    }

    #[test]
    fn manual_trigger_is_accepted_and_dispatched() {
        let (engine, _metrics, _alerts, _outcome_store) = build_engine();
        let now = Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts");
        let authority = Authority::new(AuthorityType::HumanOperator, "sre@example.com");
        let accepted = engine.trigger_manual(OperationType::Snapshot, "sre@example.com", authority, TriggerType::Manual, json!({"snapshotType": "DAILY"}), now).expect("trigger");
        assert_eq!(accepted.status, "ACCEPTED");
    }

    #[test]
    fn manual_trigger_respects_the_rate_limit() {
        let (engine, _metrics, _alerts, _outcome_store) = build_engine();
        let now = Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts");
        for _ in 0..3 {
            let authority = Authority::new(AuthorityType::HumanOperator, "sre@example.com");
            engine.trigger_manual(OperationType::Calibration, "sre@example.com", authority, TriggerType::Manual, json!({}), now).expect("trigger");
        }
        let authority = Authority::new(AuthorityType::HumanOperator, "sre@example.com");
        let err = engine.trigger_manual(OperationType::Calibration, "sre@example.com", authority, TriggerType::Manual, json!({}), now).unwrap_err();
        assert!(matches!(err, HandlerError::RateLimited { .. }));
    }
}
