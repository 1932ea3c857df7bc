// crates/opx-core/src/outcome.rs
// ============================================================================
// Module: Incident Outcome & Validation Gate
// Description: Immutable closure record plus the gate that admits it.
// Purpose: Turn a CLOSED incident into a permanent, content-addressed
// outcome record feeding pattern extraction, calibration, and snapshots.
// Dependencies: crate::authority, crate::identity, crate::incident, crate::time
// ============================================================================

//! ## Overview
//! Recording an outcome is append-only: no update, no delete, ever. The
//! validation gate rejects malformed input before a record is ever
//! constructed; timing is always derived from the incident record, never
//! accepted from the caller, so a recorder cannot fabricate TTD/TTR.

use crate::authority::Authority;
use crate::authority::AuthorityType;
use crate::identity::IdentityError;
use crate::identity::compute_outcome_id;
use crate::incident::Incident;
use crate::incident::IncidentStatus;
use crate::incident::ResolutionType;
use crate::time::Timestamp;

/// Resolution classification as recorded on the outcome (mirrors
/// [`ResolutionType`] but is recorded independently since an outcome is
/// permanent even if the incident's own resolution block were somehow
/// later found inconsistent).
pub use crate::incident::ResolutionType as OutcomeResolutionType;

/// Classification of whether the incident was a real detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Classification {
    /// The incident was a genuine true positive.
    pub true_positive: bool,
    /// The incident was a false positive. Exactly one of
    /// `true_positive`/`false_positive` is true.
    pub false_positive: bool,
    /// Root cause narrative, 1..500 characters.
    pub root_cause: String,
    /// How the incident was resolved.
    pub resolution_type: OutcomeResolutionType,
}

/// Timing facts, entirely derived from the incident record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Timing {
    /// When the underlying condition was first detected (evidence window
    /// start of the originating evidence, via `incident.timestamps.created_at`).
    pub detected_at: Timestamp,
    /// When the incident was resolved.
    pub resolved_at: Timestamp,
    /// When the incident was closed.
    pub closed_at: Timestamp,
    /// Time-to-detect in seconds; always `>= 0`.
    pub ttd_seconds: i64,
    /// Time-to-resolve in seconds; always `>= 0`.
    pub ttr_seconds: i64,
}

/// Human assessment of the incident's handling, supplied by the recorder.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HumanAssessment {
    /// Recorder's confidence in the classification, in `[0, 1]`.
    pub confidence_rating: f64,
    /// Whether the assigned severity was accurate.
    pub severity_accuracy: bool,
    /// Whether detection quality was adequate.
    pub detection_quality: bool,
    /// Optional free-text notes, at most 2000 characters.
    pub notes: Option<String>,
}

/// Immutable, append-only incident outcome record.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IncidentOutcome {
    /// Deterministic `digest(incidentId | closedAt)` outcome id.
    pub outcome_id: String,
    /// The incident this outcome closes out.
    pub incident_id: String,
    /// Service the incident pertains to.
    pub service: String,
    /// When the outcome was recorded; always `<= validated_at`.
    pub recorded_at: Timestamp,
    /// When the outcome was validated by the gate.
    pub validated_at: Timestamp,
    /// Who recorded the outcome.
    pub recorded_by: Authority,
    /// Classification details.
    pub classification: Classification,
    /// Timing facts.
    pub timing: Timing,
    /// Human assessment of the incident's handling.
    pub human_assessment: HumanAssessment,
    /// Predicted confidence band at promotion time, carried forward for the
    /// confidence calibrator.
    pub predicted_band: String,
    /// Schema version of this outcome record.
    pub version: u32,
}

/// A request to record an outcome, prior to gate validation.
pub struct OutcomeRequest {
    /// Authority attempting to record the outcome.
    pub authority: Authority,
    /// Classification details.
    pub classification: Classification,
    /// Human assessment of the incident's handling.
    pub human_assessment: HumanAssessment,
    /// When the outcome is being recorded (wall clock).
    pub recorded_at: Timestamp,
    /// When the gate validated the request (wall clock, `>= recorded_at`).
    pub validated_at: Timestamp,
}

/// Why a requested outcome was rejected by the validation gate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutcomeError {
    /// The incident is not yet CLOSED.
    #[error("incident is not CLOSED (status = {0})")]
    IncidentNotClosed(IncidentStatus),
    /// The recording authority's type is not permitted to record outcomes.
    #[error("authority {0} may not record outcomes")]
    AuthorityNotPermitted(AuthorityType),
    /// `validatedAt < recordedAt`.
    #[error("validatedAt must be >= recordedAt")]
    ValidationBeforeRecording,
    /// Classification did not satisfy exactly one of
    /// `truePositive`/`falsePositive`.
    #[error("classification must set exactly one of truePositive/falsePositive")]
    AmbiguousClassification,
    /// Root cause narrative length is out of bounds (1..500).
    #[error("rootCause must be 1..=500 characters")]
    RootCauseLength,
    /// Notes length exceeded 2000 characters.
    #[error("notes must be at most 2000 characters")]
    NotesTooLong,
    /// `confidenceRating` is out of `[0, 1]`.
    #[error("confidenceRating must be in [0, 1]")]
    ConfidenceRatingOutOfRange,
    /// The incident record lacks a resolution block despite being CLOSED;
    /// an integrity fault, not caller error.
    #[error("closed incident is missing its resolution block")]
    MissingResolution,
    /// The incident lacks a `resolvedAt`/`closedAt` timestamp despite being
    /// CLOSED; an integrity fault.
    #[error("closed incident is missing a lifecycle timestamp")]
    MissingTimestamp,
    /// Computing the deterministic outcome id failed.
    #[error("failed to compute outcome id: {0}")]
    Identity(#[from] IdentityError),
}

const PERMITTED_RECORDER_AUTHORITIES: [AuthorityType; 3] = [
    AuthorityType::HumanOperator,
    AuthorityType::OnCallSre,
    AuthorityType::EmergencyOverride,
];

/// Validates and constructs an [`IncidentOutcome`] for a CLOSED `incident`.
///
/// Timing (`detectedAt`, `resolvedAt`, `closedAt`, `ttd`, `ttr`) is always
/// derived from `incident`; the caller cannot supply or override it.
///
/// # Errors
///
/// Returns [`OutcomeError`] if any gate condition fails; `incident` and
/// `request` are otherwise left unused (no partial side effects).
pub fn record_outcome(incident: &Incident, request: OutcomeRequest) -> Result<IncidentOutcome, OutcomeError> {
    if incident.status != IncidentStatus::Closed {
        return Err(OutcomeError::IncidentNotClosed(incident.status));
    }
    if !PERMITTED_RECORDER_AUTHORITIES.contains(&request.authority.authority_type) {
        return Err(OutcomeError::AuthorityNotPermitted(request.authority.authority_type));
    }
    if request.validated_at < request.recorded_at {
        return Err(OutcomeError::ValidationBeforeRecording);
    }
    if request.classification.true_positive == request.classification.false_positive {
        return Err(OutcomeError::AmbiguousClassification);
    }
    let root_cause_len = request.classification.root_cause.chars().count();
    if !(1..=500).contains(&root_cause_len) {
        return Err(OutcomeError::RootCauseLength);
    }
    if let Some(notes) = &request.human_assessment.notes {
        if notes.chars().count() > 2000 {
            return Err(OutcomeError::NotesTooLong);
        }
    }
    if !(0.0..=1.0).contains(&request.human_assessment.confidence_rating) {
        return Err(OutcomeError::ConfidenceRatingOutOfRange);
    }

    let resolution = incident.resolution.as_ref().ok_or(OutcomeError::MissingResolution)?;
    let detected_at = incident.timestamps.created_at.ok_or(OutcomeError::MissingTimestamp)?;
    let resolved_at = incident.timestamps.resolved_at.ok_or(OutcomeError::MissingTimestamp)?;
    let closed_at = incident.timestamps.closed_at.ok_or(OutcomeError::MissingTimestamp)?;

    let ttd_seconds = seconds_between(detected_at, resolved_at);
    let ttr_seconds = seconds_between(detected_at, closed_at);
    let outcome_id = compute_outcome_id(&incident.incident_id, &closed_at.to_rfc3339())?;

    Ok(IncidentOutcome {
        outcome_id,
        incident_id: incident.incident_id.clone(),
        service: incident.service.clone(),
        recorded_at: request.recorded_at,
        validated_at: request.validated_at,
        recorded_by: request.authority,
        classification: Classification {
            resolution_type: resolution.resolution_type,
            ..request.classification
        },
        timing: Timing {
            detected_at,
            resolved_at,
            closed_at,
            ttd_seconds,
            ttr_seconds,
        },
        human_assessment: request.human_assessment,
        predicted_band: confidence_band_label(incident.confidence_score),
        version: 1,
    })
}

/// Whole seconds between `start` and `end`, floored at zero.
fn seconds_between(start: Timestamp, end: Timestamp) -> i64 {
    let delta = end.as_offset_date_time() - start.as_offset_date_time();
    delta.whole_seconds().max(0)
}

/// Returns the wire label of the confidence band containing `score`.
fn confidence_band_label(score: f64) -> String {
    crate::confidence::ConfidenceBand::from_score(score).as_str().to_string()
}
