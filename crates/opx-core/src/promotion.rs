// crates/opx-core/src/promotion.rs
// ============================================================================
// Module: Promotion Gate
// Description: Deterministic decision from evidence + confidence to
// PROMOTE/REJECT with an incident identity.
// Purpose: The single authoritative rule for elevating a candidate to an
// incident.
// Dependencies: crate::confidence, crate::evidence, crate::identity
// ============================================================================

//! ## Overview
//! `evaluate` is pure: given an evidence bundle, its confidence assessment,
//! a service allowlist, and whether an active (non-terminal) incident
//! already exists for the derived incident id, it returns a
//! [`PromotionResult`] with no side effects. `incidentId` is always
//! `digest(service | evidenceId)` — evidence-derived only, never
//! time-based.

use serde::Deserialize;
use serde::Serialize;

use crate::confidence::CandidateAssessment;
use crate::confidence::ConfidenceBand;
use crate::evidence::EvidenceBundle;
use crate::identity::IdentityError;
use crate::identity::compute_incident_id;
use crate::time::Timestamp;

/// Current promotion gate version.
pub const GATE_VERSION: &str = "gate-v1.0.0";

/// Minimum confidence score required to promote.
pub const MIN_CONFIDENCE_SCORE: f64 = 0.6;
/// Minimum detection count required to promote.
pub const MIN_DETECTIONS: usize = 2;
/// Minimum unique rule count required to promote.
pub const MIN_UNIQUE_RULES: usize = 1;

/// Reason a candidate was rejected instead of promoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionCode {
    /// Confidence score or band did not clear the promotion threshold.
    ConfidenceTooLow,
    /// Fewer than [`MIN_DETECTIONS`] detections.
    InsufficientDetections,
    /// A non-terminal incident already exists for this `incidentId`.
    ActiveIncidentExists,
    /// The referenced evidence bundle does not exist.
    EvidenceNotFound,
    /// The service is not on the promotion allowlist.
    ServiceNotAllowed,
    /// An internal error prevented the gate from deciding.
    GateInternalError,
}

impl RejectionCode {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConfidenceTooLow => "CONFIDENCE_TOO_LOW",
            Self::InsufficientDetections => "INSUFFICIENT_DETECTIONS",
            Self::ActiveIncidentExists => "ACTIVE_INCIDENT_EXISTS",
            Self::EvidenceNotFound => "EVIDENCE_NOT_FOUND",
            Self::ServiceNotAllowed => "SERVICE_NOT_ALLOWED",
            Self::GateInternalError => "GATE_INTERNAL_ERROR",
        }
    }
}

/// Inclusive evidence window echoed on the promotion result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceWindow {
    /// Window start.
    pub start: Timestamp,
    /// Window end.
    pub end: Timestamp,
}

/// Outcome of evaluating a candidate against the promotion gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// The candidate was promoted to an incident.
    Promote {
        /// Deterministic `digest(service | evidenceId)` incident id.
        incident_id: String,
    },
    /// The candidate was rejected.
    Reject {
        /// Human-readable rejection reason.
        rejection_reason: String,
        /// Machine-readable rejection code.
        rejection_code: RejectionCode,
    },
}

/// The full promotion result persisted in the promotion store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionResult {
    /// The decision and its decision-specific fields.
    #[serde(flatten)]
    pub decision: Decision,
    /// The assessed candidate's model-derived id.
    pub candidate_id: String,
    /// The evidence bundle this decision was evaluated against.
    pub evidence_id: String,
    /// Confidence score at evaluation time.
    pub confidence_score: f64,
    /// Confidence band at evaluation time.
    pub confidence_band: ConfidenceBand,
    /// Evidence window echoed for audit purposes.
    pub evidence_window: EvidenceWindow,
    /// Always `evidence.bundled_at`.
    pub evaluated_at: Timestamp,
    /// The promotion gate version that produced this result.
    pub gate_version: String,
}

/// Whether an incident is in a "non-terminal" (active) state, for the
/// `ACTIVE_INCIDENT_EXISTS` check. Defined here rather than re-derived by
/// callers so the gate and the incident FSM agree on what "active" means.
pub trait ActiveIncidentLookup {
    /// Returns true when a non-terminal incident already exists for
    /// `incident_id`.
    fn has_active_incident(&self, incident_id: &str) -> bool;
}

/// Errors raised while evaluating the promotion gate.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Computing the deterministic incident id failed.
    #[error("failed to compute incident id: {0}")]
    Identity(#[from] IdentityError),
}

/// Evaluates the promotion gate (decision rule v1.0.0): PROMOTE iff all
/// hold — `confidenceBand >= HIGH`, `confidenceScore >= 0.6`,
/// `|detections| >= 2`, `uniqueRules >= 1`, `service` in `allowlist`, and no
/// active incident with the same derived `incidentId`. Otherwise REJECT
/// with the first failing condition, checked in that order.
///
/// # Errors
///
/// Returns [`GateError`] only if the deterministic incident id cannot be
/// computed (a separator collision in `service`/`evidence_id`).
pub fn evaluate(
    evidence: &EvidenceBundle,
    candidate_id: &str,
    assessment: &CandidateAssessment,
    allowlist: &[String],
    active_lookup: &dyn ActiveIncidentLookup,
) -> Result<PromotionResult, GateError> {
    let incident_id = compute_incident_id(&evidence.service, &evidence.evidence_id)?;
    let evidence_window = EvidenceWindow {
        start: evidence.window_start,
        end: evidence.window_end,
    };
    let common = PromotionCommon {
        candidate_id: candidate_id.to_string(),
        evidence_id: evidence.evidence_id.clone(),
        confidence_score: assessment.confidence_score,
        confidence_band: assessment.confidence_band,
        evidence_window,
        evaluated_at: evidence.bundled_at,
        gate_version: GATE_VERSION.to_string(),
    };

    if assessment.confidence_band < ConfidenceBand::High || assessment.confidence_score < MIN_CONFIDENCE_SCORE {
        return Ok(common.reject(RejectionCode::ConfidenceTooLow, "confidence score or band below the promotion threshold"));
    }
    if evidence.detections.len() < MIN_DETECTIONS {
        return Ok(common.reject(RejectionCode::InsufficientDetections, "fewer than the minimum required detections"));
    }
    if evidence.unique_rule_count() < MIN_UNIQUE_RULES {
        return Ok(common.reject(RejectionCode::InsufficientDetections, "fewer than the minimum required unique rules"));
    }
    if !allowlist.iter().any(|allowed| allowed == &evidence.service) {
        return Ok(common.reject(RejectionCode::ServiceNotAllowed, "service is not on the promotion allowlist"));
    }
    if active_lookup.has_active_incident(&incident_id) {
        return Ok(common.reject(RejectionCode::ActiveIncidentExists, "a non-terminal incident already exists for this evidence"));
    }

    Ok(common.promote(incident_id))
}

/// Fields shared by both a PROMOTE and a REJECT result, factored out so
/// `evaluate`'s branches don't repeat them.
struct PromotionCommon {
    /// Candidate id under evaluation.
    candidate_id: String,
    /// Evidence id under evaluation.
    evidence_id: String,
    /// Confidence score from the assessment.
    confidence_score: f64,
    /// Confidence band from the assessment.
    confidence_band: ConfidenceBand,
    /// Evidence window carried onto the result.
    evidence_window: EvidenceWindow,
    /// `evidence.bundled_at`, carried onto the result.
    evaluated_at: Timestamp,
    /// Gate version carried onto the result.
    gate_version: String,
}

impl PromotionCommon {
    /// Finishes building a REJECT result.
    fn reject(self, code: RejectionCode, reason: &str) -> PromotionResult {
        PromotionResult {
            decision: Decision::Reject {
                rejection_reason: reason.to_string(),
                rejection_code: code,
            },
            candidate_id: self.candidate_id,
            evidence_id: self.evidence_id,
            confidence_score: self.confidence_score,
            confidence_band: self.confidence_band,
            evidence_window: self.evidence_window,
            evaluated_at: self.evaluated_at,
            gate_version: self.gate_version,
        }
    }

    /// Finishes building a PROMOTE result.
    fn promote(self, incident_id: String) -> PromotionResult {
        PromotionResult {
            decision: Decision::Promote { incident_id },
            candidate_id: self.candidate_id,
            evidence_id: self.evidence_id,
            confidence_score: self.confidence_score,
            confidence_band: self.confidence_band,
            evidence_window: self.evidence_window,
            evaluated_at: self.evaluated_at,
            gate_version: self.gate_version,
        }
    }
}
