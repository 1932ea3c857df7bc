// crates/opx-core/src/incident.rs
// ============================================================================
// Module: Incident Lifecycle State Machine
// Description: Authoritative status transitions with authority, metadata,
// and timestamp rules.
// Purpose: The single place that decides whether an incident transition is
// legal, and what it does to the incident record.
// Dependencies: crate::authority, crate::signal, crate::time
// ============================================================================

//! ## Overview
//! `PENDING -> OPEN -> {MITIGATING, RESOLVED} -> RESOLVED -> CLOSED`, with
//! `MITIGATING -> RESOLVED` also legal. CLOSED is terminal; there is no
//! path back from it and no self-loop is ever legal. Every transition
//! carries a minimum authority and, for some edges, required metadata.
//! Resolution is set exactly once, on entry to RESOLVED, and is immutable
//! thereafter.

use serde::Deserialize;
use serde::Serialize;

use crate::authority::Authority;
use crate::authority::AuthorityType;
use crate::signal::NormalizedSeverity;
use crate::time::Timestamp;

/// Incident lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IncidentStatus {
    /// Created by the promotion gate, awaiting human triage.
    Pending,
    /// Acknowledged and being worked.
    Open,
    /// Actively being mitigated.
    Mitigating,
    /// Resolved; resolution metadata is now fixed.
    Resolved,
    /// Closed; terminal.
    Closed,
}

impl IncidentStatus {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Open => "OPEN",
            Self::Mitigating => "MITIGATING",
            Self::Resolved => "RESOLVED",
            Self::Closed => "CLOSED",
        }
    }

    /// Returns true when this status has no legal outgoing transition.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Resolution classification recorded when an incident enters RESOLVED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionType {
    /// The underlying issue was fixed.
    Fixed,
    /// The incident was a false positive.
    FalsePositive,
    /// The incident duplicates another one.
    Duplicate,
    /// The team decided not to fix the underlying issue.
    WontFix,
}

/// Resolution metadata, set exactly once on entry to RESOLVED and
/// immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Human-readable resolution summary.
    pub summary: String,
    /// Resolution classification.
    #[serde(rename = "type")]
    pub resolution_type: ResolutionType,
    /// Who resolved the incident.
    pub resolved_by: String,
}

/// State-entry timestamps accumulated across the incident's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IncidentTimestamps {
    /// Always `promotion.evaluatedAt`.
    pub created_at: Option<Timestamp>,
    /// Set on entry to OPEN.
    pub opened_at: Option<Timestamp>,
    /// Set on entry to MITIGATING.
    pub mitigating_at: Option<Timestamp>,
    /// Set on entry to RESOLVED.
    pub resolved_at: Option<Timestamp>,
    /// Set on entry to CLOSED.
    pub closed_at: Option<Timestamp>,
    /// Updated on every transition.
    pub last_modified_at: Option<Timestamp>,
}

/// The incident record. The operational store holding this record is the
/// source of truth; the event log (see [`IncidentEvent`]) is secondary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    /// Deterministic `digest(service | evidenceId)` incident id.
    pub incident_id: String,
    /// Service the incident pertains to.
    pub service: String,
    /// Max of the originating evidence's detection severities.
    pub severity: NormalizedSeverity,
    /// Current lifecycle status.
    pub status: IncidentStatus,
    /// The evidence bundle that produced this incident.
    pub evidence_id: String,
    /// The candidate assessment that produced this incident.
    pub candidate_id: String,
    /// Confidence score at promotion time.
    pub confidence_score: f64,
    /// Lifecycle timestamps.
    pub timestamps: IncidentTimestamps,
    /// Resolution metadata, present from RESOLVED onward.
    pub resolution: Option<Resolution>,
    /// Human-facing title.
    pub title: String,
    /// Human-facing description.
    pub description: String,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Who created the incident (the promotion gate's system authority).
    pub created_by: Authority,
    /// Who last modified the incident.
    pub last_modified_by: Authority,
    /// Monotonic version, incremented on every transition; used for
    /// optimistic-concurrency `CONFLICT` detection (§5).
    pub incident_version: u64,
    /// Blast-radius scope, opaque beyond spec.md's naming.
    pub blast_radius_scope: Option<String>,
    /// Detection count on the originating evidence.
    pub detection_count: u32,
    /// Evidence graph count (count of distinct evidence contributing,
    /// always `1` for a single-evidence incident).
    pub evidence_graph_count: u32,
}

/// Append-only incident lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentEvent {
    /// Event identifier.
    pub event_id: String,
    /// The incident this event belongs to.
    pub incident_id: String,
    /// Event kind.
    pub event_type: IncidentEventType,
    /// When the event was recorded.
    pub created_at: Timestamp,
    /// Event-specific payload.
    pub payload: serde_json::Value,
}

/// Incident event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentEventType {
    /// The incident was created by the promotion gate.
    IncidentCreated,
    /// The incident transitioned between states.
    StateTransitioned,
}

/// Why a requested transition was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The `from -> to` edge does not exist in the transition table.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Origin status.
        from: IncidentStatus,
        /// Requested destination status.
        to: IncidentStatus,
    },
    /// The caller's authority does not meet the edge's minimum.
    #[error("authority {actual} does not satisfy required authority {required}")]
    InsufficientAuthority {
        /// The caller's actual authority.
        actual: AuthorityType,
        /// The edge's minimum required authority.
        required: AuthorityType,
    },
    /// Required metadata (e.g. `reason`, resolution block) was not supplied.
    #[error("missing required metadata: {0}")]
    MissingMetadata(&'static str),
    /// The incident record changed between read and write (stale-state
    /// write); the caller must re-read and retry.
    #[error("incident version conflict: expected {expected}, found {found}")]
    Conflict {
        /// The version the caller expected to update.
        expected: u64,
        /// The version actually stored.
        found: u64,
    },
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for a requested state transition.
pub struct TransitionRequest<'a> {
    /// Requested destination status.
    pub to: IncidentStatus,
    /// The caller's authority.
    pub authority: &'a Authority,
    /// `reason` metadata, required on some edges.
    pub reason: Option<&'a str>,
    /// `justification` metadata, required when `authority` is
    /// `EMERGENCY_OVERRIDE`. Distinct from `reason`: a reason explains the
    /// transition itself, a justification explains why normal authority
    /// was bypassed to make it.
    pub justification: Option<&'a str>,
    /// Resolution metadata, required entering RESOLVED, carried through to
    /// CLOSED unchanged.
    pub resolution: Option<Resolution>,
    /// Wall-clock time of the transition.
    pub now: Timestamp,
    /// The version the caller last observed (optimistic concurrency).
    pub expected_version: u64,
}

/// Returns the minimum authority required for the `from -> to` edge, or
/// `None` if the edge does not exist in the transition table.
#[must_use]
pub fn required_authority(from: IncidentStatus, to: IncidentStatus) -> Option<AuthorityType> {
    use IncidentStatus::{Closed, Mitigating, Open, Pending, Resolved};
    match (from, to) {
        (Pending, Open) => Some(AuthorityType::HumanOperator),
        (Open, Mitigating) => Some(AuthorityType::HumanOperator),
        (Open, Resolved) | (Mitigating, Resolved) => Some(AuthorityType::OnCallSre),
        (Resolved, Closed) => Some(AuthorityType::HumanOperator),
        _ => None,
    }
}

/// Applies a requested transition to `incident`, returning the updated
/// incident on success. `incident` is left unchanged on any error.
///
/// # Errors
///
/// Returns [`TransitionError::Conflict`] if `expected_version` does not
/// match `incident.incident_version`; [`TransitionError::InvalidTransition`]
/// if the edge does not exist; [`TransitionError::InsufficientAuthority`]
/// if the caller's authority is too low;
/// [`TransitionError::MissingMetadata`] if a required field is absent.
pub fn transition(incident: &Incident, request: TransitionRequest<'_>) -> Result<Incident, TransitionError> {
    if request.expected_version != incident.incident_version {
        return Err(TransitionError::Conflict {
            expected: request.expected_version,
            found: incident.incident_version,
        });
    }

    let from = incident.status;
    let to = request.to;
    if from == to || from.is_terminal() {
        return Err(TransitionError::InvalidTransition { from, to });
    }
    let Some(required) = required_authority(from, to) else {
        return Err(TransitionError::InvalidTransition { from, to });
    };
    if !request.authority.satisfies(required) {
        return Err(TransitionError::InsufficientAuthority {
            actual: request.authority.authority_type,
            required,
        });
    }
    if request.authority.is_emergency_override() {
        validate_emergency_justification(request.justification)?;
    }

    let entering_resolution_state = matches!(to, IncidentStatus::Resolved);
    if entering_resolution_state {
        if request.reason.is_none() {
            return Err(TransitionError::MissingMetadata("reason"));
        }
        if request.resolution.is_none() {
            return Err(TransitionError::MissingMetadata("resolution"));
        }
    }
    if matches!(to, IncidentStatus::Closed) && incident.resolution.is_none() {
        return Err(TransitionError::MissingMetadata("resolution"));
    }

    let mut next = incident.clone();
    next.status = to;
    next.last_modified_by = request.authority.clone();
    next.incident_version += 1;
    next.timestamps.last_modified_at = Some(request.now);
    match to {
        IncidentStatus::Open => next.timestamps.opened_at = Some(request.now),
        IncidentStatus::Mitigating => next.timestamps.mitigating_at = Some(request.now),
        IncidentStatus::Resolved => {
            next.timestamps.resolved_at = Some(request.now);
            if next.resolution.is_none() {
                next.resolution = request.resolution;
            }
        }
        IncidentStatus::Closed => next.timestamps.closed_at = Some(request.now),
        IncidentStatus::Pending => {}
    }
    Ok(next)
}

/// `EMERGENCY_OVERRIDE` requests must carry a `justification` of 20-2048
/// characters, validated syntactically at the edge. The FSM enforces the
/// same bound server-side so a caller cannot bypass edge validation.
fn validate_emergency_justification(justification: Option<&str>) -> Result<(), TransitionError> {
    let Some(text) = justification else {
        return Err(TransitionError::MissingMetadata("justification"));
    };
    if !(20..=2048).contains(&text.len()) {
        return Err(TransitionError::MissingMetadata("justification"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_incident() -> Incident {
        Incident {
            incident_id: "inc1".into(),
            service: "checkout".into(),
            severity: NormalizedSeverity::High,
            status: IncidentStatus::Pending,
            evidence_id: "evid1".into(),
            candidate_id: "cand1".into(),
            confidence_score: 0.7,
            timestamps: IncidentTimestamps {
                created_at: Some(Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts")),
                ..Default::default()
            },
            resolution: None,
            title: "Checkout latency breach".into(),
            description: "Elevated p99 latency".into(),
            tags: vec![],
            created_by: Authority::system(),
            last_modified_by: Authority::system(),
            incident_version: 0,
            blast_radius_scope: None,
            detection_count: 3,
            evidence_graph_count: 1,
        }
    }

    fn operator() -> Authority {
        Authority::new(AuthorityType::HumanOperator, "op:alice")
    }

    fn sre() -> Authority {
        Authority::new(AuthorityType::OnCallSre, "sre:bob")
    }

    fn resolution() -> Resolution {
        Resolution {
            summary: "fixed the regression".into(),
            resolution_type: ResolutionType::Fixed,
            resolved_by: "sre:bob".into(),
        }
    }

    #[test]
    fn pending_to_open_requires_human_operator() {
        let incident = base_incident();
        let auth = Authority::system();
        let err = transition(
            &incident,
            TransitionRequest {
                to: IncidentStatus::Open,
                authority: &auth,
                reason: None,
                justification: None,
                resolution: None,
                now: Timestamp::parse("2026-03-05T00:05:00.000Z").expect("ts"),
                expected_version: 0,
            },
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::InsufficientAuthority { .. }));
    }

    #[test]
    fn pending_to_open_succeeds_with_human_operator() {
        let incident = base_incident();
        let auth = operator();
        let next = transition(
            &incident,
            TransitionRequest {
                to: IncidentStatus::Open,
                authority: &auth,
                reason: None,
                justification: None,
                resolution: None,
                now: Timestamp::parse("2026-03-05T00:05:00.000Z").expect("ts"),
                expected_version: 0,
            },
        )
        .expect("transition");
        assert_eq!(next.status, IncidentStatus::Open);
        assert_eq!(next.incident_version, 1);
        assert!(next.timestamps.opened_at.is_some());
    }

    #[test]
    fn pending_to_closed_is_forbidden() {
        let incident = base_incident();
        let auth = operator();
        let err = transition(
            &incident,
            TransitionRequest {
                to: IncidentStatus::Closed,
                authority: &auth,
                reason: None,
                justification: None,
                resolution: None,
                now: Timestamp::parse("2026-03-05T00:05:00.000Z").expect("ts"),
                expected_version: 0,
            },
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn closed_has_no_outgoing_edge() {
        let mut incident = base_incident();
        incident.status = IncidentStatus::Closed;
        incident.resolution = Some(resolution());
        let auth = Authority::new(AuthorityType::EmergencyOverride, "oncall:zoe");
        let err = transition(
            &incident,
            TransitionRequest {
                to: IncidentStatus::Open,
                authority: &auth,
                reason: None,
                justification: Some(&"x".repeat(20)),
                resolution: None,
                now: Timestamp::parse("2026-03-05T00:05:00.000Z").expect("ts"),
                expected_version: 0,
            },
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn resolve_requires_reason_and_resolution_block() {
        let mut incident = base_incident();
        incident.status = IncidentStatus::Open;
        let auth = sre();
        let err = transition(
            &incident,
            TransitionRequest {
                to: IncidentStatus::Resolved,
                authority: &auth,
                reason: None,
                justification: None,
                resolution: None,
                now: Timestamp::parse("2026-03-05T00:05:00.000Z").expect("ts"),
                expected_version: 0,
            },
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::MissingMetadata("reason")));
    }

    #[test]
    fn resolution_is_set_exactly_once_and_immutable() {
        let mut incident = base_incident();
        incident.status = IncidentStatus::Open;
        let auth = sre();
        let resolved = transition(
            &incident,
            TransitionRequest {
                to: IncidentStatus::Resolved,
                authority: &auth,
                reason: Some("fixed"),
                justification: None,
                resolution: Some(resolution()),
                now: Timestamp::parse("2026-03-05T00:05:00.000Z").expect("ts"),
                expected_version: 0,
            },
        )
        .expect("transition");
        assert_eq!(resolved.resolution, Some(resolution()));

        // CLOSED does not require a reason/resolution block again, and
        // must not let anyone replace the resolution.
        let closer = operator();
        let closed = transition(
            &resolved,
            TransitionRequest {
                to: IncidentStatus::Closed,
                authority: &closer,
                reason: None,
                justification: None,
                resolution: None,
                now: Timestamp::parse("2026-03-05T00:10:00.000Z").expect("ts"),
                expected_version: 1,
            },
        )
        .expect("transition");
        assert_eq!(closed.resolution, Some(resolution()));
    }

    #[test]
    fn stale_version_conflicts() {
        let incident = base_incident();
        let auth = operator();
        let err = transition(
            &incident,
            TransitionRequest {
                to: IncidentStatus::Open,
                authority: &auth,
                reason: None,
                justification: None,
                resolution: None,
                now: Timestamp::parse("2026-03-05T00:05:00.000Z").expect("ts"),
                expected_version: 5,
            },
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::Conflict { expected: 5, found: 0 }));
    }

    #[test]
    fn emergency_override_requires_justification_length() {
        let incident = base_incident();
        let auth = Authority::new(AuthorityType::EmergencyOverride, "oncall:zoe");
        let err = transition(
            &incident,
            TransitionRequest {
                to: IncidentStatus::Open,
                authority: &auth,
                reason: None,
                justification: Some("too short"),
                resolution: None,
                now: Timestamp::parse("2026-03-05T00:05:00.000Z").expect("ts"),
                expected_version: 0,
            },
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::MissingMetadata("justification")));
    }

    #[test]
    fn self_loop_is_forbidden() {
        let incident = base_incident();
        let auth = operator();
        let err = transition(
            &incident,
            TransitionRequest {
                to: IncidentStatus::Pending,
                authority: &auth,
                reason: None,
                justification: None,
                resolution: None,
                now: Timestamp::parse("2026-03-05T00:05:00.000Z").expect("ts"),
                expected_version: 0,
            },
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition { .. }));
    }
}
