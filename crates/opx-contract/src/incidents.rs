// crates/opx-contract/src/incidents.rs
// ============================================================================
// Module: Incident Endpoint DTOs
// Description: Request/response shapes for the incident CRUD endpoints.
// Purpose: Wrap opx_core::incident's FSM types in the wire shapes the
// `POST /incidents/{id}/{edge}` and `GET /incidents` routes expose.
// Dependencies: opx_core::incident, serde
// ============================================================================

//! ## Overview
//! Incident CRUD is "not the core focus" of the automation surface, so
//! these DTOs are thin: [`TransitionRequestBody`] carries exactly the
//! fields [`opx_core::incident::TransitionRequest`] needs modulo `to`
//! (implied by which of `open`/`mitigate`/`resolve`/`close` was called) and
//! `authority` (derived from the caller's request context, not the body).
//! `GET /incidents` reuses [`opx_core::incident::Incident`] directly as its
//! list item, since it already derives `Serialize`/`Deserialize`.

use opx_core::incident::Incident;
use opx_core::incident::IncidentStatus;
use opx_core::incident::Resolution;
use serde::Deserialize;
use serde::Serialize;

/// Default `GET /incidents` page size when `limit` is omitted.
pub const DEFAULT_INCIDENT_LIST_LIMIT: usize = 20;

/// The hard cap on `GET /incidents`' `limit`, regardless of what the
/// caller requests.
pub const MAX_INCIDENT_LIST_LIMIT: usize = 100;

/// Body of `POST /incidents/{id}/{open|mitigate|resolve|close}`.
///
/// # Invariants
/// - `justification` is required and must be 20-2048 characters when the
///   caller's authority is `EMERGENCY_OVERRIDE`; checked at the edge for
///   fast feedback, and enforced again by
///   `opx_core::incident::transition` itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequestBody {
    /// Required entering `RESOLVED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Required entering `RESOLVED`; carried through to `CLOSED` unchanged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    /// Required when the caller's authority is `EMERGENCY_OVERRIDE`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
    /// The version the caller last observed; gates the update against
    /// concurrent transitions.
    pub expected_version: u64,
}

/// Query parameters accepted by `GET /incidents`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentListQuery {
    /// Restrict to this status, if set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IncidentStatus>,
    /// Restrict to this service, if set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Maximum records returned; the server clamps this to
    /// [`MAX_INCIDENT_LIST_LIMIT`] regardless of the value requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl IncidentListQuery {
    /// Resolves `limit` to an effective page size: the caller's value if
    /// present and at most [`MAX_INCIDENT_LIST_LIMIT`], [`DEFAULT_INCIDENT_LIST_LIMIT`]
    /// otherwise.
    #[must_use]
    pub fn effective_limit(&self) -> usize {
        self.limit.map_or(DEFAULT_INCIDENT_LIST_LIMIT, |limit| limit.min(MAX_INCIDENT_LIST_LIMIT))
    }
}

/// Response of `GET /incidents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentListResponse {
    /// Matching incidents, newest first.
    pub incidents: Vec<Incident>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_limit_clamps_to_the_maximum() {
        let query = IncidentListQuery { status: None, service: None, limit: Some(500) };
        assert_eq!(query.effective_limit(), MAX_INCIDENT_LIST_LIMIT);
    }

    #[test]
    fn effective_limit_defaults_when_absent() {
        let query = IncidentListQuery::default();
        assert_eq!(query.effective_limit(), DEFAULT_INCIDENT_LIST_LIMIT);
    }

    #[test]
    fn transition_request_body_omits_absent_optionals() {
        let body = TransitionRequestBody { reason: None, resolution: None, justification: None, expected_version: 3 };
        let value = serde_json::to_value(&body).expect("serialize");
        assert!(value.get("reason").is_none());
        assert!(value.get("resolution").is_none());
        assert!(value.get("justification").is_none());
        assert_eq!(value.get("expectedVersion").and_then(serde_json::Value::as_u64), Some(3));
    }
}
