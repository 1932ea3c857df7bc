// crates/opx-contract/src/automation.rs
// ============================================================================
// Module: Automation Endpoint DTOs
// Description: Request/response shapes for the six `/automation/*` HTTP
// endpoints.
// Purpose: Give the broker/CLI layers typed bodies instead of raw JSON,
// without depending on opx-automation's engine types.
// Dependencies: opx_core::learning, serde
// ============================================================================

//! ## Overview
//! The three job-trigger endpoints (`extract-patterns`, `calibrate`,
//! `create-snapshot`) share the same response shape: a 202 carrying
//! `{auditId, status:"ACCEPTED"}`, since none of them perform substantive
//! work synchronously. The kill switch endpoints are the only
//! `/automation/*` routes that return `200` and do real work inline.

use opx_core::learning::SnapshotType;
use serde::Deserialize;
use serde::Serialize;

/// Body of `POST /automation/extract-patterns`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractPatternsRequest {
    /// Restrict to one service, or omit for `"ALL"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Window start, RFC 3339.
    pub start_date: String,
    /// Window end, RFC 3339.
    pub end_date: String,
    /// Bypasses the kill switch and rate limit when `true`; requires
    /// `EMERGENCY_OVERRIDE` authority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency: Option<bool>,
}

/// Body of `POST /automation/calibrate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrateRequest {
    /// Window start, RFC 3339.
    pub start_date: String,
    /// Window end, RFC 3339.
    pub end_date: String,
    /// Bypasses the kill switch and rate limit when `true`; requires
    /// `EMERGENCY_OVERRIDE` authority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency: Option<bool>,
}

/// Body of `POST /automation/create-snapshot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshotRequest {
    /// Which rollup cadence this snapshot records.
    pub snapshot_type: SnapshotType,
    /// Window start, RFC 3339.
    pub start_date: String,
    /// Window end, RFC 3339.
    pub end_date: String,
    /// Bypasses the kill switch and rate limit when `true`; requires
    /// `EMERGENCY_OVERRIDE` authority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency: Option<bool>,
}

/// Shared `202 Accepted` response for every job-trigger endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedResponse {
    /// The audit id the async invocation will continue under.
    pub audit_id: String,
    /// Always `"ACCEPTED"`.
    pub status: String,
}

/// Body of `POST /automation/kill-switch/disable`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillSwitchDisableRequest {
    /// Why the switch is being disabled. Must be non-empty.
    pub reason: String,
}

/// Response of `GET /automation/kill-switch/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillSwitchStatusResponse {
    /// `!enabled` — whether the switch is currently blocking invocations.
    pub active: bool,
    /// The raw `enabled` flag backing `active`.
    pub enabled: bool,
    /// When the switch was last disabled, if ever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_at: Option<String>,
    /// Who last disabled the switch, if ever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_by: Option<String>,
    /// The reason given for the last disable, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When the document was last written.
    pub last_modified: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_patterns_request_omits_absent_optionals() {
        let request = ExtractPatternsRequest { service: None, start_date: "2026-03-01T00:00:00.000Z".to_string(), end_date: "2026-03-02T00:00:00.000Z".to_string(), emergency: None };
        let value = serde_json::to_value(&request).expect("serialize");
        assert!(value.get("service").is_none());
        assert!(value.get("emergency").is_none());
        assert_eq!(value.get("startDate").and_then(|v| v.as_str()), Some("2026-03-01T00:00:00.000Z"));
    }

    #[test]
    fn accepted_response_round_trips() {
        let response = AcceptedResponse { audit_id: "audit-1".to_string(), status: "ACCEPTED".to_string() };
        let value = serde_json::to_value(&response).expect("serialize");
        let round_tripped: AcceptedResponse = serde_json::from_value(value).expect("deserialize");
        assert_eq!(round_tripped, response);
    }
}
