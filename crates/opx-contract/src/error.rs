// crates/opx-contract/src/error.rs
// ============================================================================
// Module: API Error Taxonomy
// Description: The status-code/error-code pairs the HTTP surface returns,
// plus the wire body every error response carries.
// Purpose: Give every caller-facing failure one stable `{error, message,
// details?}` shape, independent of any specific web framework.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! [`ApiError`] enumerates every failure the HTTP surface can return, each
//! carrying the status code and error code spec.md's interface table names.
//! State never "suggests" a fix: `Display` text states the problem and the
//! violated rule, nothing more.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// Every failure the HTTP surface can return, carrying its own status code
/// and stable error code.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// Malformed or out-of-range request body.
    #[error("validation failed: {0}")]
    Validation(String),
    /// `{id}` path segment is not a well-formed incident id.
    #[error("invalid incident id: {0}")]
    InvalidIncidentId(String),
    /// The authority supplied does not parse or does not exist.
    #[error("invalid authority: {0}")]
    InvalidAuthority(String),
    /// The requested status transition does not exist in the FSM.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },
    /// No principal could be derived from the request context.
    #[error("unauthorized")]
    Unauthorized,
    /// The caller's authority does not satisfy the edge's required level.
    #[error("insufficient authority: {0}")]
    InsufficientAuthority(String),
    /// The transition requires human approval that was not supplied.
    #[error("approval required: {0}")]
    ApprovalRequired(String),
    /// No record exists at the requested id.
    #[error("not found: {0}")]
    NotFound(String),
    /// The request conflicts with the record's current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// An idempotency key was reused with a different request body.
    #[error("idempotency conflict: {0}")]
    IdempotencyConflict(String),
    /// The caller exceeded its rate limit.
    #[error("rate limit exceeded: {current_count}/{limit} in the current window")]
    RateLimitExceeded {
        /// Invocations already recorded in the window.
        current_count: u32,
        /// The cap in effect.
        limit: u32,
        /// Milliseconds until the caller may retry.
        retry_after_ms: u64,
    },
    /// The kill switch is active and the caller lacks `EMERGENCY_OVERRIDE`.
    #[error("automation kill switch is active")]
    KillSwitchActive,
    /// An unexpected internal fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// The HTTP status code this error maps to.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::InvalidIncidentId(_) | Self::InvalidAuthority(_) | Self::InvalidTransition { .. } => 400,
            Self::Unauthorized => 401,
            Self::InsufficientAuthority(_) | Self::ApprovalRequired(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) | Self::IdempotencyConflict(_) => 409,
            Self::RateLimitExceeded { .. } => 429,
            Self::KillSwitchActive => 503,
            Self::Internal(_) => 500,
        }
    }

    /// The stable error code carried in the response body's `error` field.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidIncidentId(_) => "INVALID_INCIDENT_ID",
            Self::InvalidAuthority(_) => "INVALID_AUTHORITY",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InsufficientAuthority(_) => "INSUFFICIENT_AUTHORITY",
            Self::ApprovalRequired(_) => "APPROVAL_REQUIRED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::IdempotencyConflict(_) => "IDEMPOTENCY_CONFLICT",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::KillSwitchActive => "KILL_SWITCH_ACTIVE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Builds the wire body for this error, with no `details` payload.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody { error: self.code().to_string(), message: self.to_string(), details: None }
    }

    /// Builds the wire body for this error, attaching `details`.
    #[must_use]
    pub fn to_body_with_details(&self, details: Value) -> ErrorBody {
        ErrorBody { error: self.code().to_string(), message: self.to_string(), details: Some(details) }
    }

    /// The `429` rate-limit headers this error carries, or `None` for every
    /// other variant.
    #[must_use]
    pub fn rate_limit_headers(&self) -> Option<RateLimitHeaders> {
        match self {
            Self::RateLimitExceeded { current_count, limit, retry_after_ms } => {
                Some(RateLimitHeaders { retry_after_ms: *retry_after_ms, limit: *limit, remaining: limit.saturating_sub(*current_count) })
            }
            _ => None,
        }
    }
}

/// The wire body every error response carries: `{error, message, details?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error code, e.g. `"VALIDATION_ERROR"`.
    pub error: String,
    /// Human-readable message; states the problem and the violated rule,
    /// never a suggested fix.
    pub message: String,
    /// Optional structured detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// The `Retry-After` / `X-RateLimit-*` headers a `429` response carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// Milliseconds until the caller may retry.
    pub retry_after_ms: u64,
    /// The cap in effect for the window.
    pub limit: u32,
    /// Requests remaining in the current window.
    pub remaining: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_the_interface_table() {
        assert_eq!(ApiError::Validation("bad".to_string()).status_code(), 400);
        assert_eq!(ApiError::Unauthorized.status_code(), 401);
        assert_eq!(ApiError::InsufficientAuthority("need ON_CALL_SRE".to_string()).status_code(), 403);
        assert_eq!(ApiError::NotFound("incident".to_string()).status_code(), 404);
        assert_eq!(ApiError::IdempotencyConflict("key reused".to_string()).status_code(), 409);
        assert_eq!(ApiError::RateLimitExceeded { current_count: 5, limit: 5, retry_after_ms: 1_000 }.status_code(), 429);
        assert_eq!(ApiError::KillSwitchActive.status_code(), 503);
        assert_eq!(ApiError::Internal("boom".to_string()).status_code(), 500);
    }

    #[test]
    fn error_body_omits_details_when_absent() {
        let body = ApiError::Unauthorized.to_body();
        assert_eq!(body.error, "UNAUTHORIZED");
        assert!(body.details.is_none());
        let serialized = serde_json::to_value(&body).expect("serialize");
        assert!(serialized.get("details").is_none());
    }

    #[test]
    fn rate_limit_headers_compute_remaining() {
        let error = ApiError::RateLimitExceeded { current_count: 5, limit: 5, retry_after_ms: 1_234 };
        let headers = error.rate_limit_headers().expect("headers");
        assert_eq!(headers.remaining, 0);
        assert_eq!(headers.retry_after_ms, 1_234);
    }
}
