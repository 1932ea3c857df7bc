// crates/opx-core/src/idempotency.rs
// ============================================================================
// Module: Idempotency Record
// Description: Permanent record of a manual-trigger request, preventing
// duplicate execution on client retry.
// Purpose: Give the manual automation endpoints exactly-once semantics over
// an at-least-once caller.
// Dependencies: crate::time
// ============================================================================

//! ## Overview
//! An idempotency record is permanent: no TTL, no overwrite. A second `put`
//! with the same key and matching request hash returns the existing record
//! (idempotent success); a second `put` with the same key and a *different*
//! request hash is a conflict the caller must resolve by using a new key.

use serde_json::Value;

use crate::time::Timestamp;

/// Idempotency record lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdempotencyStatus {
    /// The original request is still executing.
    InProgress,
    /// The original request completed; `response` is populated.
    Completed,
}

/// The fingerprint of the fields hashed to detect a conflicting reuse of
/// the same idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RequestFingerprint {
    /// Names of the fields that were hashed.
    pub fields: Vec<String>,
    /// Hash of the canonicalized field values.
    pub hash: String,
}

/// Permanent idempotency record keyed by `idempotencyKey`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IdempotencyRecord {
    /// Caller-supplied key (UUID or 64-hex).
    pub idempotency_key: String,
    /// Hash of the request body, for quick conflict detection.
    pub request_hash: String,
    /// Lifecycle status.
    pub status: IdempotencyStatus,
    /// Principal that made the original request.
    pub principal: String,
    /// When the record was created.
    pub created_at: Timestamp,
    /// When the original request completed.
    pub completed_at: Option<Timestamp>,
    /// Full fingerprint backing `request_hash`.
    pub request_fingerprint: RequestFingerprint,
    /// The incident produced by the original request, if any.
    pub incident_id: Option<String>,
    /// The response to replay for a duplicate request.
    pub response: Option<Value>,
}

/// Why a duplicate `put` for the same key was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdempotencyError {
    /// The same key was reused with a different request hash.
    #[error("idempotency key reused with a different request hash")]
    Conflict,
}

/// Outcome of reconciling a new request against an existing record for the
/// same idempotency key.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// No existing record; the caller should create one and proceed.
    New,
    /// An existing record with a matching hash; replay its response (or,
    /// if still in progress, report that to the caller).
    Existing(IdempotencyRecord),
}

/// Reconciles a new request's hash against an existing record for the same
/// key, if any.
///
/// # Errors
///
/// Returns [`IdempotencyError::Conflict`] if `existing` is present and its
/// `request_hash` differs from `request_hash`.
pub fn reconcile(existing: Option<IdempotencyRecord>, request_hash: &str) -> Result<Reconciliation, IdempotencyError> {
    match existing {
        None => Ok(Reconciliation::New),
        Some(record) if record.request_hash == request_hash => Ok(Reconciliation::Existing(record)),
        Some(_) => Err(IdempotencyError::Conflict),
    }
}

/// Builds the permanent record for a newly admitted request. Starts
/// `IN_PROGRESS`; call [`complete`] once the original request finishes.
#[must_use]
pub fn start(
    idempotency_key: String,
    request_hash: String,
    principal: String,
    request_fingerprint: RequestFingerprint,
    created_at: Timestamp,
) -> IdempotencyRecord {
    IdempotencyRecord {
        idempotency_key,
        request_hash,
        status: IdempotencyStatus::InProgress,
        principal,
        created_at,
        completed_at: None,
        request_fingerprint,
        incident_id: None,
        response: None,
    }
}

/// Marks an `IN_PROGRESS` record `COMPLETED`, attaching the response to
/// replay on a future duplicate request.
#[must_use]
pub fn complete(mut record: IdempotencyRecord, completed_at: Timestamp, incident_id: Option<String>, response: Value) -> IdempotencyRecord {
    record.status = IdempotencyStatus::Completed;
    record.completed_at = Some(completed_at);
    record.incident_id = incident_id;
    record.response = Some(response);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fingerprint() -> RequestFingerprint {
        RequestFingerprint {
            fields: vec!["service".into(), "startDate".into()],
            hash: "hash-a".into(),
        }
    }

    #[test]
    fn no_existing_record_is_new() {
        let result = reconcile(None, "hash-a").expect("reconcile");
        assert_eq!(result, Reconciliation::New);
    }

    #[test]
    fn matching_hash_returns_existing_record() {
        let record = start(
            "key1".into(),
            "hash-a".into(),
            "op:alice".into(),
            fingerprint(),
            Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts"),
        );
        let result = reconcile(Some(record.clone()), "hash-a").expect("reconcile");
        assert_eq!(result, Reconciliation::Existing(record));
    }

    #[test]
    fn mismatched_hash_is_a_conflict() {
        let record = start(
            "key1".into(),
            "hash-a".into(),
            "op:alice".into(),
            fingerprint(),
            Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts"),
        );
        let err = reconcile(Some(record), "hash-b").unwrap_err();
        assert_eq!(err, IdempotencyError::Conflict);
    }

    #[test]
    fn complete_sets_terminal_fields() {
        let record = start(
            "key1".into(),
            "hash-a".into(),
            "op:alice".into(),
            fingerprint(),
            Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts"),
        );
        let done = complete(
            record,
            Timestamp::parse("2026-03-05T00:00:05.000Z").expect("ts"),
            Some("inc1".into()),
            json!({"auditId": "abc"}),
        );
        assert_eq!(done.status, IdempotencyStatus::Completed);
        assert_eq!(done.incident_id.as_deref(), Some("inc1"));
        assert!(done.response.is_some());
    }
}
