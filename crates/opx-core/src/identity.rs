// crates/opx-core/src/identity.rs
// ============================================================================
// Module: Deterministic Identity
// Description: Content-addressed identifiers via SHA-256 over a fixed field order.
// Purpose: Give every entity kind (signal, evidence, candidate, incident,
// decision, outcome, summary, calibration, snapshot, audit) a deterministic id.
// Dependencies: serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Every content-addressed id in opx is computed by joining a fixed, ordered
//! set of fields with a reserved separator and hashing the result with
//! SHA-256. The separator is part of the identity contract: it must never
//! appear inside a joined field, or two logically distinct inputs could
//! collide on the same id.
//!
//! Each entity kind gets a dedicated `compute_*_id` function so the field
//! order and separator are fixed at the call site rather than threaded
//! through by callers.

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

/// Separator joining parts for most identifiers.
pub const SEP_COLON: &str = ":";

/// Separator joining parts for incident identity (evidence-derived only).
pub const SEP_PIPE: &str = "|";

/// A 64-character lowercase hex content digest.
pub type Id = String;

/// Errors raised while computing a deterministic identifier.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// A part contained the reserved separator, which would make the joined
    /// string ambiguous between two different field splits.
    #[error("identity part contains reserved separator {separator:?}: {part:?}")]
    SeparatorInPart {
        /// The offending separator.
        separator: &'static str,
        /// The offending part.
        part: String,
    },
    /// Canonicalizing a metadata value for hashing failed.
    #[error("failed to canonicalize metadata for hashing: {0}")]
    Canonicalization(String),
}

/// Hashes a sequence of string parts joined by `separator` and returns the
/// lowercase hex digest.
///
/// # Errors
///
/// Returns [`IdentityError::SeparatorInPart`] if any part contains the
/// separator.
pub fn digest_parts(separator: &'static str, parts: &[&str]) -> Result<Id, IdentityError> {
    for part in parts {
        if part.contains(separator) {
            return Err(IdentityError::SeparatorInPart {
                separator,
                part: (*part).to_string(),
            });
        }
    }
    let joined = parts.join(separator);
    Ok(hex_encode(&sha256(joined.as_bytes())))
}

/// Returns the RFC 8785 canonical JSON encoding of a serializable value.
///
/// # Errors
///
/// Returns [`IdentityError::Canonicalization`] when serialization fails.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, IdentityError> {
    let bytes = serde_jcs::to_vec(value).map_err(|err| IdentityError::Canonicalization(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| IdentityError::Canonicalization(err.to_string()))
}

/// Computes the raw SHA-256 digest of `bytes`.
fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Encodes `bytes` as lowercase hex.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

/// Computes `signalId = digest(source | signalType | service | severity |
/// identityWindow | canonical(metadata))`, joined with [`SEP_COLON`].
///
/// # Errors
///
/// Returns [`IdentityError`] if a field contains the separator or metadata
/// cannot be canonicalized.
pub fn compute_signal_id<M: Serialize + ?Sized>(
    source: &str,
    signal_type: &str,
    service: &str,
    severity: &str,
    identity_window: &str,
    metadata: &M,
) -> Result<Id, IdentityError> {
    let canonical_metadata = canonical_json(metadata)?;
    digest_parts(
        SEP_COLON,
        &[source, signal_type, service, severity, identity_window, &canonical_metadata],
    )
}

/// Computes `evidenceId = digest(service | windowStart | windowEnd |
/// sorted(detectionIds))`.
///
/// # Errors
///
/// Returns [`IdentityError`] if a field contains the separator.
pub fn compute_evidence_id(
    service: &str,
    window_start: &str,
    window_end: &str,
    detection_ids: &[String],
) -> Result<Id, IdentityError> {
    let mut sorted = detection_ids.to_vec();
    sorted.sort();
    let joined_detections = sorted.join(",");
    digest_parts(SEP_COLON, &[service, window_start, window_end, &joined_detections])
}

/// Computes `candidateId = digest(evidenceId | modelVersion)`.
///
/// # Errors
///
/// Returns [`IdentityError`] if a field contains the separator.
pub fn compute_candidate_id(evidence_id: &str, model_version: &str) -> Result<Id, IdentityError> {
    digest_parts(SEP_COLON, &[evidence_id, model_version])
}

/// Computes `incidentId = digest(service | evidenceId)`, evidence-derived
/// only, never time-based. Uses [`SEP_PIPE`] per the identity contract.
///
/// # Errors
///
/// Returns [`IdentityError`] if a field contains the separator.
pub fn compute_incident_id(service: &str, evidence_id: &str) -> Result<Id, IdentityError> {
    digest_parts(SEP_PIPE, &[service, evidence_id])
}

/// Computes `outcomeId = digest(incidentId | closedAt)`.
///
/// # Errors
///
/// Returns [`IdentityError`] if a field contains the separator.
pub fn compute_outcome_id(incident_id: &str, closed_at: &str) -> Result<Id, IdentityError> {
    digest_parts(SEP_COLON, &[incident_id, closed_at])
}

/// Computes `summaryId = digest(service-or-ALL | startDate | endDate |
/// version)`.
///
/// # Errors
///
/// Returns [`IdentityError`] if a field contains the separator.
pub fn compute_summary_id(
    service_or_all: &str,
    start_date: &str,
    end_date: &str,
    version: &str,
) -> Result<Id, IdentityError> {
    digest_parts(SEP_COLON, &[service_or_all, start_date, end_date, version])
}

/// Computes `calibrationId = digest(startDate | endDate | version)`.
///
/// # Errors
///
/// Returns [`IdentityError`] if a field contains the separator.
pub fn compute_calibration_id(
    start_date: &str,
    end_date: &str,
    version: &str,
) -> Result<Id, IdentityError> {
    digest_parts(SEP_COLON, &[start_date, end_date, version])
}

/// Computes `snapshotId = digest(snapshotType | startDate | endDate |
/// version)`.
///
/// # Errors
///
/// Returns [`IdentityError`] if a field contains the separator.
pub fn compute_snapshot_id(
    snapshot_type: &str,
    start_date: &str,
    end_date: &str,
    version: &str,
) -> Result<Id, IdentityError> {
    digest_parts(SEP_COLON, &[snapshot_type, start_date, end_date, version])
}

/// Computes `auditId = digest(operationType | startTime | version)`.
///
/// # Errors
///
/// Returns [`IdentityError`] if a field contains the separator.
pub fn compute_audit_id(
    operation_type: &str,
    start_time: &str,
    version: &str,
) -> Result<Id, IdentityError> {
    digest_parts(SEP_COLON, &[operation_type, start_time, version])
}
