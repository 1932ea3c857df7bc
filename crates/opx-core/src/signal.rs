// crates/opx-core/src/signal.rs
// ============================================================================
// Module: Signal Normalization
// Description: Vendor alarm envelope -> Signal, total function with no
// defaults.
// Purpose: Produce deterministic, content-addressed signals or drop the
// event entirely; signal ingestion from vendor-specific envelopes beyond
// this canonical-name contract is out of scope.
// Dependencies: crate::identity, crate::time
// ============================================================================

//! ## Overview
//! The normalizer is a total function from a vendor event to `Option<Signal>`
//! with no defaults: if the service cannot be parsed from the canonical name
//! pattern, if severity cannot be parsed from the same name, or if state is
//! not `"firing"`, the caller gets `None` and must drop the event and count a
//! validation metric (see `opx_automation::metrics`).

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::identity::IdentityError;
use crate::identity::compute_signal_id;
use crate::time::Timestamp;

/// Origin of a raw observability signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// A vendor alarm.
    Alarm,
    /// A metric breach.
    Metric,
    /// A log-based signal.
    Log,
    /// A custom integration signal.
    Custom,
    /// A generic event.
    Event,
}

impl SignalSource {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alarm => "alarm",
            Self::Metric => "metric",
            Self::Log => "log",
            Self::Custom => "custom",
            Self::Event => "event",
        }
    }
}

/// Vendor severity as carried on the raw alarm (`SEV1` is most severe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VendorSeverity {
    /// Severity 1 (most severe).
    Sev1,
    /// Severity 2.
    Sev2,
    /// Severity 3.
    Sev3,
    /// Severity 4 (least severe).
    Sev4,
}

impl VendorSeverity {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sev1 => "SEV1",
            Self::Sev2 => "SEV2",
            Self::Sev3 => "SEV3",
            Self::Sev4 => "SEV4",
        }
    }

    /// Parses a vendor severity token (case-sensitive, e.g. `"SEV1"`).
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "SEV1" => Some(Self::Sev1),
            "SEV2" => Some(Self::Sev2),
            "SEV3" => Some(Self::Sev3),
            "SEV4" => Some(Self::Sev4),
            _ => None,
        }
    }

    /// Maps vendor severity to the normalized severity band.
    #[must_use]
    pub const fn normalize(self) -> NormalizedSeverity {
        match self {
            Self::Sev1 => NormalizedSeverity::Critical,
            Self::Sev2 => NormalizedSeverity::High,
            Self::Sev3 => NormalizedSeverity::Medium,
            Self::Sev4 => NormalizedSeverity::Low,
        }
    }
}

/// Normalized severity band shared by signals and incidents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NormalizedSeverity {
    /// Informational, lowest severity.
    Info,
    /// Low severity.
    Low,
    /// Medium severity.
    Medium,
    /// High severity.
    High,
    /// Critical, highest severity.
    Critical,
}

impl NormalizedSeverity {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Info => "INFO",
        }
    }
}

/// One vendor observation: created once by the normalizer, never mutated.
/// Duplicates collapse by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Deterministic content-addressed signal identifier.
    pub signal_id: String,
    /// Signal origin.
    pub source: SignalSource,
    /// Vendor-specific signal type (e.g. `"latency-breach"`).
    pub signal_type: String,
    /// Service the signal pertains to.
    pub service: String,
    /// Raw vendor severity.
    pub severity: VendorSeverity,
    /// Normalized severity band.
    pub normalized_severity: NormalizedSeverity,
    /// When the vendor observed the condition.
    pub observed_at: Timestamp,
    /// `observedAt` rounded down to the fixed minute grid.
    pub identity_window: String,
    /// Opaque vendor metadata, canonicalized for hashing but otherwise
    /// uninterpreted.
    pub metadata: Value,
    /// When opx ingested the signal.
    pub ingested_at: Timestamp,
}

/// Minimal vendor alarm envelope accepted by the normalizer. Real vendor
/// envelope parsing (the out-of-scope external collaborator) is expected to
/// translate whatever wire format a vendor uses into this shape before
/// calling [`normalize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorAlarmEvent {
    /// Canonical alarm name, `"{service}/{SEVn}/{signal_type}"`.
    pub name: String,
    /// Vendor alarm state; only `"firing"` normalizes to a signal.
    pub state: String,
    /// When the vendor observed the condition.
    pub observed_at: Timestamp,
    /// When opx received the event.
    pub ingested_at: Timestamp,
    /// Opaque vendor metadata.
    pub metadata: Value,
}

/// Errors surfaced by the normalizer's id computation step. A parse/state
/// failure is represented by `None`, not an error, per the "no defaults"
/// contract; `NormalizeError` only covers identity computation failures on
/// an otherwise well-formed event.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// Computing the deterministic signal id failed.
    #[error("failed to compute signal id: {0}")]
    Identity(#[from] IdentityError),
}

/// Normalizes a vendor alarm event into a [`Signal`], or `None` if the event
/// is not parseable or not in the `firing` state.
///
/// This is a total function with no defaults: service/severity must parse
/// from the canonical `"{service}/{SEVn}/{signal_type}"` name pattern and
/// `state` must equal `"firing"`, or the event is dropped.
///
/// # Errors
///
/// Returns [`NormalizeError`] only when the event parses but the
/// deterministic id cannot be computed (a separator collision).
pub fn normalize(event: &VendorAlarmEvent) -> Result<Option<Signal>, NormalizeError> {
    if event.state != "firing" {
        return Ok(None);
    }
    let Some((service, severity, signal_type)) = parse_canonical_name(&event.name) else {
        return Ok(None);
    };
    let identity_window = event.observed_at.identity_window();
    let signal_id = compute_signal_id(
        SignalSource::Alarm.as_str(),
        &signal_type,
        &service,
        severity.as_str(),
        &identity_window,
        &event.metadata,
    )?;
    Ok(Some(Signal {
        signal_id,
        source: SignalSource::Alarm,
        signal_type,
        service,
        severity,
        normalized_severity: severity.normalize(),
        observed_at: event.observed_at,
        identity_window,
        metadata: event.metadata.clone(),
        ingested_at: event.ingested_at,
    }))
}

/// Parses the canonical `"{service}/{SEVn}/{signal_type}"` alarm name
/// pattern. Returns `None` if the name does not have exactly three `/`
/// separated segments or the severity segment does not parse.
fn parse_canonical_name(name: &str) -> Option<(String, VendorSeverity, String)> {
    let mut segments = name.splitn(3, '/');
    let service = segments.next()?;
    let severity_token = segments.next()?;
    let signal_type = segments.next()?;
    if service.is_empty() || signal_type.is_empty() {
        return None;
    }
    let severity = VendorSeverity::parse(severity_token)?;
    Some((service.to_string(), severity, signal_type.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(name: &str, state: &str) -> VendorAlarmEvent {
        VendorAlarmEvent {
            name: name.to_string(),
            state: state.to_string(),
            observed_at: Timestamp::parse("2026-03-05T14:07:00.000Z").expect("ts"),
            ingested_at: Timestamp::parse("2026-03-05T14:07:05.000Z").expect("ts"),
            metadata: json!({"rule": "latency-p99"}),
        }
    }

    #[test]
    fn firing_event_with_valid_name_normalizes() {
        let signal = normalize(&event("checkout/SEV1/latency-breach", "firing"))
            .expect("normalize")
            .expect("signal");
        assert_eq!(signal.service, "checkout");
        assert_eq!(signal.normalized_severity, NormalizedSeverity::Critical);
        assert_eq!(signal.identity_window, "2026-03-05T14:07Z");
    }

    #[test]
    fn non_firing_state_is_dropped() {
        let result = normalize(&event("checkout/SEV1/latency-breach", "resolved")).expect("normalize");
        assert!(result.is_none());
    }

    #[test]
    fn unparseable_service_is_dropped() {
        let result = normalize(&event("SEV1/latency-breach", "firing")).expect("normalize");
        assert!(result.is_none());
    }

    #[test]
    fn unparseable_severity_is_dropped() {
        let result = normalize(&event("checkout/CRITICAL/latency-breach", "firing")).expect("normalize");
        assert!(result.is_none());
    }

    #[test]
    fn equal_inputs_in_same_identity_window_yield_equal_id() {
        let a = normalize(&event("checkout/SEV1/latency-breach", "firing"))
            .expect("normalize")
            .expect("signal");
        let mut second = event("checkout/SEV1/latency-breach", "firing");
        second.observed_at = Timestamp::parse("2026-03-05T14:07:58.000Z").expect("ts");
        let b = normalize(&second).expect("normalize").expect("signal");
        assert_eq!(a.signal_id, b.signal_id);
    }
}
