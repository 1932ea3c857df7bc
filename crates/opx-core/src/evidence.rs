// crates/opx-core/src/evidence.rs
// ============================================================================
// Module: Evidence Bundle
// Description: Immutable bundle of detections over a window; the canonical
// decision clock for everything downstream.
// Purpose: Hold the data shape produced by the (out-of-core-scope) detection
// and bundling pipeline, plus the deterministic identity for it.
// Dependencies: crate::identity, crate::signal, crate::time
// ============================================================================

//! ## Overview
//! Detection (turning signals into rule matches) and evidence bundling are
//! out of core scope; this module defines the immutable `EvidenceBundle`
//! shape detection/bundling is expected to produce, and the deterministic id
//! for it. `bundled_at` is the sole authoritative "decision clock" used by
//! the confidence model and promotion gate downstream.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::identity::IdentityError;
use crate::identity::compute_evidence_id;
use crate::signal::NormalizedSeverity;
use crate::time::Timestamp;

/// One detection contributing to an evidence bundle: a rule match over one
/// or more signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    /// Deterministic detection identifier, assigned by the (out-of-scope)
    /// detection pipeline.
    pub detection_id: String,
    /// Rule identifier that produced this detection.
    pub rule_id: String,
    /// Severity of the matched condition.
    pub severity: NormalizedSeverity,
    /// Signal ids contributing to this detection.
    pub signal_ids: Vec<String>,
    /// When the detection fired.
    pub detected_at: Timestamp,
}

/// Summary statistics over the signals bundled into an evidence window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSummary {
    /// Total signal count in the window.
    pub signal_count: u32,
    /// Count of signals per normalized severity.
    pub severity_distribution: BTreeMap<String, u32>,
    /// Spread between the earliest and latest signal, in seconds.
    pub time_spread_seconds: u64,
    /// Count of distinct rule ids represented.
    pub unique_rules: u32,
}

/// Immutable bundle of detections over a window. `bundled_at` is the sole
/// authoritative decision clock used downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    /// Deterministic content-addressed evidence identifier.
    pub evidence_id: String,
    /// Service the evidence pertains to.
    pub service: String,
    /// Detections bundled into this evidence.
    pub detections: Vec<Detection>,
    /// Inclusive window start.
    pub window_start: Timestamp,
    /// Inclusive window end.
    pub window_end: Timestamp,
    /// When the bundle was produced; the canonical decision clock.
    pub bundled_at: Timestamp,
    /// Aggregate signal statistics for the window.
    pub signal_summary: SignalSummary,
}

impl EvidenceBundle {
    /// Computes the deterministic evidence id for `service`, `window_start`,
    /// `window_end`, and the sorted set of detection ids.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] if a field contains the identity separator.
    pub fn compute_id(
        service: &str,
        window_start: &Timestamp,
        window_end: &Timestamp,
        detection_ids: &[String],
    ) -> Result<String, IdentityError> {
        compute_evidence_id(service, &window_start.to_rfc3339(), &window_end.to_rfc3339(), detection_ids)
    }

    /// Returns the unique rule count across detections.
    #[must_use]
    pub fn unique_rule_count(&self) -> usize {
        let mut rules: Vec<&str> = self.detections.iter().map(|d| d.rule_id.as_str()).collect();
        rules.sort_unstable();
        rules.dedup();
        rules.len()
    }

    /// Returns the maximum detection severity in this bundle, or `None` if
    /// there are no detections.
    #[must_use]
    pub fn max_severity(&self) -> Option<NormalizedSeverity> {
        self.detections.iter().map(|d| d.severity).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evidence_id_is_order_independent_over_detections() {
        let start = Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts");
        let end = Timestamp::parse("2026-03-05T01:00:00.000Z").expect("ts");
        let a = EvidenceBundle::compute_id("checkout", &start, &end, &["d2".into(), "d1".into()]).expect("id");
        let b = EvidenceBundle::compute_id("checkout", &start, &end, &["d1".into(), "d2".into()]).expect("id");
        assert_eq!(a, b);
    }

    #[test]
    fn max_severity_is_the_max_detection_severity() {
        let bundle = EvidenceBundle {
            evidence_id: "e1".into(),
            service: "checkout".into(),
            detections: vec![
                Detection {
                    detection_id: "d1".into(),
                    rule_id: "r1".into(),
                    severity: NormalizedSeverity::Low,
                    signal_ids: vec!["s1".into()],
                    detected_at: Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts"),
                },
                Detection {
                    detection_id: "d2".into(),
                    rule_id: "r2".into(),
                    severity: NormalizedSeverity::Critical,
                    signal_ids: vec!["s2".into()],
                    detected_at: Timestamp::parse("2026-03-05T00:05:00.000Z").expect("ts"),
                },
            ],
            window_start: Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts"),
            window_end: Timestamp::parse("2026-03-05T01:00:00.000Z").expect("ts"),
            bundled_at: Timestamp::parse("2026-03-05T01:00:01.000Z").expect("ts"),
            signal_summary: SignalSummary {
                signal_count: 2,
                severity_distribution: BTreeMap::new(),
                time_spread_seconds: 300,
                unique_rules: 2,
            },
        };
        assert_eq!(bundle.max_severity(), Some(NormalizedSeverity::Critical));
        assert_eq!(bundle.unique_rule_count(), 2);
    }
}
