// crates/opx-core/src/confidence.rs
// ============================================================================
// Module: Confidence Model
// Description: Maps an evidence bundle's factor vector to a score, band,
// and human-readable explanation.
// Purpose: Deterministic, byte-identical-on-replay candidate assessment.
// Dependencies: crate::evidence
// ============================================================================

//! ## Overview
//! `assess` computes normalized factor values in `[0, 1]`, multiplies by
//! fixed weights, sums to a score, maps the score to a band via fixed
//! thresholds, and produces at least one human-readable reason.
//! `assessed_at` is always `evidence.bundled_at`; replay must be
//! byte-identical given the same evidence.

use serde::Deserialize;
use serde::Serialize;

use crate::evidence::EvidenceBundle;
use crate::time::Timestamp;

/// Current confidence model version. Bumping this changes the decision
/// surface and must be reflected in replayed assessments.
pub const MODEL_VERSION: &str = "confidence-v1.0.0";

/// Fixed factor weight for detection count.
pub const WEIGHT_DETECTION_COUNT: f64 = 0.30;
/// Fixed factor weight for severity score.
pub const WEIGHT_SEVERITY_SCORE: f64 = 0.25;
/// Fixed factor weight for rule diversity.
pub const WEIGHT_RULE_DIVERSITY: f64 = 0.20;
/// Fixed factor weight for temporal density.
pub const WEIGHT_TEMPORAL_DENSITY: f64 = 0.15;
/// Fixed factor weight for signal volume.
pub const WEIGHT_SIGNAL_VOLUME: f64 = 0.10;

/// Normalization caps used to map raw counts into `[0, 1]` factor values.
/// These are part of the deterministic model surface, not tunable at
/// runtime (see spec.md's "no automatic tuning of confidence bands"
/// non-goal).
const DETECTION_COUNT_CAP: f64 = 10.0;
const TEMPORAL_DENSITY_WINDOW_SECONDS_CAP: f64 = 3_600.0;
const SIGNAL_VOLUME_CAP: f64 = 20.0;
const RULE_DIVERSITY_CAP: f64 = 5.0;

/// Confidence band bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceBand {
    /// `[0, 0.4)`
    Low,
    /// `[0.4, 0.6)`
    Medium,
    /// `[0.6, 0.8)`
    High,
    /// `[0.8, 1.0]`
    Critical,
}

impl ConfidenceBand {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    /// Maps a score in `[0, 1]` to its band via the fixed thresholds.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Critical
        } else if score >= 0.6 {
            Self::High
        } else if score >= 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Returns the midpoint of this band's score range, used as the
    /// calibrator's `expectedAccuracy`.
    #[must_use]
    pub const fn midpoint(self) -> f64 {
        match self {
            Self::Low => 0.2,
            Self::Medium => 0.5,
            Self::High => 0.7,
            Self::Critical => 0.9,
        }
    }
}

/// One factor's contribution to the confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorContribution {
    /// Normalized value in `[0, 1]`.
    pub value: f64,
    /// `value * weight`.
    pub contribution: f64,
    /// Fixed weight for this factor.
    pub weight: f64,
}

/// The fixed factor vector used to compute a confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Factors {
    /// Normalized detection count factor.
    pub detection_count: FactorContribution,
    /// Normalized severity score factor.
    pub severity_score: FactorContribution,
    /// Normalized rule diversity factor.
    pub rule_diversity: FactorContribution,
    /// Normalized temporal density factor.
    pub temporal_density: FactorContribution,
    /// Normalized signal volume factor.
    pub signal_volume: FactorContribution,
}

impl Factors {
    /// Returns the sum of all factor weights, which must equal `1.0` within
    /// `± 0.001`.
    #[must_use]
    pub fn weight_sum(&self) -> f64 {
        self.detection_count.weight
            + self.severity_score.weight
            + self.rule_diversity.weight
            + self.temporal_density.weight
            + self.signal_volume.weight
    }

    fn score(&self) -> f64 {
        self.detection_count.contribution
            + self.severity_score.contribution
            + self.rule_diversity.contribution
            + self.temporal_density.contribution
            + self.signal_volume.contribution
    }
}

/// Deterministic assessment of an evidence bundle's promotion-worthiness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateAssessment {
    /// Confidence score in `[0, 1]`.
    pub confidence_score: f64,
    /// Confidence band, consistent with `confidence_score`.
    pub confidence_band: ConfidenceBand,
    /// At least one human-readable reason.
    pub reasons: Vec<String>,
    /// The factor vector behind the score.
    pub factors: Factors,
    /// Always `evidence.bundled_at`.
    pub assessed_at: Timestamp,
    /// The confidence model version used.
    pub model_version: String,
}

/// Normalizes `value` into `[0, 1]` against `cap`, clamping excess.
fn normalize_capped(value: f64, cap: f64) -> f64 {
    if cap <= 0.0 {
        return 0.0;
    }
    (value / cap).clamp(0.0, 1.0)
}

/// Averages detection severities into a `[0, 1]` factor value.
fn severity_factor_value(evidence: &EvidenceBundle) -> f64 {
    if evidence.detections.is_empty() {
        return 0.0;
    }
    let total: f64 = evidence
        .detections
        .iter()
        .map(|d| match d.severity {
            crate::signal::NormalizedSeverity::Critical => 1.0,
            crate::signal::NormalizedSeverity::High => 0.75,
            crate::signal::NormalizedSeverity::Medium => 0.5,
            crate::signal::NormalizedSeverity::Low => 0.25,
            crate::signal::NormalizedSeverity::Info => 0.0,
        })
        .sum();
    (total / evidence.detections.len() as f64).clamp(0.0, 1.0)
}

/// Computes the deterministic [`CandidateAssessment`] for an evidence
/// bundle. `assessed_at` is always `evidence.bundled_at`; given the same
/// evidence this function always returns byte-identical output.
#[must_use]
pub fn assess(evidence: &EvidenceBundle) -> CandidateAssessment {
    let detection_count_value = normalize_capped(evidence.detections.len() as f64, DETECTION_COUNT_CAP);
    let severity_score_value = severity_factor_value(evidence);
    let rule_diversity_value = normalize_capped(evidence.unique_rule_count() as f64, RULE_DIVERSITY_CAP);
    let window_seconds =
        (evidence.window_end.as_offset_date_time() - evidence.window_start.as_offset_date_time())
            .whole_seconds()
            .max(1) as f64;
    let temporal_density_value =
        normalize_capped(evidence.detections.len() as f64 / window_seconds * TEMPORAL_DENSITY_WINDOW_SECONDS_CAP, DETECTION_COUNT_CAP);
    let signal_volume_value = normalize_capped(f64::from(evidence.signal_summary.signal_count), SIGNAL_VOLUME_CAP);

    let factors = Factors {
        detection_count: FactorContribution {
            value: detection_count_value,
            contribution: detection_count_value * WEIGHT_DETECTION_COUNT,
            weight: WEIGHT_DETECTION_COUNT,
        },
        severity_score: FactorContribution {
            value: severity_score_value,
            contribution: severity_score_value * WEIGHT_SEVERITY_SCORE,
            weight: WEIGHT_SEVERITY_SCORE,
        },
        rule_diversity: FactorContribution {
            value: rule_diversity_value,
            contribution: rule_diversity_value * WEIGHT_RULE_DIVERSITY,
            weight: WEIGHT_RULE_DIVERSITY,
        },
        temporal_density: FactorContribution {
            value: temporal_density_value,
            contribution: temporal_density_value * WEIGHT_TEMPORAL_DENSITY,
            weight: WEIGHT_TEMPORAL_DENSITY,
        },
        signal_volume: FactorContribution {
            value: signal_volume_value,
            contribution: signal_volume_value * WEIGHT_SIGNAL_VOLUME,
            weight: WEIGHT_SIGNAL_VOLUME,
        },
    };

    let score = factors.score().clamp(0.0, 1.0);
    let band = ConfidenceBand::from_score(score);
    let reasons = build_reasons(evidence, &factors, band);

    CandidateAssessment {
        confidence_score: score,
        confidence_band: band,
        reasons,
        factors,
        assessed_at: evidence.bundled_at,
        model_version: MODEL_VERSION.to_string(),
    }
}

/// Builds the human-readable reason list for an assessment; always
/// non-empty.
fn build_reasons(evidence: &EvidenceBundle, factors: &Factors, band: ConfidenceBand) -> Vec<String> {
    let mut reasons = vec![format!(
        "{} detection(s) across {} unique rule(s) yielded a {} confidence band",
        evidence.detections.len(),
        evidence.unique_rule_count(),
        band.as_str()
    )];
    if factors.severity_score.value >= 0.75 {
        reasons.push("severity distribution is dominated by high-severity detections".to_string());
    }
    if factors.temporal_density.value >= 0.5 {
        reasons.push("detections are temporally dense within the evidence window".to_string());
    }
    reasons
}
