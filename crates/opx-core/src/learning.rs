// crates/opx-core/src/learning.rs
// ============================================================================
// Module: Pattern Extraction, Confidence Calibration, Learning Snapshots
// Description: Pure aggregate functions over closed-incident outcomes.
// Purpose: Turn append-only outcome history into resolution summaries,
// confidence-band drift analysis, and point-in-time learning snapshots.
// Dependencies: crate::confidence, crate::identity, crate::outcome, crate::time
// ============================================================================

//! ## Overview
//! Every function here is a pure aggregate over a slice of
//! [`IncidentOutcome`] values already loaded for a window; none of them
//! reads a store or the clock. Percentages are never stored, only derived
//! at read time from raw counts, per spec's ban on precomputing rates.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::confidence::ConfidenceBand;
use crate::identity::IdentityError;
use crate::identity::compute_calibration_id;
use crate::identity::compute_snapshot_id;
use crate::identity::compute_summary_id;
use crate::outcome::IncidentOutcome;
use crate::time::Timestamp;

/// Minimum total outcomes required before the calibrator will run.
pub const MINIMUM_OUTCOMES_FOR_CALIBRATION: usize = 30;
/// Minimum samples a confidence band needs before its accuracy/drift count.
pub const MIN_SAMPLES_PER_BAND: usize = 20;
/// Drift magnitude above which a band triggers an advisory alert.
pub const DRIFT_THRESHOLD: f64 = 0.15;
/// `|drift| < WELL_CALIBRATED_THRESHOLD` is considered well-calibrated.
pub const WELL_CALIBRATED_THRESHOLD: f64 = 0.05;
/// Pattern extraction keeps only the top-N root causes/resolutions by count.
pub const TOP_N: usize = 10;
/// A service's false-positive rate above this fraction is flagged.
pub const DETECTION_WARNING_FP_RATE: f64 = 0.30;

const SUMMARY_VERSION: &str = "summary-v1.0.0";
const CALIBRATION_VERSION: &str = "calibration-v1.0.0";
const SNAPSHOT_VERSION: &str = "snapshot-v1.0.0";

/// A `(value, count)` pair, used for top-N root causes and resolutions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueCount {
    /// The counted value (root cause text or resolution type label).
    pub value: String,
    /// How many outcomes carried this value.
    pub count: u32,
}

/// Aggregate metrics over a window, derived from raw counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    /// Total incidents (outcomes) in the window.
    pub total_incidents: u32,
    /// True-positive count.
    pub true_positives: u32,
    /// False-positive count.
    pub false_positives: u32,
    /// Average time-to-detect, seconds.
    pub average_ttd_seconds: f64,
    /// Average time-to-resolve, seconds.
    pub average_ttr_seconds: f64,
    /// Average recorder-asserted confidence rating.
    pub average_confidence: f64,
}

/// Pattern counts and informational warnings for a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patterns {
    /// Top root causes by count, ties broken lexicographically.
    pub common_root_causes: Vec<ValueCount>,
    /// Top resolution types by count, ties broken lexicographically.
    pub common_resolutions: Vec<ValueCount>,
    /// Services whose false-positive rate exceeds the warning threshold.
    /// Informational only; never gates automation.
    pub detection_warnings: Vec<String>,
}

/// A summary of resolution patterns over `(service|"ALL", start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionSummary {
    /// Deterministic `digest(service-or-ALL | startDate | endDate | version)`.
    pub summary_id: String,
    /// The service this summary covers, or `"ALL"`.
    pub service_or_all: String,
    /// Inclusive window start.
    pub window_start: Timestamp,
    /// Inclusive window end.
    pub window_end: Timestamp,
    /// Aggregate metrics.
    pub metrics: AggregateMetrics,
    /// Pattern counts.
    pub patterns: Patterns,
}

/// Extracts a [`ResolutionSummary`] from `outcomes`, which callers must
/// have already loaded and filtered to the `(service, start, end)` window;
/// this function performs no filtering of its own.
///
/// # Errors
///
/// Returns [`IdentityError`] if the summary id cannot be computed.
pub fn extract_patterns(
    service_or_all: &str,
    window_start: Timestamp,
    window_end: Timestamp,
    outcomes: &[IncidentOutcome],
) -> Result<ResolutionSummary, IdentityError> {
    let summary_id = compute_summary_id(service_or_all, &window_start.to_rfc3339(), &window_end.to_rfc3339(), SUMMARY_VERSION)?;

    let total = outcomes.len() as u32;
    let true_positives = outcomes.iter().filter(|o| o.classification.true_positive).count() as u32;
    let false_positives = total - true_positives;

    let average_ttd_seconds = average(outcomes.iter().map(|o| o.timing.ttd_seconds as f64));
    let average_ttr_seconds = average(outcomes.iter().map(|o| o.timing.ttr_seconds as f64));
    let average_confidence = average(outcomes.iter().map(|o| o.human_assessment.confidence_rating));

    let common_root_causes = top_n_by_count(outcomes.iter().map(|o| o.classification.root_cause.clone()));
    let common_resolutions = top_n_by_count(outcomes.iter().map(|o| resolution_type_label(o)));
    let detection_warnings = services_with_high_false_positive_rate(outcomes);

    Ok(ResolutionSummary {
        summary_id,
        service_or_all: service_or_all.to_string(),
        window_start,
        window_end,
        metrics: AggregateMetrics {
            total_incidents: total,
            true_positives,
            false_positives,
            average_ttd_seconds,
            average_ttr_seconds,
            average_confidence,
        },
        patterns: Patterns {
            common_root_causes,
            common_resolutions,
            detection_warnings,
        },
    })
}

/// Returns the wire label for an outcome's resolution type.
fn resolution_type_label(outcome: &IncidentOutcome) -> String {
    match outcome.classification.resolution_type {
        crate::incident::ResolutionType::Fixed => "FIXED".to_string(),
        crate::incident::ResolutionType::FalsePositive => "FALSE_POSITIVE".to_string(),
        crate::incident::ResolutionType::Duplicate => "DUPLICATE".to_string(),
        crate::incident::ResolutionType::WontFix => "WONT_FIX".to_string(),
    }
}

/// Arithmetic mean of `values`, or `0.0` if empty.
fn average(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let count = values.clone().count();
    if count == 0 {
        return 0.0;
    }
    values.sum::<f64>() / count as f64
}

/// Counts occurrences of each value and returns the top [`TOP_N`], ordered
/// by descending count, ties broken by lexicographic order of the value.
fn top_n_by_count(values: impl Iterator<Item = String>) -> Vec<ValueCount> {
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }
    let mut pairs: Vec<ValueCount> = counts.into_iter().map(|(value, count)| ValueCount { value, count }).collect();
    pairs.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    pairs.truncate(TOP_N);
    pairs
}

/// Returns services whose false-positive rate exceeds the warning
/// threshold, informational only.
fn services_with_high_false_positive_rate(outcomes: &[IncidentOutcome]) -> Vec<String> {
    let mut per_service: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
    for outcome in outcomes {
        let entry = per_service.entry(outcome.service.as_str()).or_insert((0, 0));
        entry.0 += 1;
        if outcome.classification.false_positive {
            entry.1 += 1;
        }
    }
    per_service
        .into_iter()
        .filter(|(_, (total, false_positive))| *total > 0 && f64::from(*false_positive) / f64::from(*total) > DETECTION_WARNING_FP_RATE)
        .map(|(service, _)| service.to_string())
        .collect()
}

/// Per-band calibration statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandCalibration {
    /// The confidence band these stats cover.
    pub band: ConfidenceBand,
    /// Total outcomes predicted into this band.
    pub total_incidents: u32,
    /// True positives in this band.
    pub true_positives: u32,
    /// False positives in this band.
    pub false_positives: u32,
    /// Observed accuracy `TP / (TP + FP)`.
    pub accuracy: f64,
    /// The band's expected accuracy (its midpoint).
    pub expected_accuracy: f64,
    /// `accuracy - expected_accuracy`.
    pub drift: f64,
    /// Whether this band has enough samples (`total >= MIN_SAMPLES_PER_BAND`).
    pub sample_size_sufficient: bool,
}

/// Aggregate drift statistics across all sufficiently sampled bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftAnalysis {
    /// Bands whose observed accuracy exceeds their expected accuracy.
    pub overconfident: Vec<ConfidenceBand>,
    /// Bands whose observed accuracy falls short of their expected accuracy.
    pub underconfident: Vec<ConfidenceBand>,
    /// Bands within `WELL_CALIBRATED_THRESHOLD` of their expected accuracy.
    pub well_calibrated: Vec<ConfidenceBand>,
    /// Bands without enough samples to judge.
    pub insufficient_data: Vec<ConfidenceBand>,
    /// Average drift over sufficiently sampled bands.
    pub average_drift: f64,
    /// Maximum absolute drift over sufficiently sampled bands.
    pub max_drift: f64,
}

/// Severity of a calibration recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecommendationSeverity {
    /// Informational only.
    Info,
    /// Worth reviewing soon.
    Warning,
    /// Significant drift.
    Critical,
}

/// An advisory calibration recommendation. Never actionable: opx does not
/// tune confidence bands automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// The band this recommendation concerns.
    pub band: ConfidenceBand,
    /// Advisory text, always containing the mandated advisory language.
    pub text: String,
    /// Recommendation severity.
    pub severity: RecommendationSeverity,
    /// Always `false`: recommendations are never auto-applied.
    pub actionable: bool,
}

/// Confidence band drift analysis over an outcome window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceCalibration {
    /// Deterministic `digest(startDate | endDate | version)`.
    pub calibration_id: String,
    /// Inclusive window start.
    pub window_start: Timestamp,
    /// Inclusive window end.
    pub window_end: Timestamp,
    /// Per-band calibration statistics, one entry per band with at least
    /// one prediction in the window.
    pub band_calibrations: Vec<BandCalibration>,
    /// Aggregate drift analysis.
    pub drift_analysis: DriftAnalysis,
    /// Advisory recommendations, one per band exceeding [`DRIFT_THRESHOLD`].
    pub recommendations: Vec<Recommendation>,
}

/// Why calibration could not proceed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalibrationError {
    /// Fewer than [`MINIMUM_OUTCOMES_FOR_CALIBRATION`] outcomes in window.
    #[error("insufficient data: {0} outcomes, need at least {MINIMUM_OUTCOMES_FOR_CALIBRATION}")]
    InsufficientData(usize),
    /// Computing the deterministic calibration id failed.
    #[error("failed to compute calibration id: {0}")]
    Identity(#[from] IdentityError),
}

/// Groups `outcomes` by predicted confidence band and computes drift
/// against each band's expected (midpoint) accuracy.
///
/// # Errors
///
/// Returns [`CalibrationError::InsufficientData`] if fewer than
/// [`MINIMUM_OUTCOMES_FOR_CALIBRATION`] outcomes are supplied, or
/// [`CalibrationError::Identity`] if the id cannot be computed.
pub fn calibrate(window_start: Timestamp, window_end: Timestamp, outcomes: &[IncidentOutcome]) -> Result<ConfidenceCalibration, CalibrationError> {
    if outcomes.len() < MINIMUM_OUTCOMES_FOR_CALIBRATION {
        return Err(CalibrationError::InsufficientData(outcomes.len()));
    }
    let calibration_id = compute_calibration_id(&window_start.to_rfc3339(), &window_end.to_rfc3339(), CALIBRATION_VERSION)?;

    let mut grouped: BTreeMap<String, Vec<&IncidentOutcome>> = BTreeMap::new();
    for outcome in outcomes {
        grouped.entry(outcome.predicted_band.clone()).or_default().push(outcome);
    }

    let mut band_calibrations = Vec::new();
    for (band_label, group) in grouped {
        let Some(band) = band_from_label(&band_label) else {
            continue;
        };
        let true_positives = group.iter().filter(|o| o.classification.true_positive).count() as u32;
        let false_positives = group.len() as u32 - true_positives;
        let total = group.len();
        let accuracy = if total == 0 { 0.0 } else { f64::from(true_positives) / total as f64 };
        let expected_accuracy = band.midpoint();
        band_calibrations.push(BandCalibration {
            band,
            total_incidents: total as u32,
            true_positives,
            false_positives,
            accuracy,
            expected_accuracy,
            drift: accuracy - expected_accuracy,
            sample_size_sufficient: total >= MIN_SAMPLES_PER_BAND,
        });
    }
    band_calibrations.sort_by_key(|b| b.band);

    let drift_analysis = analyze_drift(&band_calibrations);
    let recommendations = build_recommendations(&band_calibrations);

    Ok(ConfidenceCalibration {
        calibration_id,
        window_start,
        window_end,
        band_calibrations,
        drift_analysis,
        recommendations,
    })
}

/// Parses a confidence band wire label back into a [`ConfidenceBand`].
fn band_from_label(label: &str) -> Option<ConfidenceBand> {
    match label {
        "LOW" => Some(ConfidenceBand::Low),
        "MEDIUM" => Some(ConfidenceBand::Medium),
        "HIGH" => Some(ConfidenceBand::High),
        "CRITICAL" => Some(ConfidenceBand::Critical),
        _ => None,
    }
}

/// Buckets bands by overconfident/underconfident/well-calibrated/
/// insufficient-data and aggregates drift over sufficiently sampled bands.
fn analyze_drift(bands: &[BandCalibration]) -> DriftAnalysis {
    let sufficient: Vec<&BandCalibration> = bands.iter().filter(|b| b.sample_size_sufficient).collect();
    let mut overconfident = Vec::new();
    let mut underconfident = Vec::new();
    let mut well_calibrated = Vec::new();
    let mut insufficient_data = Vec::new();

    for band in bands {
        if !band.sample_size_sufficient {
            insufficient_data.push(band.band);
        } else if band.drift.abs() < WELL_CALIBRATED_THRESHOLD {
            well_calibrated.push(band.band);
        } else if band.drift > 0.0 {
            overconfident.push(band.band);
        } else {
            underconfident.push(band.band);
        }
    }

    let average_drift = average(sufficient.iter().map(|b| b.drift));
    let max_drift = sufficient.iter().map(|b| b.drift.abs()).fold(0.0_f64, f64::max);

    DriftAnalysis {
        overconfident,
        underconfident,
        well_calibrated,
        insufficient_data,
        average_drift,
        max_drift,
    }
}

/// Builds advisory, non-actionable recommendations for bands whose drift
/// exceeds [`DRIFT_THRESHOLD`].
fn build_recommendations(bands: &[BandCalibration]) -> Vec<Recommendation> {
    bands
        .iter()
        .filter(|b| b.sample_size_sufficient && b.drift.abs() > DRIFT_THRESHOLD)
        .map(|b| {
            let severity = if b.drift.abs() > 0.3 {
                RecommendationSeverity::Critical
            } else {
                RecommendationSeverity::Warning
            };
            Recommendation {
                band: b.band,
                text: format!(
                    "Band {} drifted {:.3} from expected accuracy; informational only, for human review. No automatic tuning is performed.",
                    b.band.as_str(),
                    b.drift
                ),
                severity,
                actionable: false,
            }
        })
        .collect()
}

/// Learning snapshot cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SnapshotType {
    /// Daily cadence; 30-day retention.
    Daily,
    /// Weekly cadence; 84-day retention.
    Weekly,
    /// Monthly cadence; no retention limit.
    Monthly,
    /// Explicit start/end, operator-triggered.
    Custom,
}

impl SnapshotType {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
            Self::Custom => "CUSTOM",
        }
    }

    /// Returns this snapshot type's retention in days, or `None` for no
    /// retention limit.
    #[must_use]
    pub const fn retention_days(self) -> Option<u32> {
        match self {
            Self::Daily => Some(30),
            Self::Weekly => Some(84),
            Self::Monthly | Self::Custom => None,
        }
    }
}

/// Aggregate counts and coverage projected into a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotData {
    /// Total outcomes in range.
    pub total_outcomes: u32,
    /// Total resolution summaries in range.
    pub total_summaries: u32,
    /// Total calibrations in range.
    pub total_calibrations: u32,
    /// Distinct services represented.
    pub services: Vec<String>,
    /// `{start, end}` of the range covered.
    pub date_range: DateRange,
}

/// A `{start, end}` date range as carried on a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Inclusive start.
    pub start: Timestamp,
    /// Inclusive end.
    pub end: Timestamp,
}

/// Immutable point-in-time aggregate over outcomes/summaries/calibrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningSnapshot {
    /// Deterministic `digest(snapshotType | startDate | endDate | version)`.
    pub snapshot_id: String,
    /// Snapshot cadence.
    pub snapshot_type: SnapshotType,
    /// Aggregate data.
    pub data: SnapshotData,
    /// Outcome ids projected into this snapshot.
    pub outcome_ids: Vec<String>,
    /// Summary ids projected into this snapshot.
    pub summary_ids: Vec<String>,
    /// Calibration ids projected into this snapshot.
    pub calibration_ids: Vec<String>,
}

/// Builds a [`LearningSnapshot`] by projecting ids and computing aggregate
/// counts/coverage over already-loaded entities in range; performs no
/// filtering of its own.
///
/// # Errors
///
/// Returns [`IdentityError`] if the snapshot id cannot be computed.
pub fn build_snapshot(
    snapshot_type: SnapshotType,
    window_start: Timestamp,
    window_end: Timestamp,
    outcomes: &[IncidentOutcome],
    summary_ids: &[String],
    calibration_ids: &[String],
) -> Result<LearningSnapshot, IdentityError> {
    let snapshot_id = compute_snapshot_id(snapshot_type.as_str(), &window_start.to_rfc3339(), &window_end.to_rfc3339(), SNAPSHOT_VERSION)?;

    let mut services: Vec<String> = outcomes.iter().map(|o| o.service.clone()).collect();
    services.sort();
    services.dedup();

    Ok(LearningSnapshot {
        snapshot_id,
        snapshot_type,
        data: SnapshotData {
            total_outcomes: outcomes.len() as u32,
            total_summaries: summary_ids.len() as u32,
            total_calibrations: calibration_ids.len() as u32,
            services,
            date_range: DateRange {
                start: window_start,
                end: window_end,
            },
        },
        outcome_ids: outcomes.iter().map(|o| o.outcome_id.clone()).collect(),
        summary_ids: summary_ids.to_vec(),
        calibration_ids: calibration_ids.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::Authority;
    use crate::authority::AuthorityType;
    use crate::incident::ResolutionType;
    use crate::outcome::Classification;
    use crate::outcome::HumanAssessment;
    use crate::outcome::Timing;

    fn outcome(service: &str, true_positive: bool, band: &str, root_cause: &str) -> IncidentOutcome {
        IncidentOutcome {
            outcome_id: format!("outcome-{service}-{root_cause}"),
            incident_id: "inc".into(),
            service: service.to_string(),
            recorded_at: Timestamp::parse("2026-01-10T00:00:00.000Z").expect("ts"),
            validated_at: Timestamp::parse("2026-01-10T00:00:01.000Z").expect("ts"),
            recorded_by: Authority::new(AuthorityType::OnCallSre, "sre:bob"),
            classification: Classification {
                true_positive,
                false_positive: !true_positive,
                root_cause: root_cause.to_string(),
                resolution_type: ResolutionType::Fixed,
            },
            timing: Timing {
                detected_at: Timestamp::parse("2026-01-10T00:00:00.000Z").expect("ts"),
                resolved_at: Timestamp::parse("2026-01-10T01:00:00.000Z").expect("ts"),
                closed_at: Timestamp::parse("2026-01-10T02:00:00.000Z").expect("ts"),
                ttd_seconds: 3600,
                ttr_seconds: 7200,
            },
            human_assessment: HumanAssessment {
                confidence_rating: 0.8,
                severity_accuracy: true,
                detection_quality: true,
                notes: None,
            },
            predicted_band: band.to_string(),
            version: 1,
        }
    }

    #[test]
    fn pattern_extraction_counts_and_top_n_are_stable() {
        let outcomes = vec![
            outcome("checkout", true, "HIGH", "db-pool-exhaustion"),
            outcome("checkout", true, "HIGH", "db-pool-exhaustion"),
            outcome("checkout", false, "HIGH", "flaky-test"),
        ];
        let summary = extract_patterns(
            "checkout",
            Timestamp::parse("2026-01-01T00:00:00.000Z").expect("ts"),
            Timestamp::parse("2026-01-31T23:59:59.999Z").expect("ts"),
            &outcomes,
        )
        .expect("summary");
        assert_eq!(summary.metrics.total_incidents, 3);
        assert_eq!(summary.metrics.true_positives, 2);
        assert_eq!(summary.metrics.false_positives, 1);
        assert_eq!(summary.patterns.common_root_causes[0].value, "db-pool-exhaustion");
        assert_eq!(summary.patterns.common_root_causes[0].count, 2);
    }

    #[test]
    fn high_false_positive_rate_service_is_flagged() {
        let outcomes = vec![
            outcome("flaky-service", false, "LOW", "noise"),
            outcome("flaky-service", false, "LOW", "noise"),
            outcome("flaky-service", true, "LOW", "real"),
        ];
        let summary = extract_patterns(
            "ALL",
            Timestamp::parse("2026-01-01T00:00:00.000Z").expect("ts"),
            Timestamp::parse("2026-01-31T23:59:59.999Z").expect("ts"),
            &outcomes,
        )
        .expect("summary");
        assert!(summary.patterns.detection_warnings.contains(&"flaky-service".to_string()));
    }

    fn many_outcomes(count: usize, band: &str, true_positive_fraction: f64) -> Vec<IncidentOutcome> {
        (0..count)
            .map(|i| {
                let true_positive = (i as f64) < (count as f64 * true_positive_fraction);
                outcome("checkout", true_positive, band, "cause")
            })
            .collect()
    }

    #[test]
    fn insufficient_outcomes_fail_calibration() {
        let outcomes = many_outcomes(10, "HIGH", 1.0);
        let err = calibrate(
            Timestamp::parse("2026-01-01T00:00:00.000Z").expect("ts"),
            Timestamp::parse("2026-01-31T23:59:59.999Z").expect("ts"),
            &outcomes,
        )
        .unwrap_err();
        assert!(matches!(err, CalibrationError::InsufficientData(10)));
    }

    #[test]
    fn drift_is_accuracy_minus_band_midpoint() {
        // HIGH band midpoint is 0.7; all true positives => accuracy 1.0 =>
        // drift 0.3, which exceeds DRIFT_THRESHOLD and becomes a WARNING
        // (not CRITICAL, since 0.3 is not > 0.3).
        let outcomes = many_outcomes(30, "HIGH", 1.0);
        let calibration = calibrate(
            Timestamp::parse("2026-01-01T00:00:00.000Z").expect("ts"),
            Timestamp::parse("2026-01-31T23:59:59.999Z").expect("ts"),
            &outcomes,
        )
        .expect("calibration");
        let high = calibration.band_calibrations.iter().find(|b| b.band == ConfidenceBand::High).expect("high band");
        assert!((high.accuracy - 1.0).abs() < f64::EPSILON);
        assert!((high.drift - 0.3).abs() < 1e-9);
        assert!(high.sample_size_sufficient);
        assert_eq!(calibration.recommendations.len(), 1);
        assert!(!calibration.recommendations[0].actionable);
        assert!(calibration.recommendations[0].text.contains("informational only"));
        assert!(calibration.recommendations[0].text.contains("human review"));
        assert!(calibration.recommendations[0].text.contains("No automatic tuning"));
    }

    #[test]
    fn snapshot_projects_ids_and_dedupes_services() {
        let outcomes = vec![outcome("checkout", true, "HIGH", "a"), outcome("checkout", true, "HIGH", "b")];
        let snapshot = build_snapshot(
            SnapshotType::Daily,
            Timestamp::parse("2026-01-01T00:00:00.000Z").expect("ts"),
            Timestamp::parse("2026-01-02T00:00:00.000Z").expect("ts"),
            &outcomes,
            &["summary1".to_string()],
            &[],
        )
        .expect("snapshot");
        assert_eq!(snapshot.data.services, vec!["checkout".to_string()]);
        assert_eq!(snapshot.data.total_outcomes, 2);
        assert_eq!(snapshot.outcome_ids.len(), 2);
        assert_eq!(SnapshotType::Daily.retention_days(), Some(30));
        assert_eq!(SnapshotType::Monthly.retention_days(), None);
    }
}
