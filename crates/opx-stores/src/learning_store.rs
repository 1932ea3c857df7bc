// crates/opx-stores/src/learning_store.rs
// ============================================================================
// Module: Learning Store
// Description: Append-only stores for resolution summaries, confidence
// calibrations, and learning snapshots.
// Purpose: Persist the three learning-pipeline artifacts by their
// deterministic ids; nothing in this module is ever mutated.
// Dependencies: opx_core::learning, crate::error
// ============================================================================

//! ## Overview
//! All three entities here are immutable once computed — re-running a job
//! over the same window reproduces the same digest-derived id and the
//! conditional-create collapses the replay, mirroring every other
//! append-only store in this crate.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use opx_core::learning::ConfidenceCalibration;
use opx_core::learning::LearningSnapshot;
use opx_core::learning::ResolutionSummary;

use crate::error::PutOutcome;
use crate::error::StoreError;

/// Append-only store for [`ResolutionSummary`] records.
pub trait SummaryStore {
    /// Conditionally creates `summary` by `summary.summary_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn put(&self, summary: ResolutionSummary) -> Result<PutOutcome, StoreError>;

    /// Reads a summary by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure or integrity fault.
    fn get(&self, summary_id: &str) -> Result<Option<ResolutionSummary>, StoreError>;
}

/// Append-only store for [`ConfidenceCalibration`] records.
pub trait CalibrationStore {
    /// Conditionally creates `calibration` by `calibration.calibration_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn put(&self, calibration: ConfidenceCalibration) -> Result<PutOutcome, StoreError>;

    /// Reads a calibration by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure or integrity fault.
    fn get(&self, calibration_id: &str) -> Result<Option<ConfidenceCalibration>, StoreError>;
}

/// Append-only store for [`LearningSnapshot`] records.
pub trait SnapshotStore {
    /// Conditionally creates `snapshot` by `snapshot.snapshot_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn put(&self, snapshot: LearningSnapshot) -> Result<PutOutcome, StoreError>;

    /// Reads a snapshot by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure or integrity fault.
    fn get(&self, snapshot_id: &str) -> Result<Option<LearningSnapshot>, StoreError>;
}

/// Deterministic in-memory reference implementation of [`SummaryStore`].
#[derive(Debug, Default, Clone)]
pub struct InMemorySummaryStore {
    /// Summaries keyed by `summary_id`.
    summaries: Arc<Mutex<BTreeMap<String, ResolutionSummary>>>,
}

impl InMemorySummaryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SummaryStore for InMemorySummaryStore {
    fn put(&self, summary: ResolutionSummary) -> Result<PutOutcome, StoreError> {
        let mut guard = self.summaries.lock().map_err(|_| StoreError::Io("summary store mutex poisoned".to_string()))?;
        if guard.contains_key(&summary.summary_id) {
            return Ok(PutOutcome::AlreadyExists);
        }
        guard.insert(summary.summary_id.clone(), summary);
        Ok(PutOutcome::Created)
    }

    fn get(&self, summary_id: &str) -> Result<Option<ResolutionSummary>, StoreError> {
        let guard = self.summaries.lock().map_err(|_| StoreError::Io("summary store mutex poisoned".to_string()))?;
        Ok(guard.get(summary_id).cloned())
    }
}

/// Shared, clonable handle to a [`SummaryStore`] implementation.
#[derive(Clone)]
pub struct SharedSummaryStore {
    /// Inner store implementation.
    inner: Arc<dyn SummaryStore + Send + Sync>,
}

impl SharedSummaryStore {
    /// Wraps a summary store in a shared, clonable handle.
    #[must_use]
    pub fn from_store(store: impl SummaryStore + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(store) }
    }
}

impl SummaryStore for SharedSummaryStore {
    fn put(&self, summary: ResolutionSummary) -> Result<PutOutcome, StoreError> {
        self.inner.put(summary)
    }

    fn get(&self, summary_id: &str) -> Result<Option<ResolutionSummary>, StoreError> {
        self.inner.get(summary_id)
    }
}

/// Deterministic in-memory reference implementation of [`CalibrationStore`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryCalibrationStore {
    /// Calibrations keyed by `calibration_id`.
    calibrations: Arc<Mutex<BTreeMap<String, ConfidenceCalibration>>>,
}

impl InMemoryCalibrationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CalibrationStore for InMemoryCalibrationStore {
    fn put(&self, calibration: ConfidenceCalibration) -> Result<PutOutcome, StoreError> {
        let mut guard = self.calibrations.lock().map_err(|_| StoreError::Io("calibration store mutex poisoned".to_string()))?;
        if guard.contains_key(&calibration.calibration_id) {
            return Ok(PutOutcome::AlreadyExists);
        }
        guard.insert(calibration.calibration_id.clone(), calibration);
        Ok(PutOutcome::Created)
    }

    fn get(&self, calibration_id: &str) -> Result<Option<ConfidenceCalibration>, StoreError> {
        let guard = self.calibrations.lock().map_err(|_| StoreError::Io("calibration store mutex poisoned".to_string()))?;
        Ok(guard.get(calibration_id).cloned())
    }
}

/// Shared, clonable handle to a [`CalibrationStore`] implementation.
#[derive(Clone)]
pub struct SharedCalibrationStore {
    /// Inner store implementation.
    inner: Arc<dyn CalibrationStore + Send + Sync>,
}

impl SharedCalibrationStore {
    /// Wraps a calibration store in a shared, clonable handle.
    #[must_use]
    pub fn from_store(store: impl CalibrationStore + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(store) }
    }
}

impl CalibrationStore for SharedCalibrationStore {
    fn put(&self, calibration: ConfidenceCalibration) -> Result<PutOutcome, StoreError> {
        self.inner.put(calibration)
    }

    fn get(&self, calibration_id: &str) -> Result<Option<ConfidenceCalibration>, StoreError> {
        self.inner.get(calibration_id)
    }
}

/// Deterministic in-memory reference implementation of [`SnapshotStore`].
#[derive(Debug, Default, Clone)]
pub struct InMemorySnapshotStore {
    /// Snapshots keyed by `snapshot_id`.
    snapshots: Arc<Mutex<BTreeMap<String, LearningSnapshot>>>,
}

impl InMemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn put(&self, snapshot: LearningSnapshot) -> Result<PutOutcome, StoreError> {
        let mut guard = self.snapshots.lock().map_err(|_| StoreError::Io("snapshot store mutex poisoned".to_string()))?;
        if guard.contains_key(&snapshot.snapshot_id) {
            return Ok(PutOutcome::AlreadyExists);
        }
        guard.insert(snapshot.snapshot_id.clone(), snapshot);
        Ok(PutOutcome::Created)
    }

    fn get(&self, snapshot_id: &str) -> Result<Option<LearningSnapshot>, StoreError> {
        let guard = self.snapshots.lock().map_err(|_| StoreError::Io("snapshot store mutex poisoned".to_string()))?;
        Ok(guard.get(snapshot_id).cloned())
    }
}

/// Shared, clonable handle to a [`SnapshotStore`] implementation.
#[derive(Clone)]
pub struct SharedSnapshotStore {
    /// Inner store implementation.
    inner: Arc<dyn SnapshotStore + Send + Sync>,
}

impl SharedSnapshotStore {
    /// Wraps a snapshot store in a shared, clonable handle.
    #[must_use]
    pub fn from_store(store: impl SnapshotStore + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(store) }
    }
}

impl SnapshotStore for SharedSnapshotStore {
    fn put(&self, snapshot: LearningSnapshot) -> Result<PutOutcome, StoreError> {
        self.inner.put(snapshot)
    }

    fn get(&self, snapshot_id: &str) -> Result<Option<LearningSnapshot>, StoreError> {
        self.inner.get(snapshot_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opx_core::learning::AggregateMetrics;
    use opx_core::learning::Patterns;
    use opx_core::learning::SnapshotData;
    use opx_core::learning::DateRange;
    use opx_core::learning::SnapshotType;
    use opx_core::learning::BandCalibration;
    use opx_core::learning::DriftAnalysis;
    use opx_core::time::Timestamp;

    fn summary(id: &str) -> ResolutionSummary {
        ResolutionSummary {
            summary_id: id.to_string(),
            service_or_all: "ALL".to_string(),
            window_start: Timestamp::parse("2026-03-01T00:00:00.000Z").expect("ts"),
            window_end: Timestamp::parse("2026-03-02T00:00:00.000Z").expect("ts"),
            metrics: AggregateMetrics {
                total_incidents: 0,
                true_positives: 0,
                false_positives: 0,
                average_ttd_seconds: 0.0,
                average_ttr_seconds: 0.0,
                average_confidence: 0.0,
            },
            patterns: Patterns {
                common_root_causes: vec![],
                common_resolutions: vec![],
                detection_warnings: vec![],
            },
        }
    }

    #[test]
    fn summary_put_twice_is_idempotent() {
        let store = InMemorySummaryStore::new();
        assert_eq!(store.put(summary("sum1")).expect("put"), PutOutcome::Created);
        assert_eq!(store.put(summary("sum1")).expect("put"), PutOutcome::AlreadyExists);
    }

    #[test]
    fn calibration_put_twice_is_idempotent() {
        let store = InMemoryCalibrationStore::new();
        let calibration = ConfidenceCalibration {
            calibration_id: "cal1".to_string(),
            window_start: Timestamp::parse("2026-03-01T00:00:00.000Z").expect("ts"),
            window_end: Timestamp::parse("2026-03-02T00:00:00.000Z").expect("ts"),
            band_calibrations: Vec::<BandCalibration>::new(),
            drift_analysis: DriftAnalysis {
                overconfident: vec![],
                underconfident: vec![],
                well_calibrated: vec![],
                insufficient_data: vec![],
                average_drift: 0.0,
                max_drift: 0.0,
            },
            recommendations: vec![],
        };
        assert_eq!(store.put(calibration.clone()).expect("put"), PutOutcome::Created);
        assert_eq!(store.put(calibration).expect("put"), PutOutcome::AlreadyExists);
    }

    #[test]
    fn snapshot_put_twice_is_idempotent() {
        let store = InMemorySnapshotStore::new();
        let snapshot = LearningSnapshot {
            snapshot_id: "snap1".to_string(),
            snapshot_type: SnapshotType::Daily,
            data: SnapshotData {
                total_outcomes: 0,
                total_summaries: 0,
                total_calibrations: 0,
                services: vec![],
                date_range: DateRange {
                    start: Timestamp::parse("2026-03-01T00:00:00.000Z").expect("ts"),
                    end: Timestamp::parse("2026-03-02T00:00:00.000Z").expect("ts"),
                },
            },
            outcome_ids: vec![],
            summary_ids: vec![],
            calibration_ids: vec![],
        };
        assert_eq!(store.put(snapshot.clone()).expect("put"), PutOutcome::Created);
        assert_eq!(store.put(snapshot).expect("put"), PutOutcome::AlreadyExists);
    }
}
