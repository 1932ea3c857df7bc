// crates/opx-stores/src/outcome_store.rs
// ============================================================================
// Module: Outcome Store
// Description: Append-only store for recorded incident outcomes.
// Purpose: Conditional-create by outcomeId, indexed by service for the
// learning pipeline's windowed pattern-extraction reads.
// Dependencies: opx_core::outcome, crate::error
// ============================================================================

//! ## Overview
//! Outcomes feed [`opx_core::learning::extract_patterns`] and
//! [`opx_core::learning::calibrate`], both of which read a whole window of
//! outcomes for a service (or all services); this store's index exists to
//! serve that read pattern.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use opx_core::outcome::IncidentOutcome;
use opx_core::time::Window;

use crate::error::PutOutcome;
use crate::error::StoreError;

/// Append-only store for [`IncidentOutcome`] records.
pub trait OutcomeStore {
    /// Conditionally creates `outcome` by `outcome.outcome_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn put(&self, outcome: IncidentOutcome) -> Result<PutOutcome, StoreError>;

    /// Reads an outcome by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure or integrity fault.
    fn get(&self, outcome_id: &str) -> Result<Option<IncidentOutcome>, StoreError>;

    /// Reads the outcome for a given incident, if one has been recorded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn get_by_incident(&self, incident_id: &str) -> Result<Option<IncidentOutcome>, StoreError>;

    /// Lists outcomes whose `recorded_at` falls within `window`, optionally
    /// restricted to `service`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn list_in_window(&self, service: Option<&str>, window: &Window) -> Result<Vec<IncidentOutcome>, StoreError>;
}

/// Deterministic in-memory reference implementation of [`OutcomeStore`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryOutcomeStore {
    /// Outcomes keyed by `outcome_id`.
    outcomes: Arc<Mutex<BTreeMap<String, IncidentOutcome>>>,
}

impl InMemoryOutcomeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the outcome map, translating a poisoned mutex into
    /// [`StoreError::Io`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, IncidentOutcome>>, StoreError> {
        self.outcomes.lock().map_err(|_| StoreError::Io("outcome store mutex poisoned".to_string()))
    }
}

impl OutcomeStore for InMemoryOutcomeStore {
    fn put(&self, outcome: IncidentOutcome) -> Result<PutOutcome, StoreError> {
        let mut guard = self.lock()?;
        if guard.contains_key(&outcome.outcome_id) {
            return Ok(PutOutcome::AlreadyExists);
        }
        guard.insert(outcome.outcome_id.clone(), outcome);
        Ok(PutOutcome::Created)
    }

    fn get(&self, outcome_id: &str) -> Result<Option<IncidentOutcome>, StoreError> {
        Ok(self.lock()?.get(outcome_id).cloned())
    }

    fn get_by_incident(&self, incident_id: &str) -> Result<Option<IncidentOutcome>, StoreError> {
        Ok(self.lock()?.values().find(|outcome| outcome.incident_id == incident_id).cloned())
    }

    fn list_in_window(&self, service: Option<&str>, window: &Window) -> Result<Vec<IncidentOutcome>, StoreError> {
        let guard = self.lock()?;
        let mut matches: Vec<IncidentOutcome> = guard
            .values()
            .filter(|outcome| service.is_none_or(|service| outcome.service == service))
            .filter(|outcome| outcome.recorded_at >= window.start && outcome.recorded_at < window.end)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));
        Ok(matches)
    }
}

/// Shared, clonable handle to an [`OutcomeStore`] implementation.
#[derive(Clone)]
pub struct SharedOutcomeStore {
    /// Inner store implementation.
    inner: Arc<dyn OutcomeStore + Send + Sync>,
}

impl SharedOutcomeStore {
    /// Wraps an outcome store in a shared, clonable handle.
    #[must_use]
    pub fn from_store(store: impl OutcomeStore + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(store) }
    }
}

impl OutcomeStore for SharedOutcomeStore {
    fn put(&self, outcome: IncidentOutcome) -> Result<PutOutcome, StoreError> {
        self.inner.put(outcome)
    }

    fn get(&self, outcome_id: &str) -> Result<Option<IncidentOutcome>, StoreError> {
        self.inner.get(outcome_id)
    }

    fn get_by_incident(&self, incident_id: &str) -> Result<Option<IncidentOutcome>, StoreError> {
        self.inner.get_by_incident(incident_id)
    }

    fn list_in_window(&self, service: Option<&str>, window: &Window) -> Result<Vec<IncidentOutcome>, StoreError> {
        self.inner.list_in_window(service, window)
    }
}
