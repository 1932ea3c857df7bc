// crates/opx-stores/src/incident_store.rs
// ============================================================================
// Module: Incident Store
// Description: The one store in this crate with a mutation path — FSM
// transitions update the incident record under optimistic concurrency.
// Purpose: Conditional-create on incidentId; linearizable last-writer-wins
// update gated by `incidentVersion`.
// Dependencies: opx_core::incident, crate::error
// ============================================================================

//! ## Overview
//! `create` is conditional on `incidentId` absence, matching every other
//! append-only store in this crate. `update` is the sole mutation path: it
//! re-reads the stored version and fails with [`IncidentStoreError::Conflict`]
//! if the caller's expected version is stale, satisfying spec's "re-read
//! and re-validate before write" concurrency rule.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use opx_core::incident::Incident;
use opx_core::incident::IncidentStatus;

use crate::error::PutOutcome;
use crate::error::StoreError;

/// Filters accepted by [`IncidentStore::list`].
#[derive(Debug, Clone, Default)]
pub struct IncidentFilters {
    /// Restrict to this status, if set.
    pub status: Option<IncidentStatus>,
    /// Restrict to this service, if set.
    pub service: Option<String>,
    /// Maximum records returned; capped at 100 per the HTTP surface
    /// contract regardless of what the caller requests.
    pub limit: usize,
}

/// Why an incident `update` was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IncidentStoreError {
    /// No incident exists at this id.
    #[error("incident {0} does not exist")]
    NotFound(String),
    /// The caller's expected version did not match the stored version.
    #[error("incident {incident_id} version conflict: expected {expected}, found {found}")]
    Conflict {
        /// The incident id under contention.
        incident_id: String,
        /// The version the caller expected to update.
        expected: u64,
        /// The version actually stored.
        found: u64,
    },
}

/// Incident store: conditional-create plus CAS update.
pub trait IncidentStore {
    /// Conditionally creates `incident` by `incident.incident_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn create(&self, incident: Incident) -> Result<PutOutcome, StoreError>;

    /// Reads an incident by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure or integrity fault.
    fn get(&self, incident_id: &str) -> Result<Option<Incident>, StoreError>;

    /// Replaces the stored incident with `incident`, succeeding only if
    /// `expected_version` matches the currently stored version.
    ///
    /// # Errors
    ///
    /// Returns [`IncidentStoreError::NotFound`] if no incident exists at
    /// this id, [`IncidentStoreError::Conflict`] if `expected_version` is
    /// stale, or [`StoreError`] wrapped inside on I/O failure.
    fn update(&self, incident: Incident, expected_version: u64) -> Result<Incident, IncidentStoreOrConflict>;

    /// Lists incidents matching `filters`, newest-created first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn list(&self, filters: &IncidentFilters) -> Result<Vec<Incident>, StoreError>;
}

/// Combined error for [`IncidentStore::update`]: either a store I/O fault
/// or a state-level conflict/not-found.
#[derive(Debug, thiserror::Error)]
pub enum IncidentStoreOrConflict {
    /// Underlying store I/O failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The update was refused due to a missing record or version conflict.
    #[error(transparent)]
    State(#[from] IncidentStoreError),
}

const MAX_LIST_LIMIT: usize = 100;

/// Deterministic in-memory reference implementation of [`IncidentStore`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryIncidentStore {
    /// Incidents keyed by `incident_id`, paired with an insertion sequence
    /// for newest-first ordering.
    incidents: Arc<Mutex<BTreeMap<String, (u64, Incident)>>>,
    /// Monotonic insertion counter.
    sequence: Arc<Mutex<u64>>,
}

impl InMemoryIncidentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the incident map, translating a poisoned mutex into
    /// [`StoreError::Io`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, (u64, Incident)>>, StoreError> {
        self.incidents.lock().map_err(|_| StoreError::Io("incident store mutex poisoned".to_string()))
    }

    /// Returns the next insertion sequence number.
    fn next_sequence(&self) -> Result<u64, StoreError> {
        let mut guard = self.sequence.lock().map_err(|_| StoreError::Io("incident store sequence mutex poisoned".to_string()))?;
        *guard += 1;
        Ok(*guard)
    }
}

impl IncidentStore for InMemoryIncidentStore {
    fn create(&self, incident: Incident) -> Result<PutOutcome, StoreError> {
        let sequence = self.next_sequence()?;
        let mut guard = self.lock()?;
        if guard.contains_key(&incident.incident_id) {
            return Ok(PutOutcome::AlreadyExists);
        }
        guard.insert(incident.incident_id.clone(), (sequence, incident));
        Ok(PutOutcome::Created)
    }

    fn get(&self, incident_id: &str) -> Result<Option<Incident>, StoreError> {
        Ok(self.lock()?.get(incident_id).map(|(_, incident)| incident.clone()))
    }

    fn update(&self, incident: Incident, expected_version: u64) -> Result<Incident, IncidentStoreOrConflict> {
        let mut guard = self.lock()?;
        let Some((sequence, existing)) = guard.get(&incident.incident_id).cloned() else {
            return Err(IncidentStoreError::NotFound(incident.incident_id).into());
        };
        if existing.incident_version != expected_version {
            return Err(IncidentStoreError::Conflict {
                incident_id: incident.incident_id,
                expected: expected_version,
                found: existing.incident_version,
            }
            .into());
        }
        guard.insert(incident.incident_id.clone(), (sequence, incident.clone()));
        Ok(incident)
    }

    fn list(&self, filters: &IncidentFilters) -> Result<Vec<Incident>, StoreError> {
        let guard = self.lock()?;
        let limit = filters.limit.min(MAX_LIST_LIMIT).max(1);
        let mut matches: Vec<(u64, Incident)> = guard
            .values()
            .filter(|(_, incident)| filters.status.is_none_or(|status| incident.status == status))
            .filter(|(_, incident)| filters.service.as_deref().is_none_or(|service| incident.service == service))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(matches.into_iter().take(limit).map(|(_, incident)| incident).collect())
    }
}

/// Shared, clonable handle to an [`IncidentStore`] implementation.
#[derive(Clone)]
pub struct SharedIncidentStore {
    /// Inner store implementation.
    inner: Arc<dyn IncidentStore + Send + Sync>,
}

impl SharedIncidentStore {
    /// Wraps an incident store in a shared, clonable handle.
    #[must_use]
    pub fn from_store(store: impl IncidentStore + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(store) }
    }
}

impl IncidentStore for SharedIncidentStore {
    fn create(&self, incident: Incident) -> Result<PutOutcome, StoreError> {
        self.inner.create(incident)
    }

    fn get(&self, incident_id: &str) -> Result<Option<Incident>, StoreError> {
        self.inner.get(incident_id)
    }

    fn update(&self, incident: Incident, expected_version: u64) -> Result<Incident, IncidentStoreOrConflict> {
        self.inner.update(incident, expected_version)
    }

    fn list(&self, filters: &IncidentFilters) -> Result<Vec<Incident>, StoreError> {
        self.inner.list(filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opx_core::authority::Authority;
    use opx_core::incident::IncidentTimestamps;
    use opx_core::signal::NormalizedSeverity;
    use opx_core::time::Timestamp;

    fn incident(id: &str, service: &str) -> Incident {
        Incident {
            incident_id: id.to_string(),
            service: service.to_string(),
            severity: NormalizedSeverity::High,
            status: IncidentStatus::Pending,
            evidence_id: "evid1".to_string(),
            candidate_id: "cand1".to_string(),
            confidence_score: 0.7,
            timestamps: IncidentTimestamps {
                created_at: Some(Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts")),
                ..Default::default()
            },
            resolution: None,
            title: "title".to_string(),
            description: "description".to_string(),
            tags: vec![],
            created_by: Authority::system(),
            last_modified_by: Authority::system(),
            incident_version: 0,
            blast_radius_scope: None,
            detection_count: 2,
            evidence_graph_count: 1,
        }
    }

    #[test]
    fn create_twice_is_idempotent() {
        let store = InMemoryIncidentStore::new();
        assert_eq!(store.create(incident("inc1", "checkout")).expect("create"), PutOutcome::Created);
        assert_eq!(store.create(incident("inc1", "checkout")).expect("create"), PutOutcome::AlreadyExists);
    }

    #[test]
    fn update_with_stale_version_conflicts() {
        let store = InMemoryIncidentStore::new();
        store.create(incident("inc1", "checkout")).expect("create");
        let mut updated = incident("inc1", "checkout");
        updated.status = IncidentStatus::Open;
        updated.incident_version = 1;
        let err = store.update(updated, 5).unwrap_err();
        assert!(matches!(err, IncidentStoreOrConflict::State(IncidentStoreError::Conflict { expected: 5, found: 0, .. })));
    }

    #[test]
    fn update_against_missing_incident_is_not_found() {
        let store = InMemoryIncidentStore::new();
        let err = store.update(incident("missing", "checkout"), 0).unwrap_err();
        assert!(matches!(err, IncidentStoreOrConflict::State(IncidentStoreError::NotFound(_))));
    }

    #[test]
    fn list_filters_by_status_and_service_and_caps_limit() {
        let store = InMemoryIncidentStore::new();
        store.create(incident("inc1", "checkout")).expect("create");
        store.create(incident("inc2", "payments")).expect("create");
        let checkout_only = store
            .list(&IncidentFilters {
                status: Some(IncidentStatus::Pending),
                service: Some("checkout".to_string()),
                limit: 100,
            })
            .expect("list");
        assert_eq!(checkout_only.len(), 1);
        assert_eq!(checkout_only[0].incident_id, "inc1");

        let capped = store
            .list(&IncidentFilters {
                status: None,
                service: None,
                limit: 1000,
            })
            .expect("list");
        assert!(capped.len() <= 100);
    }
}
