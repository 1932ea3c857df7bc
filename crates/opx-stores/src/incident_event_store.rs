// crates/opx-stores/src/incident_event_store.rs
// ============================================================================
// Module: Incident Event Store
// Description: Append-only audit log of incident state transitions.
// Purpose: Conditional-create by eventId, ordered read by
// (incidentId, createdAt, eventId) for replay/audit purposes.
// Dependencies: opx_core::incident, crate::error
// ============================================================================

//! ## Overview
//! Every transition recorded by [`crate::incident_store`] has a matching
//! [`IncidentEvent`] appended here; this store never overwrites or deletes,
//! it only accumulates the ledger.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use opx_core::incident::IncidentEvent;

use crate::error::PutOutcome;
use crate::error::StoreError;

/// Append-only store for [`IncidentEvent`] records.
pub trait IncidentEventStore {
    /// Conditionally creates `event` by `event.event_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn append(&self, event: IncidentEvent) -> Result<PutOutcome, StoreError>;

    /// Lists the full event history for `incident_id` in chronological
    /// order (`created_at` ascending, `event_id` as tiebreak).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn list_by_incident(&self, incident_id: &str) -> Result<Vec<IncidentEvent>, StoreError>;
}

/// Deterministic in-memory reference implementation of
/// [`IncidentEventStore`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryIncidentEventStore {
    /// Events keyed by `event_id`.
    events: Arc<Mutex<BTreeMap<String, IncidentEvent>>>,
}

impl InMemoryIncidentEventStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the event map, translating a poisoned mutex into
    /// [`StoreError::Io`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, IncidentEvent>>, StoreError> {
        self.events.lock().map_err(|_| StoreError::Io("incident event store mutex poisoned".to_string()))
    }
}

impl IncidentEventStore for InMemoryIncidentEventStore {
    fn append(&self, event: IncidentEvent) -> Result<PutOutcome, StoreError> {
        let mut guard = self.lock()?;
        if guard.contains_key(&event.event_id) {
            return Ok(PutOutcome::AlreadyExists);
        }
        guard.insert(event.event_id.clone(), event);
        Ok(PutOutcome::Created)
    }

    fn list_by_incident(&self, incident_id: &str) -> Result<Vec<IncidentEvent>, StoreError> {
        let guard = self.lock()?;
        let mut matches: Vec<IncidentEvent> = guard.values().filter(|event| event.incident_id == incident_id).cloned().collect();
        matches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.event_id.cmp(&b.event_id)));
        Ok(matches)
    }
}

/// Shared, clonable handle to an [`IncidentEventStore`] implementation.
#[derive(Clone)]
pub struct SharedIncidentEventStore {
    /// Inner store implementation.
    inner: Arc<dyn IncidentEventStore + Send + Sync>,
}

impl SharedIncidentEventStore {
    /// Wraps an incident event store in a shared, clonable handle.
    #[must_use]
    pub fn from_store(store: impl IncidentEventStore + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(store) }
    }
}

impl IncidentEventStore for SharedIncidentEventStore {
    fn append(&self, event: IncidentEvent) -> Result<PutOutcome, StoreError> {
        self.inner.append(event)
    }

    fn list_by_incident(&self, incident_id: &str) -> Result<Vec<IncidentEvent>, StoreError> {
        self.inner.list_by_incident(incident_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opx_core::incident::IncidentEventType;
    use opx_core::time::Timestamp;
    use serde_json::json;

    fn event(event_id: &str, incident_id: &str, at: &str) -> IncidentEvent {
        IncidentEvent {
            event_id: event_id.to_string(),
            incident_id: incident_id.to_string(),
            event_type: IncidentEventType::StateTransitioned,
            created_at: Timestamp::parse(at).expect("ts"),
            payload: json!({"from": "PENDING", "to": "OPEN"}),
        }
    }

    #[test]
    fn append_twice_is_idempotent() {
        let store = InMemoryIncidentEventStore::new();
        let e = event("ev1", "inc1", "2026-03-05T00:00:00.000Z");
        assert_eq!(store.append(e.clone()).expect("append"), PutOutcome::Created);
        assert_eq!(store.append(e).expect("append"), PutOutcome::AlreadyExists);
    }

    #[test]
    fn list_by_incident_is_chronological() {
        let store = InMemoryIncidentEventStore::new();
        store.append(event("ev2", "inc1", "2026-03-05T01:00:00.000Z")).expect("append");
        store.append(event("ev1", "inc1", "2026-03-05T00:00:00.000Z")).expect("append");
        store.append(event("ev3", "inc2", "2026-03-05T00:00:00.000Z")).expect("append");
        let history = store.list_by_incident("inc1").expect("list");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].event_id, "ev1");
        assert_eq!(history[1].event_id, "ev2");
    }
}
