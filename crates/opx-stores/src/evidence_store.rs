// crates/opx-stores/src/evidence_store.rs
// ============================================================================
// Module: Evidence Store
// Description: Append-only store for evidence bundles.
// Purpose: Conditional-create by evidenceId with a by-service index.
// Dependencies: opx_core::evidence, crate::error
// ============================================================================

//! ## Overview
//! Evidence bundles are immutable once produced by the (out-of-core-scope)
//! bundling pipeline; this store only ever creates or reads them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use opx_core::evidence::EvidenceBundle;

use crate::error::PutOutcome;
use crate::error::StoreError;

/// Append-only store for [`EvidenceBundle`] records.
pub trait EvidenceStore {
    /// Conditionally creates `bundle` by `bundle.evidence_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn put(&self, bundle: EvidenceBundle) -> Result<PutOutcome, StoreError>;

    /// Reads an evidence bundle by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure or integrity fault.
    fn get(&self, evidence_id: &str) -> Result<Option<EvidenceBundle>, StoreError>;

    /// Lists evidence bundles for `service`, newest first, bounded by
    /// `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn list_by_service(&self, service: &str, limit: usize) -> Result<Vec<EvidenceBundle>, StoreError>;
}

/// Deterministic in-memory reference implementation of [`EvidenceStore`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryEvidenceStore {
    /// Bundles keyed by `evidence_id`, paired with an insertion sequence.
    bundles: Arc<Mutex<BTreeMap<String, (u64, EvidenceBundle)>>>,
    /// Monotonic insertion counter.
    sequence: Arc<Mutex<u64>>,
}

impl InMemoryEvidenceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the bundle map, translating a poisoned mutex into
    /// [`StoreError::Io`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, (u64, EvidenceBundle)>>, StoreError> {
        self.bundles.lock().map_err(|_| StoreError::Io("evidence store mutex poisoned".to_string()))
    }

    /// Returns the next insertion sequence number.
    fn next_sequence(&self) -> Result<u64, StoreError> {
        let mut guard = self.sequence.lock().map_err(|_| StoreError::Io("evidence store sequence mutex poisoned".to_string()))?;
        *guard += 1;
        Ok(*guard)
    }
}

impl EvidenceStore for InMemoryEvidenceStore {
    fn put(&self, bundle: EvidenceBundle) -> Result<PutOutcome, StoreError> {
        let sequence = self.next_sequence()?;
        let mut guard = self.lock()?;
        if guard.contains_key(&bundle.evidence_id) {
            return Ok(PutOutcome::AlreadyExists);
        }
        guard.insert(bundle.evidence_id.clone(), (sequence, bundle));
        Ok(PutOutcome::Created)
    }

    fn get(&self, evidence_id: &str) -> Result<Option<EvidenceBundle>, StoreError> {
        Ok(self.lock()?.get(evidence_id).map(|(_, bundle)| bundle.clone()))
    }

    fn list_by_service(&self, service: &str, limit: usize) -> Result<Vec<EvidenceBundle>, StoreError> {
        let guard = self.lock()?;
        let mut matches: Vec<(u64, EvidenceBundle)> = guard.values().filter(|(_, bundle)| bundle.service == service).cloned().collect();
        matches.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(matches.into_iter().take(limit).map(|(_, bundle)| bundle).collect())
    }
}

/// Shared, clonable handle to an [`EvidenceStore`] implementation.
#[derive(Clone)]
pub struct SharedEvidenceStore {
    /// Inner store implementation.
    inner: Arc<dyn EvidenceStore + Send + Sync>,
}

impl SharedEvidenceStore {
    /// Wraps an evidence store in a shared, clonable handle.
    #[must_use]
    pub fn from_store(store: impl EvidenceStore + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(store) }
    }
}

impl EvidenceStore for SharedEvidenceStore {
    fn put(&self, bundle: EvidenceBundle) -> Result<PutOutcome, StoreError> {
        self.inner.put(bundle)
    }

    fn get(&self, evidence_id: &str) -> Result<Option<EvidenceBundle>, StoreError> {
        self.inner.get(evidence_id)
    }

    fn list_by_service(&self, service: &str, limit: usize) -> Result<Vec<EvidenceBundle>, StoreError> {
        self.inner.list_by_service(service, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opx_core::evidence::SignalSummary;
    use opx_core::time::Timestamp;
    use std::collections::BTreeMap as Map;

    fn bundle(id: &str, service: &str) -> EvidenceBundle {
        EvidenceBundle {
            evidence_id: id.to_string(),
            service: service.to_string(),
            detections: vec![],
            window_start: Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts"),
            window_end: Timestamp::parse("2026-03-05T01:00:00.000Z").expect("ts"),
            bundled_at: Timestamp::parse("2026-03-05T01:00:01.000Z").expect("ts"),
            signal_summary: SignalSummary {
                signal_count: 0,
                severity_distribution: Map::new(),
                time_spread_seconds: 0,
                unique_rules: 0,
            },
        }
    }

    #[test]
    fn put_is_conditional_create() {
        let store = InMemoryEvidenceStore::new();
        assert_eq!(store.put(bundle("e1", "checkout")).expect("put"), PutOutcome::Created);
        assert_eq!(store.put(bundle("e1", "checkout")).expect("put"), PutOutcome::AlreadyExists);
    }

    #[test]
    fn list_by_service_orders_newest_first() {
        let store = InMemoryEvidenceStore::new();
        store.put(bundle("e1", "checkout")).expect("put");
        store.put(bundle("e2", "checkout")).expect("put");
        let results = store.list_by_service("checkout", 10).expect("list");
        assert_eq!(results[0].evidence_id, "e2");
        assert_eq!(results[1].evidence_id, "e1");
    }
}
