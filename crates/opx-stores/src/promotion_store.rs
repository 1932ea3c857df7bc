// crates/opx-stores/src/promotion_store.rs
// ============================================================================
// Module: Promotion Store
// Description: Append-only store for promotion results, keyed by decision.
// Purpose: Guarantee exactly one authoritative decision per incident (on
// PROMOTE) or per candidate (on REJECT) via conditional-create.
// Dependencies: opx_core::promotion, crate::error
// ============================================================================

//! ## Overview
//! `put` keys a PROMOTE result by `INCIDENT#{incidentId}` and a REJECT
//! result by `CANDIDATE#{candidateId}`, matching spec's "persisted in the
//! promotion store keyed by `INCIDENT#{incidentId}` for PROMOTE and
//! `CANDIDATE#{candidateId}` for REJECT" rule.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use opx_core::promotion::Decision;
use opx_core::promotion::PromotionResult;

use crate::error::PutOutcome;
use crate::error::StoreError;

/// The key a [`PromotionResult`] is conditionally created under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PromotionKey {
    /// Keyed by incident id, for a PROMOTE decision.
    Incident(String),
    /// Keyed by candidate id, for a REJECT decision.
    Candidate(String),
}

impl PromotionKey {
    /// Derives the store key for `result` per its decision variant.
    #[must_use]
    pub fn for_result(result: &PromotionResult) -> Self {
        match &result.decision {
            Decision::Promote { incident_id } => Self::Incident(incident_id.clone()),
            Decision::Reject { .. } => Self::Candidate(result.candidate_id.clone()),
        }
    }
}

/// Append-only store for [`PromotionResult`] records.
pub trait PromotionStore {
    /// Conditionally creates `result` under its derived [`PromotionKey`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn put(&self, result: PromotionResult) -> Result<PutOutcome, StoreError>;

    /// Reads a promotion result by its incident key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure or integrity fault.
    fn get_by_incident(&self, incident_id: &str) -> Result<Option<PromotionResult>, StoreError>;

    /// Reads a promotion result by its candidate key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure or integrity fault.
    fn get_by_candidate(&self, candidate_id: &str) -> Result<Option<PromotionResult>, StoreError>;
}

/// Deterministic in-memory reference implementation of [`PromotionStore`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryPromotionStore {
    /// Results keyed by their derived [`PromotionKey`].
    results: Arc<Mutex<BTreeMap<PromotionKey, PromotionResult>>>,
}

impl InMemoryPromotionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the result map, translating a poisoned mutex into
    /// [`StoreError::Io`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<PromotionKey, PromotionResult>>, StoreError> {
        self.results.lock().map_err(|_| StoreError::Io("promotion store mutex poisoned".to_string()))
    }
}

impl PromotionStore for InMemoryPromotionStore {
    fn put(&self, result: PromotionResult) -> Result<PutOutcome, StoreError> {
        let key = PromotionKey::for_result(&result);
        let mut guard = self.lock()?;
        if guard.contains_key(&key) {
            return Ok(PutOutcome::AlreadyExists);
        }
        guard.insert(key, result);
        Ok(PutOutcome::Created)
    }

    fn get_by_incident(&self, incident_id: &str) -> Result<Option<PromotionResult>, StoreError> {
        Ok(self.lock()?.get(&PromotionKey::Incident(incident_id.to_string())).cloned())
    }

    fn get_by_candidate(&self, candidate_id: &str) -> Result<Option<PromotionResult>, StoreError> {
        Ok(self.lock()?.get(&PromotionKey::Candidate(candidate_id.to_string())).cloned())
    }
}

/// Shared, clonable handle to a [`PromotionStore`] implementation.
#[derive(Clone)]
pub struct SharedPromotionStore {
    /// Inner store implementation.
    inner: Arc<dyn PromotionStore + Send + Sync>,
}

impl SharedPromotionStore {
    /// Wraps a promotion store in a shared, clonable handle.
    #[must_use]
    pub fn from_store(store: impl PromotionStore + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(store) }
    }
}

impl PromotionStore for SharedPromotionStore {
    fn put(&self, result: PromotionResult) -> Result<PutOutcome, StoreError> {
        self.inner.put(result)
    }

    fn get_by_incident(&self, incident_id: &str) -> Result<Option<PromotionResult>, StoreError> {
        self.inner.get_by_incident(incident_id)
    }

    fn get_by_candidate(&self, candidate_id: &str) -> Result<Option<PromotionResult>, StoreError> {
        self.inner.get_by_candidate(candidate_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opx_core::confidence::ConfidenceBand;
    use opx_core::promotion::EvidenceWindow;
    use opx_core::promotion::RejectionCode;
    use opx_core::time::Timestamp;

    fn base(decision: Decision, candidate_id: &str) -> PromotionResult {
        PromotionResult {
            decision,
            candidate_id: candidate_id.to_string(),
            evidence_id: "evid1".to_string(),
            confidence_score: 0.7,
            confidence_band: ConfidenceBand::High,
            evidence_window: EvidenceWindow {
                start: Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts"),
                end: Timestamp::parse("2026-03-05T01:00:00.000Z").expect("ts"),
            },
            evaluated_at: Timestamp::parse("2026-03-05T01:00:01.000Z").expect("ts"),
            gate_version: "gate-v1.0.0".to_string(),
        }
    }

    #[test]
    fn promote_is_keyed_by_incident_id() {
        let store = InMemoryPromotionStore::new();
        let result = base(
            Decision::Promote {
                incident_id: "inc1".to_string(),
            },
            "cand1",
        );
        assert_eq!(store.put(result).expect("put"), PutOutcome::Created);
        assert!(store.get_by_incident("inc1").expect("get").is_some());
        assert!(store.get_by_candidate("cand1").expect("get").is_none());
    }

    #[test]
    fn reject_is_keyed_by_candidate_id() {
        let store = InMemoryPromotionStore::new();
        let result = base(
            Decision::Reject {
                rejection_reason: "confidence too low".to_string(),
                rejection_code: RejectionCode::ConfidenceTooLow,
            },
            "cand1",
        );
        assert_eq!(store.put(result).expect("put"), PutOutcome::Created);
        assert!(store.get_by_candidate("cand1").expect("get").is_some());
    }

    #[test]
    fn second_put_for_same_key_is_already_exists() {
        let store = InMemoryPromotionStore::new();
        let result = base(
            Decision::Promote {
                incident_id: "inc1".to_string(),
            },
            "cand1",
        );
        store.put(result.clone()).expect("put");
        assert_eq!(store.put(result).expect("put"), PutOutcome::AlreadyExists);
    }
}
