// crates/opx-stores/src/audit_store.rs
// ============================================================================
// Module: Audit Store
// Description: Create-if-absent store for automation audit records, with a
// single allowed in-place transition from RUNNING to a terminal status.
// Purpose: Back opx_core::audit's start/succeed/fail lifecycle.
// Dependencies: opx_core::audit, crate::error
// ============================================================================

//! ## Overview
//! `create` is conditional on `audit_id` absence. `update_status` is the
//! only mutation this store allows, and only RUNNING -> terminal exactly
//! once; a second update attempt against an already-terminal record is
//! refused rather than silently overwritten, since the audit log exists
//! precisely to make automation runs reviewable after the fact.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use opx_core::audit::AuditStatus;
use opx_core::audit::AutomationAudit;

use crate::error::PutOutcome;
use crate::error::StoreError;

/// Why an audit status update was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditStoreError {
    /// No audit exists at this id.
    #[error("audit {0} does not exist")]
    NotFound(String),
    /// The audit is already in a terminal status and cannot be updated
    /// again.
    #[error("audit {0} is already terminal")]
    AlreadyTerminal(String),
}

/// Combined error for [`AuditStore::replace`]: either a store I/O fault or
/// a state-level refusal.
#[derive(Debug, thiserror::Error)]
pub enum AuditStoreOrState {
    /// Underlying store I/O failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The update was refused.
    #[error(transparent)]
    State(#[from] AuditStoreError),
}

/// Create-if-absent store for [`AutomationAudit`] records.
pub trait AuditStore {
    /// Conditionally creates `audit` by `audit.audit_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn create(&self, audit: AutomationAudit) -> Result<PutOutcome, StoreError>;

    /// Reads an audit by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure or integrity fault.
    fn get(&self, audit_id: &str) -> Result<Option<AutomationAudit>, StoreError>;

    /// Replaces the stored RUNNING audit with `audit`, which must have
    /// reached a terminal status; refuses if the stored record is already
    /// terminal or missing.
    ///
    /// # Errors
    ///
    /// Returns [`AuditStoreError`] if the stored record is missing or
    /// already terminal, or [`StoreError`] on I/O failure.
    fn replace(&self, audit: AutomationAudit) -> Result<AutomationAudit, AuditStoreOrState>;

    /// Lists the most recent audits, optionally filtered to a status,
    /// newest-started first, bounded by `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn list_recent(&self, status: Option<AuditStatus>, limit: usize) -> Result<Vec<AutomationAudit>, StoreError>;
}

/// Deterministic in-memory reference implementation of [`AuditStore`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditStore {
    /// Audits keyed by `audit_id`, paired with an insertion sequence.
    audits: Arc<Mutex<BTreeMap<String, (u64, AutomationAudit)>>>,
    /// Monotonic insertion counter.
    sequence: Arc<Mutex<u64>>,
}

impl InMemoryAuditStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the audit map, translating a poisoned mutex into
    /// [`StoreError::Io`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, (u64, AutomationAudit)>>, StoreError> {
        self.audits.lock().map_err(|_| StoreError::Io("audit store mutex poisoned".to_string()))
    }

    /// Returns the next insertion sequence number.
    fn next_sequence(&self) -> Result<u64, StoreError> {
        let mut guard = self.sequence.lock().map_err(|_| StoreError::Io("audit store sequence mutex poisoned".to_string()))?;
        *guard += 1;
        Ok(*guard)
    }
}

impl AuditStore for InMemoryAuditStore {
    fn create(&self, audit: AutomationAudit) -> Result<PutOutcome, StoreError> {
        let sequence = self.next_sequence()?;
        let mut guard = self.lock()?;
        if guard.contains_key(&audit.audit_id) {
            return Ok(PutOutcome::AlreadyExists);
        }
        guard.insert(audit.audit_id.clone(), (sequence, audit));
        Ok(PutOutcome::Created)
    }

    fn get(&self, audit_id: &str) -> Result<Option<AutomationAudit>, StoreError> {
        Ok(self.lock()?.get(audit_id).map(|(_, audit)| audit.clone()))
    }

    fn replace(&self, audit: AutomationAudit) -> Result<AutomationAudit, AuditStoreOrState> {
        let mut guard = self.lock()?;
        let Some((sequence, existing)) = guard.get(&audit.audit_id).cloned() else {
            return Err(AuditStoreError::NotFound(audit.audit_id).into());
        };
        if existing.status != AuditStatus::Running {
            return Err(AuditStoreError::AlreadyTerminal(audit.audit_id).into());
        }
        guard.insert(audit.audit_id.clone(), (sequence, audit.clone()));
        Ok(audit)
    }

    fn list_recent(&self, status: Option<AuditStatus>, limit: usize) -> Result<Vec<AutomationAudit>, StoreError> {
        let guard = self.lock()?;
        let mut matches: Vec<(u64, AutomationAudit)> =
            guard.values().filter(|(_, audit)| status.is_none_or(|status| audit.status == status)).cloned().collect();
        matches.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(matches.into_iter().take(limit).map(|(_, audit)| audit).collect())
    }
}

/// Shared, clonable handle to an [`AuditStore`] implementation.
#[derive(Clone)]
pub struct SharedAuditStore {
    /// Inner store implementation.
    inner: Arc<dyn AuditStore + Send + Sync>,
}

impl SharedAuditStore {
    /// Wraps an audit store in a shared, clonable handle.
    #[must_use]
    pub fn from_store(store: impl AuditStore + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(store) }
    }
}

impl AuditStore for SharedAuditStore {
    fn create(&self, audit: AutomationAudit) -> Result<PutOutcome, StoreError> {
        self.inner.create(audit)
    }

    fn get(&self, audit_id: &str) -> Result<Option<AutomationAudit>, StoreError> {
        self.inner.get(audit_id)
    }

    fn replace(&self, audit: AutomationAudit) -> Result<AutomationAudit, AuditStoreOrState> {
        self.inner.replace(audit)
    }

    fn list_recent(&self, status: Option<AuditStatus>, limit: usize) -> Result<Vec<AutomationAudit>, StoreError> {
        self.inner.list_recent(status, limit)
    }
}
