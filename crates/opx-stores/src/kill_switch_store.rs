// crates/opx-stores/src/kill_switch_store.rs
// ============================================================================
// Module: Kill Switch Store
// Description: Single-document global automation gate.
// Purpose: Hold `{enabled, disabledAt?, disabledBy?, reason?, lastModified}`;
// absent means inactive.
// Dependencies: opx_core::authority, crate::error
// ============================================================================

//! ## Overview
//! Reads are eventually consistent by design — kill-switch disable is an
//! emergency best-effort affordance, not a transactional lock — and a read
//! failure is fail-open (treated as inactive) at the caller, not here.

use std::sync::Arc;
use std::sync::Mutex;

use opx_core::authority::Authority;
use opx_core::time::Timestamp;

use crate::error::StoreError;

/// The single kill-switch document.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct KillSwitch {
    /// Whether automation is currently permitted to run.
    pub enabled: bool,
    /// When the switch was last disabled, if ever.
    pub disabled_at: Option<Timestamp>,
    /// Who last disabled the switch, if ever.
    pub disabled_by: Option<Authority>,
    /// The reason given for the most recent disable.
    pub reason: Option<String>,
    /// When this document was last written.
    pub last_modified: Timestamp,
}

impl KillSwitch {
    /// The default document when none has ever been written: enabled,
    /// meaning the kill switch is inactive.
    #[must_use]
    pub fn absent_default(now: Timestamp) -> Self {
        Self {
            enabled: true,
            disabled_at: None,
            disabled_by: None,
            reason: None,
            last_modified: now,
        }
    }

    /// `isActive() = !enabled`.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.enabled
    }
}

/// Single-document store for the automation kill switch.
pub trait KillSwitchStore {
    /// Reads the current document, or `None` if it has never been written
    /// (callers should then treat the switch as inactive).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn read(&self) -> Result<Option<KillSwitch>, StoreError>;

    /// Overwrites the document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn write(&self, switch: KillSwitch) -> Result<(), StoreError>;
}

/// Deterministic in-memory reference implementation of [`KillSwitchStore`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryKillSwitchStore {
    /// The current document, if one has been written.
    switch: Arc<Mutex<Option<KillSwitch>>>,
}

impl InMemoryKillSwitchStore {
    /// Creates a store with no document written (inactive by default).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KillSwitchStore for InMemoryKillSwitchStore {
    fn read(&self) -> Result<Option<KillSwitch>, StoreError> {
        Ok(self.switch.lock().map_err(|_| StoreError::Io("kill switch mutex poisoned".to_string()))?.clone())
    }

    fn write(&self, switch: KillSwitch) -> Result<(), StoreError> {
        *self.switch.lock().map_err(|_| StoreError::Io("kill switch mutex poisoned".to_string()))? = Some(switch);
        Ok(())
    }
}

/// Shared, clonable handle to a [`KillSwitchStore`] implementation.
#[derive(Clone)]
pub struct SharedKillSwitchStore {
    /// Inner store implementation.
    inner: Arc<dyn KillSwitchStore + Send + Sync>,
}

impl SharedKillSwitchStore {
    /// Wraps a kill switch store in a shared, clonable handle.
    #[must_use]
    pub fn from_store(store: impl KillSwitchStore + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(store) }
    }
}

impl KillSwitchStore for SharedKillSwitchStore {
    fn read(&self) -> Result<Option<KillSwitch>, StoreError> {
        self.inner.read()
    }

    fn write(&self, switch: KillSwitch) -> Result<(), StoreError> {
        self.inner.write(switch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_document_reads_as_none_and_defaults_inactive() {
        let store = InMemoryKillSwitchStore::new();
        assert!(store.read().expect("read").is_none());
        let now = Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts");
        assert!(!KillSwitch::absent_default(now).is_active());
    }

    #[test]
    fn disabling_makes_the_switch_active() {
        let store = InMemoryKillSwitchStore::new();
        let now = Timestamp::parse("2026-03-05T00:00:00.000Z").expect("ts");
        let switch = KillSwitch {
            enabled: false,
            disabled_at: Some(now),
            disabled_by: Some(Authority::system()),
            reason: Some("incident storm".to_string()),
            last_modified: now,
        };
        store.write(switch).expect("write");
        let read_back = store.read().expect("read").expect("present");
        assert!(read_back.is_active());
    }
}
