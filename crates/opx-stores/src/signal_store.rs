// crates/opx-stores/src/signal_store.rs
// ============================================================================
// Module: Signal Store
// Description: Append-only store for normalized signals.
// Purpose: Conditional-create by signalId with a by-service index.
// Dependencies: opx_core::signal, crate::error
// ============================================================================

//! ## Overview
//! Signals are created once by the normalizer and never mutated;
//! duplicates collapse by id via conditional-create.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use opx_core::signal::Signal;

use crate::error::PutOutcome;
use crate::error::StoreError;

/// Append-only store for [`Signal`] records.
pub trait SignalStore {
    /// Conditionally creates `signal` by `signal.signal_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn put(&self, signal: Signal) -> Result<PutOutcome, StoreError>;

    /// Reads a signal by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure or integrity fault.
    fn get(&self, signal_id: &str) -> Result<Option<Signal>, StoreError>;

    /// Lists signals for `service`, newest first, bounded by `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn list_by_service(&self, service: &str, limit: usize) -> Result<Vec<Signal>, StoreError>;
}

/// Deterministic in-memory reference implementation of [`SignalStore`].
#[derive(Debug, Default, Clone)]
pub struct InMemorySignalStore {
    /// Signals keyed by `signal_id`, insertion-ordered via a monotonic
    /// sequence counter stored alongside each entry.
    signals: Arc<Mutex<BTreeMap<String, (u64, Signal)>>>,
    /// Monotonic insertion counter.
    sequence: Arc<Mutex<u64>>,
}

impl InMemorySignalStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the signal map, translating a poisoned mutex into
    /// [`StoreError::Io`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, (u64, Signal)>>, StoreError> {
        self.signals.lock().map_err(|_| StoreError::Io("signal store mutex poisoned".to_string()))
    }

    /// Returns the next insertion sequence number.
    fn next_sequence(&self) -> Result<u64, StoreError> {
        let mut guard = self.sequence.lock().map_err(|_| StoreError::Io("signal store sequence mutex poisoned".to_string()))?;
        *guard += 1;
        Ok(*guard)
    }
}

impl SignalStore for InMemorySignalStore {
    fn put(&self, signal: Signal) -> Result<PutOutcome, StoreError> {
        let sequence = self.next_sequence()?;
        let mut guard = self.lock()?;
        if guard.contains_key(&signal.signal_id) {
            return Ok(PutOutcome::AlreadyExists);
        }
        guard.insert(signal.signal_id.clone(), (sequence, signal));
        Ok(PutOutcome::Created)
    }

    fn get(&self, signal_id: &str) -> Result<Option<Signal>, StoreError> {
        Ok(self.lock()?.get(signal_id).map(|(_, signal)| signal.clone()))
    }

    fn list_by_service(&self, service: &str, limit: usize) -> Result<Vec<Signal>, StoreError> {
        let guard = self.lock()?;
        let mut matches: Vec<(u64, Signal)> = guard.values().filter(|(_, signal)| signal.service == service).cloned().collect();
        matches.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(matches.into_iter().take(limit).map(|(_, signal)| signal).collect())
    }
}

/// Shared, clonable handle to a [`SignalStore`] implementation.
#[derive(Clone)]
pub struct SharedSignalStore {
    /// Inner store implementation.
    inner: Arc<dyn SignalStore + Send + Sync>,
}

impl SharedSignalStore {
    /// Wraps a signal store in a shared, clonable handle.
    #[must_use]
    pub fn from_store(store: impl SignalStore + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(store) }
    }
}

impl SignalStore for SharedSignalStore {
    fn put(&self, signal: Signal) -> Result<PutOutcome, StoreError> {
        self.inner.put(signal)
    }

    fn get(&self, signal_id: &str) -> Result<Option<Signal>, StoreError> {
        self.inner.get(signal_id)
    }

    fn list_by_service(&self, service: &str, limit: usize) -> Result<Vec<Signal>, StoreError> {
        self.inner.list_by_service(service, limit)
    }
}
