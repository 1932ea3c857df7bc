// crates/opx-stores/src/rate_limit_store.rs
// ============================================================================
// Module: Rate Limit Store
// Description: Append-only, TTL'd counters for manual-trigger rate limits.
// Purpose: Back `checkRateLimit(principal, operationType)` with per-key
// isolation; fail-open belongs to the caller, not this store.
// Dependencies: opx_core::audit::OperationType, crate::error
// ============================================================================

//! ## Overview
//! Every call records `{PK=(principal, operationType), SK=timestamp,
//! ttl=2*windowMs}`; `count_since` answers "how many entries for this key
//! have a timestamp after this cutoff" and `oldest_since` answers "what is
//! the earliest of those," which is all `checkRateLimit`'s retry-after math
//! needs. Expired entries are swept lazily on the next write rather than by
//! a background task, since the crate has no scheduler to run one.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use opx_core::audit::OperationType;
use opx_core::time::Timestamp;

use crate::error::StoreError;

/// The `(principal, operationType)` key entries are bucketed under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RateLimitKey {
    /// The calling principal.
    pub principal: String,
    /// The operation being rate-limited.
    pub operation_type: OperationType,
}

/// A single recorded invocation, with the time it expires and can be
/// swept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    /// When the invocation was recorded.
    recorded_at: Timestamp,
    /// When this entry becomes eligible for sweeping (`2 * windowMs` after
    /// `recorded_at`).
    expires_at: Timestamp,
}

/// Append-only, TTL'd store of manual-trigger invocation timestamps.
pub trait RateLimitStore {
    /// Records a new invocation for `key` at `now`, sweepable once
    /// `expires_at` passes. Callers compute `expires_at = now + 2 *
    /// windowMs` per spec's TTL rule.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn record(&self, key: &RateLimitKey, now: Timestamp, expires_at: Timestamp) -> Result<(), StoreError>;

    /// Counts unexpired entries for `key` recorded strictly after `since`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn count_since(&self, key: &RateLimitKey, since: Timestamp) -> Result<u32, StoreError>;

    /// Returns the oldest unexpired entry for `key` recorded strictly
    /// after `since`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    fn oldest_since(&self, key: &RateLimitKey, since: Timestamp) -> Result<Option<Timestamp>, StoreError>;
}

/// Deterministic in-memory reference implementation of [`RateLimitStore`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryRateLimitStore {
    /// Entries keyed by `(principal, operationType)`.
    entries: Arc<Mutex<BTreeMap<RateLimitKey, Vec<Entry>>>>,
}

impl InMemoryRateLimitStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the entry map, translating a poisoned mutex into
    /// [`StoreError::Io`].
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<RateLimitKey, Vec<Entry>>>, StoreError> {
        self.entries.lock().map_err(|_| StoreError::Io("rate limit store mutex poisoned".to_string()))
    }

    /// Drops entries in `bucket` that have expired as of `now`.
    fn sweep(bucket: &mut Vec<Entry>, now: Timestamp) {
        bucket.retain(|entry| entry.expires_at > now);
    }
}

impl RateLimitStore for InMemoryRateLimitStore {
    fn record(&self, key: &RateLimitKey, now: Timestamp, expires_at: Timestamp) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let bucket = guard.entry(key.clone()).or_default();
        Self::sweep(bucket, now);
        bucket.push(Entry { recorded_at: now, expires_at });
        Ok(())
    }

    fn count_since(&self, key: &RateLimitKey, since: Timestamp) -> Result<u32, StoreError> {
        let guard = self.lock()?;
        let Some(bucket) = guard.get(key) else {
            return Ok(0);
        };
        Ok(bucket.iter().filter(|entry| entry.recorded_at > since).count() as u32)
    }

    fn oldest_since(&self, key: &RateLimitKey, since: Timestamp) -> Result<Option<Timestamp>, StoreError> {
        let guard = self.lock()?;
        let Some(bucket) = guard.get(key) else {
            return Ok(None);
        };
        Ok(bucket.iter().filter(|entry| entry.recorded_at > since).map(|entry| entry.recorded_at).min())
    }
}

/// Shared, clonable handle to a [`RateLimitStore`] implementation.
#[derive(Clone)]
pub struct SharedRateLimitStore {
    /// Inner store implementation.
    inner: Arc<dyn RateLimitStore + Send + Sync>,
}

impl SharedRateLimitStore {
    /// Wraps a rate limit store in a shared, clonable handle.
    #[must_use]
    pub fn from_store(store: impl RateLimitStore + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(store) }
    }
}

impl RateLimitStore for SharedRateLimitStore {
    fn record(&self, key: &RateLimitKey, now: Timestamp, expires_at: Timestamp) -> Result<(), StoreError> {
        self.inner.record(key, now, expires_at)
    }

    fn count_since(&self, key: &RateLimitKey, since: Timestamp) -> Result<u32, StoreError> {
        self.inner.count_since(key, since)
    }

    fn oldest_since(&self, key: &RateLimitKey, since: Timestamp) -> Result<Option<Timestamp>, StoreError> {
        self.inner.oldest_since(key, since)
    }
}
