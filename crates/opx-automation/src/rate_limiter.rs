// crates/opx-automation/src/rate_limiter.rs
// ============================================================================
// Module: Rate Limiter
// Description: Per-operation, per-principal manual-trigger rate limiting.
// Purpose: Enforce the fixed hourly caps spec names per operation, failing
// open on store error since the limiter is an abuse guard, not a safety
// gate.
// Dependencies: opx_core::audit::OperationType, opx_core::time,
// opx-stores::rate_limit_store
// ============================================================================

//! ## Overview
//! Limits are fixed per [`OperationType`] and apply only to manually
//! triggered invocations; scheduled invocations never call
//! [`RateLimiter::check`]. The window is a fixed one-hour lookback from
//! `now`, matching [`WINDOW_MS`].

use opx_core::audit::OperationType;
use opx_core::time::Timestamp;
use opx_stores::error::StoreError;
use opx_stores::rate_limit_store::RateLimitKey;
use opx_stores::rate_limit_store::RateLimitStore;
use opx_stores::rate_limit_store::SharedRateLimitStore;

/// Width of the rate limit window, in milliseconds.
pub const WINDOW_MS: u64 = 3_600_000;

/// Entries are retained for twice the window before they're sweepable.
const ENTRY_TTL_MS: u64 = WINDOW_MS * 2;

/// Returns the manual-trigger hourly cap for `operation_type`, or `None` if
/// that operation is never manually rate-limited.
#[must_use]
pub const fn limit_for(operation_type: OperationType) -> Option<u32> {
    match operation_type {
        OperationType::PatternExtraction => Some(5),
        OperationType::Calibration => Some(3),
        OperationType::Snapshot => Some(10),
        OperationType::KillSwitchEnable | OperationType::KillSwitchDisable => None,
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the invocation may proceed.
    pub allowed: bool,
    /// Invocations already recorded in the current window.
    pub current_count: u32,
    /// The cap in effect.
    pub limit: u32,
    /// Milliseconds until the oldest in-window entry ages out, if blocked.
    pub retry_after_ms: Option<u64>,
}

/// Enforces manual-trigger rate limits, failing open on store error.
pub struct RateLimiter {
    /// Backing store.
    store: SharedRateLimitStore,
}

impl RateLimiter {
    /// Wraps a store handle in a rate limiter.
    #[must_use]
    pub fn new(store: SharedRateLimitStore) -> Self {
        Self { store }
    }

    /// Checks whether a manual invocation of `operation_type` by `principal`
    /// is within the hourly cap as of `now`, without recording it. A store
    /// error is treated as "allowed" (fail-open), since the limiter guards
    /// against operator error, not automation safety.
    #[must_use]
    pub fn check(&self, principal: &str, operation_type: OperationType, now: Timestamp) -> RateLimitDecision {
        let Some(limit) = limit_for(operation_type) else {
            return RateLimitDecision { allowed: true, current_count: 0, limit: u32::MAX, retry_after_ms: None };
        };
        let key = RateLimitKey { principal: principal.to_string(), operation_type };
        let since = window_start(now);
        let Ok(current_count) = self.store.count_since(&key, since) else {
            return RateLimitDecision { allowed: true, current_count: 0, limit, retry_after_ms: None };
        };
        if current_count < limit {
            return RateLimitDecision { allowed: true, current_count, limit, retry_after_ms: None };
        }
        let retry_after_ms = self.store.oldest_since(&key, since).ok().flatten().map(|oldest| retry_after(oldest, now));
        RateLimitDecision { allowed: false, current_count, limit, retry_after_ms }
    }

    /// Records a manual invocation of `operation_type` by `principal` at
    /// `now`. Callers should call this only after [`RateLimiter::check`]
    /// allows the invocation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on I/O failure.
    pub fn record(&self, principal: &str, operation_type: OperationType, now: Timestamp) -> Result<(), StoreError> {
        let key = RateLimitKey { principal: principal.to_string(), operation_type };
        let expires_at = add_millis(now, ENTRY_TTL_MS);
        self.store.record(&key, now, expires_at)
    }
}

/// Start of the one-hour lookback window ending at `now`.
fn window_start(now: Timestamp) -> Timestamp {
    subtract_millis(now, WINDOW_MS)
}

/// Milliseconds remaining until `oldest` ages out of the window started at
/// `now - WINDOW_MS`, i.e. until `oldest + WINDOW_MS`.
fn retry_after(oldest: Timestamp, now: Timestamp) -> u64 {
    let expiry = add_millis(oldest, WINDOW_MS);
    let expiry_nanos = expiry.as_offset_date_time().unix_timestamp_nanos();
    let now_nanos = now.as_offset_date_time().unix_timestamp_nanos();
    u64::try_from((expiry_nanos - now_nanos) / 1_000_000).unwrap_or(0)
}

/// Returns `timestamp + millis`.
fn add_millis(timestamp: Timestamp, millis: u64) -> Timestamp {
    let shifted = timestamp.as_offset_date_time() + time::Duration::milliseconds(i64::try_from(millis).unwrap_or(i64::MAX));
    Timestamp::from_offset_date_time(shifted)
}

/// Returns `timestamp - millis`.
fn subtract_millis(timestamp: Timestamp, millis: u64) -> Timestamp {
    let shifted = timestamp.as_offset_date_time() - time::Duration::milliseconds(i64::try_from(millis).unwrap_or(i64::MAX));
    Timestamp::from_offset_date_time(shifted)
}
