// crates/opx-automation/src/retry.rs
// ============================================================================
// Module: Retry With Backoff
// Description: The exponential-backoff retry wrapper every handler runs its
// store/provider calls through.
// Purpose: Give transient failures a bounded number of retries before the
// handler gives up and records a FAILED audit.
// Dependencies: tokio::time
// ============================================================================

//! ## Overview
//! [`with_retry`] retries a fallible async operation up to
//! [`RetryPolicy::max_retries`] additional times, doubling the delay each
//! time up to [`RetryPolicy::max_delay`]. The delay before the first retry is
//! [`RetryPolicy::initial_delay`]. The operation itself decides what counts
//! as retryable by returning `Err` only for conditions worth retrying; a
//! non-retryable failure should be converted to its final form by the caller
//! before the closure returns.

use std::future::Future;
use std::time::Duration;

/// Backoff schedule for [`with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound the delay never exceeds, regardless of attempt count.
    pub max_delay: Duration,
    /// Number of retries attempted after the initial try.
    pub max_retries: u32,
    /// Factor the delay is multiplied by after each failed attempt.
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_retries: 3,
            backoff_multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep before the attempt numbered `attempt` (0-indexed,
    /// where attempt 0 is the first retry after the initial try).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scale = self.backoff_multiplier.saturating_pow(attempt);
        self.initial_delay.saturating_mul(scale).min(self.max_delay)
    }
}

/// Runs `operation` up to `policy.max_retries + 1` times, sleeping between
/// attempts per [`RetryPolicy::delay_for_attempt`]. Returns the first `Ok`,
/// or the last `Err` once retries are exhausted.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= policy.max_retries {
                    return Err(error);
                }
                tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            max_retries: 3,
            backoff_multiplier: 2,
        }
    }

    #[test]
    fn delay_doubles_up_to_max() {
        let policy = fast_policy();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4));
    }

    #[tokio::test]
    async fn succeeds_on_first_try_without_sleeping() {
        let policy = fast_policy();
        let calls = Cell::new(0);
        let result: Result<u32, &'static str> = with_retry(&policy, || {
            calls.set(calls.get() + 1);
            async { Ok(7) }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let policy = fast_policy();
        let calls = Cell::new(0);
        let result: Result<u32, &'static str> = with_retry(&policy, || {
            let attempt = calls.get();
            calls.set(attempt + 1);
            async move { if attempt < 2 { Err("transient") } else { Ok(99) } }
        })
        .await;
        assert_eq!(result, Ok(99));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let policy = fast_policy();
        let calls = Cell::new(0);
        let result: Result<u32, &'static str> = with_retry(&policy, || {
            calls.set(calls.get() + 1);
            async { Err("persistent") }
        })
        .await;
        assert_eq!(result, Err("persistent"));
        assert_eq!(calls.get(), 4);
    }
}
