//! Bounded retry with exponential back-off
//!
//! [`retry_with_backoff`] wraps any fallible async operation and retries it
//! while a caller-supplied predicate classifies the error as retryable.
//! Non-retryable errors and the error of the final attempt are returned as-is.

use std::future::Future;
use std::time::Duration;

/// Back-off schedule and attempt cap
///
/// The delay before retry `n` (1-based) is `base_delay * 2^(n-1)`, clamped to
/// `[min_delay, max_delay]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl BackoffPolicy {
    /// Schedule used for AI rate limiting: 5 attempts, 2s..60s
    pub const fn rate_limited() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }

    /// Short schedule for local storage writes
    pub const fn storage() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            min_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }

    /// Delay to wait after `attempt` failed (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let computed = self.base_delay.saturating_mul(1u32 << exponent);
        computed.max(self.min_delay).min(self.max_delay)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::rate_limited()
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` attempts have been made
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: BackoffPolicy,
    is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retryable(&err) || attempt >= max_attempts {
                    return Err(err);
                }
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retryable error, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
