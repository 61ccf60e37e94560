//! Declarative retry with exponential backoff.
//!
//! Call sites declare a [`RetryPolicy`] (attempts, base wait, cap) and a
//! retryable-predicate; [`retry_with`] owns the loop, the backoff math,
//! and the per-attempt logging.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Bounded exponential backoff policy: `attempts` total tries, waits of
/// `base * 2^(n-1)` capped at `cap` between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, base: Duration, cap: Duration) -> Self {
        Self { attempts, base, cap }
    }

    /// Store and publish writes: 3 tries, 1s doubling to a 10s cap.
    pub const fn transient() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(10))
    }

    /// Initial bus connection: 5 tries with doubling wait.
    pub const fn connect() -> Self {
        Self::new(5, Duration::from_secs(2), Duration::from_secs(32))
    }

    /// Wait before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let wait = self.base.saturating_mul(1u32 << exp);
        wait.min(self.cap)
    }
}

/// Run `op` until it succeeds, the error is not retryable, or the policy
/// is exhausted. The last error is returned as-is.
pub async fn retry_with<T, E, F, Fut, P>(
    policy: RetryPolicy,
    label: &str,
    is_retryable: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.attempts && is_retryable(&err) => {
                let wait = policy.backoff(attempt);
                warn!(
                    op = label,
                    attempt,
                    max_attempts = policy.attempts,
                    wait_ms = wait.as_millis() as u64,
                    error = %err,
                    "retrying after transient failure"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_up_to_cap() {
        let p = RetryPolicy::transient();
        assert_eq!(p.backoff(1), Duration::from_secs(1));
        assert_eq!(p.backoff(2), Duration::from_secs(2));
        assert_eq!(p.backoff(3), Duration::from_secs(4));
        assert_eq!(p.backoff(6), Duration::from_secs(10));
        assert_eq!(p.backoff(30), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry_with(RetryPolicy::transient(), "test", |_| true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err("transient")
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_policy_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = retry_with(RetryPolicy::transient(), "test", |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("still down") }
        })
        .await;
        assert_eq!(result, Err("still down"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = retry_with(RetryPolicy::transient(), "test", |_| false, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("caller error") }
        })
        .await;
        assert_eq!(result, Err("caller error"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
