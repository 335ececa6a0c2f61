//! Bounded retry with linear backoff.
//!
//! One combinator for every retried step (authentication, case opening,
//! transient element reads). Delay after the n-th failed attempt is
//! `n * step`; after `max_attempts` failures the last error is returned.

use backoff::backoff::Backoff;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub step: Duration,
}

impl RetryPolicy {
    pub const fn linear(max_attempts: u32, step: Duration) -> Self {
        Self { max_attempts, step }
    }

    /// Retries back-to-back, for stale reads and menus closing early.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            step: Duration::ZERO,
        }
    }

    /// Login and case-page policy: 5 attempts, waiting 2s, 4s, 6s, 8s.
    pub const fn navigation() -> Self {
        Self::linear(5, Duration::from_secs(2))
    }

    pub fn backoff(&self) -> LinearBackoff {
        LinearBackoff {
            policy: *self,
            failures: 0,
        }
    }
}

/// [`Backoff`] implementation driving [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    policy: RetryPolicy,
    failures: u32,
}

impl Backoff for LinearBackoff {
    fn reset(&mut self) {
        self.failures = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures >= self.policy.max_attempts {
            return None;
        }
        Some(self.policy.step * self.failures)
    }
}

/// Runs `operation` until it succeeds, the error is not retryable, or the
/// policy is exhausted.
pub async fn retry_with<T, E, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    backoff::future::retry_notify(
        policy.backoff(),
        || {
            let attempt = operation();
            let is_retryable = &is_retryable;
            async move {
                attempt.await.map_err(|e| {
                    if is_retryable(&e) {
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        },
        |e: E, wait: Duration| {
            warn!("{} failed: {}; retrying in {}ms", label, e, wait.as_millis());
        },
    )
    .await
}

/// [`retry_with`] treating every error as retryable.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, label: &str, operation: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_with(policy, label, |_| true, operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn linear_backoff_grows_by_step_and_stops() {
        let mut b = RetryPolicy::navigation().backoff();
        assert_eq!(b.next_backoff(), Some(Duration::from_secs(2)));
        assert_eq!(b.next_backoff(), Some(Duration::from_secs(4)));
        assert_eq!(b.next_backoff(), Some(Duration::from_secs(6)));
        assert_eq!(b.next_backoff(), Some(Duration::from_secs(8)));
        assert_eq!(b.next_backoff(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = Cell::new(0u32);
        let started = tokio::time::Instant::now();
        let result: Result<u32, String> = retry(RetryPolicy::navigation(), "op", || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(format!("attempt {}", n))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.get(), 3);
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = Cell::new(0u32);
        let result: Result<(), String> = retry(RetryPolicy::linear(3, Duration::from_secs(1)), "op", || {
            calls.set(calls.get() + 1);
            async { Err("nope".to_string()) }
        })
        .await;

        assert_eq!(result, Err("nope".to_string()));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let calls = Cell::new(0u32);
        let result: Result<(), String> = retry_with(
            RetryPolicy::immediate(5),
            "op",
            |e: &String| e != "fatal",
            || {
                calls.set(calls.get() + 1);
                async { Err("fatal".to_string()) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
