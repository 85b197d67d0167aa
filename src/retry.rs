//! Bounded retry executor
//!
//! Wraps any fallible async operation in a retry loop. The executor knows nothing about the
//! operation itself: it only counts failures, logs them and waits between attempts according
//! to a [`RetryPolicy`].

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::Config;

/// Retry schedule for one operation.
///
/// A `backoff_multiplier` of 1.0 gives a fixed delay between attempts; larger values grow
/// the delay exponentially, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(1000),
            backoff_multiplier: 1.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_retries: usize, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            ..Default::default()
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.retries,
            delay: config.retry_delay,
            backoff_multiplier: config.backoff_multiplier,
            max_delay: config.max_retry_delay,
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }

    /// Delay before retry number `retry_index` (0-based).
    pub fn delay_for(&self, retry_index: usize) -> Duration {
        let millis =
            self.delay.as_millis() as f64 * self.backoff_multiplier.powi(retry_index as i32);
        let delay = Duration::from_millis(millis as u64);

        if delay > self.max_delay {
            self.max_delay
        } else {
            delay
        }
    }
}

/// Per-operation attempt bookkeeping. Lives only for the duration of one [`retry`] call.
#[derive(Debug, Default, Clone, Copy)]
pub struct RetryState {
    pub attempt_count: usize,
}

/// Every attempt failed. Carries the error of the final attempt.
#[derive(Debug, Error)]
#[error("Failed after {retries} retries ({attempts} attempts)")]
pub struct RetriesExhausted<E: std::error::Error + 'static> {
    pub retries: usize,
    pub attempts: usize,
    #[source]
    pub last_error: E,
}

/// Run `operation` until it succeeds or `policy.max_retries` retries have been spent.
///
/// Makes at most `max_retries + 1` attempts. Waits between attempts only, never after the
/// last one.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, RetriesExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + 'static,
{
    let mut state = RetryState::default();

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                state.attempt_count += 1;
                warn!(
                    "Attempt {}/{} failed: {}",
                    state.attempt_count,
                    policy.max_attempts(),
                    error
                );

                if state.attempt_count > policy.max_retries {
                    return Err(RetriesExhausted {
                        retries: policy.max_retries,
                        attempts: state.attempt_count,
                        last_error: error,
                    });
                }

                let delay = policy.delay_for(state.attempt_count - 1);
                debug!(
                    "Retrying after {:?} (retry {} of {})",
                    delay, state.attempt_count, policy.max_retries
                );
                if !delay.is_zero() {
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn failing(n: usize) -> AuditError {
        AuditError::ScoringFailed(format!("attempt {n}"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_n_failures() {
        for max_retries in 0..4 {
            let calls = AtomicUsize::new(0);
            let policy = RetryPolicy::fixed(max_retries, Duration::from_millis(1000));

            let result = retry(&policy, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < max_retries {
                        Err(failing(n))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

            assert_eq!(result.unwrap(), max_retries);
            assert_eq!(calls.load(Ordering::SeqCst), max_retries + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_attempts() {
        for max_retries in 0..4 {
            let calls = AtomicUsize::new(0);
            let policy = RetryPolicy::fixed(max_retries, Duration::from_millis(1000));

            let result: Result<(), _> = retry(&policy, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(failing(n)) }
            })
            .await;

            let err = result.unwrap_err();
            assert_eq!(err.retries, max_retries);
            assert_eq!(err.attempts, max_retries + 1);
            assert_eq!(err.last_error.to_string(), failing(max_retries).to_string());
            assert_eq!(calls.load(Ordering::SeqCst), max_retries + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_only_between_attempts() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(1000));
        let start = Instant::now();

        let result: Result<(), _> =
            retry(&policy, || async { Err(failing(0)) }).await;

        assert!(result.is_err());
        // 4 attempts, 3 waits, none after the final failure
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_success() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::fixed(5, Duration::from_millis(250));
        let start = Instant::now();

        let result = retry(&policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err(failing(n)) } else { Ok("done") } }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_single_attempt_no_wait() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::fixed(0, Duration::from_millis(1000));
        let start = Instant::now();

        let result: Result<(), _> = retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(failing(0)) }
        })
        .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_backoff_delay_is_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(1),
        };

        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(4), Duration::from_secs(1));
        assert_eq!(policy.delay_for(9), Duration::from_secs(1));
    }

    #[test]
    fn test_fixed_delay_is_constant() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(1000));
        assert_eq!(policy.max_attempts(), 4);
        for i in 0..3 {
            assert_eq!(policy.delay_for(i), Duration::from_millis(1000));
        }
    }
}
