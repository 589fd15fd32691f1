use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// An error that knows whether the failed call is worth repeating.
pub trait Retryable: Sized {
    /// Whether the same call may succeed if repeated.
    fn is_transient(&self) -> bool;

    /// Error to report when an attempt exceeds the per-call timeout.
    fn timed_out(after: Duration) -> Self;
}

/// Retry with a backoff schedule and a per-attempt timeout.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries (after the initial attempt).
    pub max_retries: usize,
    /// Backoff delays between retries. If fewer entries than `max_retries`,
    /// the last entry is repeated.
    pub backoff_schedule: Vec<Duration>,
    /// Timeout per individual attempt.
    pub timeout: Duration,
    /// Add up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_schedule: vec![
                Duration::from_secs(1),
                Duration::from_secs(5),
                Duration::from_secs(30),
            ],
            timeout: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A single attempt with the given timeout.
    pub fn no_retry(timeout: Duration) -> Self {
        Self {
            max_retries: 0,
            backoff_schedule: vec![],
            timeout,
            jitter: false,
        }
    }

    fn backoff_for(&self, attempt: usize) -> Duration {
        let base = self
            .backoff_schedule
            .get(attempt)
            .copied()
            .unwrap_or_else(|| {
                self.backoff_schedule
                    .last()
                    .copied()
                    .unwrap_or(Duration::from_secs(1))
            });

        if self.jitter && !base.is_zero() {
            let extra_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 4);
            base + Duration::from_millis(extra_ms)
        } else {
            base
        }
    }
}

/// Execute one external call with retry and backoff.
///
/// The closure `f` is called up to `1 + max_retries` times. Each attempt is
/// wrapped in the per-attempt timeout; a timeout counts as transient.
/// Permanent errors are returned immediately.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut f: F,
) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;

    loop {
        let error = match tokio::time::timeout(policy.timeout, f()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_elapsed) => E::timed_out(policy.timeout),
        };

        if !error.is_transient() || attempt >= policy.max_retries {
            return Err(error);
        }

        let delay = policy.backoff_for(attempt);
        debug!(
            "{} failed (attempt {}/{}): {}; retrying in {:?}",
            operation,
            attempt + 1,
            policy.max_retries + 1,
            error,
            delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient,
        Permanent,
        TimedOut,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Retryable for TestError {
        fn is_transient(&self) -> bool {
            !matches!(self, TestError::Permanent)
        }

        fn timed_out(_after: Duration) -> Self {
            TestError::TimedOut
        }
    }

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_schedule: vec![Duration::from_millis(1)],
            timeout: Duration::from_secs(1),
            jitter: false,
        }
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<u32, TestError> = retry_with_backoff(&fast_policy(3), "test", || {
            calls_clone.fetch_add(1, Ordering::Relaxed);
            async { Ok(7) }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<(), TestError> = retry_with_backoff(&fast_policy(3), "test", || {
            let attempt = calls_clone.fetch_add(1, Ordering::Relaxed);
            async move {
                if attempt < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<(), TestError> = retry_with_backoff(&fast_policy(3), "test", || {
            calls_clone.fetch_add(1, Ordering::Relaxed);
            async { Err(TestError::Permanent) }
        })
        .await;

        assert_eq!(result, Err(TestError::Permanent));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn all_retries_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let result: Result<(), TestError> = retry_with_backoff(&fast_policy(2), "test", || {
            calls_clone.fetch_add(1, Ordering::Relaxed);
            async { Err(TestError::Transient) }
        })
        .await;

        assert_eq!(result, Err(TestError::Transient));
        // 1 initial + 2 retries = 3 total
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn timeout_enforced() {
        let policy = RetryPolicy::no_retry(Duration::from_millis(10));

        let result: Result<(), TestError> = retry_with_backoff(&policy, "test", || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        assert_eq!(result, Err(TestError::TimedOut));
    }

    #[tokio::test]
    async fn backoff_schedule_respected() {
        let policy = RetryPolicy {
            max_retries: 2,
            backoff_schedule: vec![Duration::from_millis(50), Duration::from_millis(100)],
            timeout: Duration::from_secs(1),
            jitter: false,
        };

        let start = tokio::time::Instant::now();
        let _: Result<(), TestError> =
            retry_with_backoff(&policy, "test", || async { Err(TestError::Transient) }).await;
        let elapsed = start.elapsed();

        // Should have waited at least 50ms + 100ms = 150ms
        assert!(
            elapsed >= Duration::from_millis(140),
            "elapsed: {elapsed:?}"
        );
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = RetryPolicy {
            max_retries: 1,
            backoff_schedule: vec![Duration::from_millis(400)],
            timeout: Duration::from_secs(1),
            jitter: true,
        };

        for _ in 0..50 {
            let delay = policy.backoff_for(0);
            assert!(delay >= Duration::from_millis(400));
            assert!(delay <= Duration::from_millis(500));
        }
    }
}
