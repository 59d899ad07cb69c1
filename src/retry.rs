//! Sequential retry with backoff around remote calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::classify::{BackendError, Failure, classify};

/// Default bound on a single remote call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(20);

/// Growth of the delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    Fixed,
    /// `base × 2^(k-1)` after the k-th failure.
    Exponential,
}

/// Retry budget of one provisioning step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included. Zero behaves like one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
    /// Upper bound of the uniform jitter added to each delay.
    pub max_jitter: Duration,
}

impl RetryPolicy {
    /// Identity creation: 5 attempts, 3s doubling, up to 1s of jitter.
    pub fn identity_creation() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(3),
            backoff: Backoff::Exponential,
            max_jitter: Duration::from_secs(1),
        }
    }

    /// Profile insertion: 3 attempts, fixed 1s.
    pub fn profile_insertion() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff: Backoff::Fixed,
            max_jitter: Duration::ZERO,
        }
    }

    /// Duplicate pre-check: 3 attempts, fixed 1s.
    pub fn lookup() -> Self {
        Self::profile_insertion()
    }

    /// A single attempt.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            backoff: Backoff::Fixed,
            max_jitter: Duration::ZERO,
        }
    }

    /// Delay without jitter after `failures` failed attempts.
    pub fn base_delay_after(&self, failures: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential => {
                let exponent = failures.saturating_sub(1).min(16);
                self.base_delay.saturating_mul(1 << exponent)
            },
        }
    }

    /// Delay to wait after `failures` failed attempts, jitter included.
    pub fn delay_after(&self, failures: u32) -> Duration {
        let jitter = match self.max_jitter.as_millis() as u64 {
            0 => Duration::ZERO,
            max => Duration::from_millis(rand::thread_rng().gen_range(0..=max)),
        };

        self.base_delay_after(failures) + jitter
    }
}

/// Bound `call` by `limit`. Elapsing becomes [`BackendError::Timeout`].
pub async fn with_timeout<T, Fut>(
    limit: Duration,
    call: Fut,
) -> Result<T, BackendError>
where
    Fut: Future<Output = Result<T, BackendError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(BackendError::Timeout))
}

/// Run `operation` until it succeeds, `should_retry` refuses the failure,
/// or the budget of `policy` runs out. The last error is returned.
pub async fn retry<T, F, Fut, P>(
    policy: &RetryPolicy,
    step: &'static str,
    should_retry: P,
    mut operation: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
    P: Fn(Failure) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let failure = classify(&err);
        if !should_retry(failure) {
            tracing::debug!(
                step,
                attempt,
                failure = failure.as_str(),
                error = %err,
                "non-retryable failure"
            );
            return Err(err);
        }

        if attempt >= max_attempts {
            tracing::warn!(
                step,
                attempt,
                max_attempts,
                error = %err,
                "retry budget exhausted"
            );
            return Err(err);
        }

        let delay = policy.delay_after(attempt);
        tracing::warn!(
            step,
            attempt,
            max_attempts,
            failure = failure.as_str(),
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying after transient failure"
        );
        metrics::counter!("provision_retries_total", "step" => step)
            .increment(1);

        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn counted(
        count: &Arc<AtomicU32>,
        fail_times: u32,
        error: BackendError,
    ) -> impl FnMut() -> std::future::Ready<Result<u32, BackendError>> {
        let count = Arc::clone(count);
        move || {
            let current = count.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if current < fail_times {
                Err(error.clone())
            } else {
                Ok(current + 1)
            })
        }
    }

    #[test]
    fn test_exponential_delays() {
        let policy = RetryPolicy::identity_creation();

        let delays: Vec<_> =
            (1..=4).map(|n| policy.base_delay_after(n).as_secs()).collect();
        assert_eq!(delays, vec![3, 6, 12, 24]);

        for n in 1..=4 {
            let delay = policy.delay_after(n);
            assert!(delay >= policy.base_delay_after(n));
            assert!(delay <= policy.base_delay_after(n) + policy.max_jitter);
        }
    }

    #[test]
    fn test_fixed_delays() {
        let policy = RetryPolicy::profile_insertion();

        for n in 1..=3 {
            assert_eq!(policy.delay_after(n), Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_within_budget() {
        let count = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::profile_insertion();

        let result = retry(
            &policy,
            "test",
            Failure::is_transient,
            counted(&count, 2, BackendError::Timeout),
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_budget() {
        let count = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::identity_creation();
        let error = BackendError::api(Some(500), None, "Database error");
        let start = Instant::now();

        let result = retry(
            &policy,
            "test",
            Failure::is_transient,
            counted(&count, u32::MAX, error.clone()),
        )
        .await;

        assert_eq!(result, Err(error));
        assert_eq!(count.load(Ordering::SeqCst), 5);
        // 3 + 6 + 12 + 24 seconds, plus at most 4 seconds of jitter.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(45));
        assert!(elapsed <= Duration::from_secs(49));
    }

    #[tokio::test]
    async fn test_refused_failure_is_not_retried() {
        let count = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::identity_creation();
        let error =
            BackendError::api(Some(422), Some("email_exists"), "taken");

        let result = retry(
            &policy,
            "test",
            Failure::is_transient,
            counted(&count, u32::MAX, error.clone()),
        )
        .await;

        assert_eq!(result, Err(error));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_backend_error() {
        let result: Result<(), _> = with_timeout(
            Duration::from_secs(20),
            std::future::pending(),
        )
        .await;

        assert_eq!(result, Err(BackendError::Timeout));
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let count = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::once()
        };

        let result = retry(
            &policy,
            "test",
            Failure::is_transient,
            counted(&count, u32::MAX, BackendError::Timeout),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
