//! Retry logic with exponential backoff
//!
//! The wait before retrying after attempt `n` (0-based) is
//! `time_unit * backoff_factor^n`, capped at `max_backoff`. There is no
//! jitter, so waits depend only on the attempt index. The error returned
//! after the final attempt is the operation's own error, unchanged.

use crate::error::{ResilienceError, Result};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Errors that know whether a retry could help
pub trait Retryable {
    /// True for transient failures such as timeouts or 5xx responses
    fn is_retryable(&self) -> bool;
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_factor: f64,
    time_unit: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: 2.0,
            time_unit: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Create a policy; `max_attempts` must be at least 1 and
    /// `backoff_factor` greater than 1.0
    pub fn new(max_attempts: u32, backoff_factor: f64) -> Result<Self> {
        if max_attempts == 0 {
            return Err(ResilienceError::InvalidPolicy(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !backoff_factor.is_finite() || backoff_factor <= 1.0 {
            return Err(ResilienceError::InvalidPolicy(format!(
                "backoff_factor must be greater than 1.0, got {backoff_factor}"
            )));
        }
        Ok(Self {
            max_attempts,
            backoff_factor,
            ..Self::default()
        })
    }

    /// Create a policy with no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Create a policy with fast retries (for testing)
    pub fn fast() -> Self {
        Self {
            time_unit: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            ..Self::default()
        }
    }

    /// Scale of one backoff unit (one second by default)
    pub fn with_time_unit(mut self, unit: Duration) -> Self {
        self.time_unit = unit;
        self
    }

    /// Upper bound on any single wait
    pub fn with_max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff = max;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    /// Wait applied after the failed attempt with the given 0-based index
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.time_unit.as_secs_f64() * self.backoff_factor.powi(exponent);
        if !secs.is_finite() || secs >= self.max_backoff.as_secs_f64() {
            self.max_backoff
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Execute an async operation, retrying errors that report themselves
    /// as retryable
    ///
    /// # Arguments
    ///
    /// * `operation_name` - Name of the operation (for logging)
    /// * `operation` - Async operation to execute
    pub async fn execute<F, Fut, T, E>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Retryable + Display,
    {
        self.execute_observed(operation_name, E::is_retryable, |_, _| {}, operation)
            .await
    }

    /// Execute with an explicit retry predicate
    pub async fn execute_if<F, Fut, T, E, P>(
        &self,
        operation_name: &str,
        should_retry: P,
        operation: F,
    ) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        self.execute_observed(operation_name, should_retry, |_, _| {}, operation)
            .await
    }

    /// Execute with a retry predicate and an observer called with the
    /// 1-based number of the failed attempt before each wait
    pub async fn execute_observed<F, Fut, T, E, P, O>(
        &self,
        operation_name: &str,
        should_retry: P,
        mut on_retry: O,
        mut operation: F,
    ) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
        O: FnMut(u32, &E),
    {
        let mut attempt = 0;

        loop {
            debug!(
                "Attempt {}/{} for operation: {}",
                attempt + 1,
                self.max_attempts,
                operation_name
            );

            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(
                            "Operation '{}' succeeded after {} retries",
                            operation_name, attempt
                        );
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if !should_retry(&e) {
                        debug!(
                            "Operation '{}' failed with non-retryable error: {}",
                            operation_name, e
                        );
                        return Err(e);
                    }

                    if attempt + 1 >= self.max_attempts {
                        warn!(
                            "Operation '{}' failed after {} attempts: {}",
                            operation_name, self.max_attempts, e
                        );
                        return Err(e);
                    }

                    let backoff = self.backoff_duration(attempt);
                    warn!(
                        "Operation '{}' failed (attempt {}/{}): {}. Retrying in {:?}",
                        operation_name,
                        attempt + 1,
                        self.max_attempts,
                        e,
                        backoff
                    );
                    on_retry(attempt + 1, &e);
                    sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient(u32),
        Fatal,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Transient(n) => write!(f, "transient #{n}"),
                TestError::Fatal => write!(f, "fatal"),
            }
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient(_))
        }
    }

    /// The paused clock advances to timer ticks, which have millisecond
    /// resolution.
    fn assert_waited(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual <= expected + Duration::from_millis(1),
            "waited {actual:?}, expected {expected:?}"
        );
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff_factor(), 2.0);
    }

    #[test]
    fn test_invalid_policy() {
        assert!(RetryPolicy::new(0, 2.0).is_err());
        assert!(RetryPolicy::new(3, 1.0).is_err());
        assert!(RetryPolicy::new(3, f64::NAN).is_err());
        assert!(RetryPolicy::new(1, 1.5).is_ok());
    }

    #[test]
    fn test_backoff_calculation() {
        let policy = RetryPolicy::new(5, 2.0).unwrap();

        assert_eq!(policy.backoff_duration(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_duration(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_duration(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_duration(3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_capped_at_max() {
        let policy = RetryPolicy::new(10, 3.0)
            .unwrap()
            .with_max_backoff(Duration::from_secs(5));

        assert_eq!(policy.backoff_duration(4), Duration::from_secs(5));
        assert_eq!(policy.backoff_duration(u32::MAX), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_execute_success_first_try() {
        let policy = RetryPolicy::fast();
        let attempt_count = Arc::new(Mutex::new(0));
        let count = attempt_count.clone();

        let result = policy
            .execute("test_op", || {
                let count = count.clone();
                async move {
                    *count.lock().await += 1;
                    Ok::<i32, TestError>(42)
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(*attempt_count.lock().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_follow_backoff_schedule() {
        let policy = RetryPolicy::new(4, 3.0).unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();

        // fails k = 2 times, then succeeds
        let result = policy
            .execute("flaky", || {
                let recorded = recorded.clone();
                async move {
                    let mut calls = recorded.lock().await;
                    calls.push(Instant::now());
                    let n = calls.len() as u32;
                    if n <= 2 {
                        Err(TestError::Transient(n))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        let calls = calls.lock().await;
        assert_eq!(calls.len(), 3);
        assert_waited(calls[1] - calls[0], Duration::from_secs(1));
        assert_waited(calls[2] - calls[1], Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_error_is_returned_unchanged() {
        let policy = RetryPolicy::new(3, 2.0).unwrap();
        let attempt_count = Arc::new(Mutex::new(0));
        let count = attempt_count.clone();
        let start = Instant::now();

        let result = policy
            .execute("always_fails", || {
                let count = count.clone();
                async move {
                    let mut n = count.lock().await;
                    *n += 1;
                    Err::<(), TestError>(TestError::Transient(*n))
                }
            })
            .await;

        assert_eq!(result, Err(TestError::Transient(3)));
        assert_eq!(*attempt_count.lock().await, 3);
        // waits of 1s and 2s, none after the last attempt
        assert_waited(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_execute_non_retryable_error() {
        let policy = RetryPolicy::fast();
        let attempt_count = Arc::new(Mutex::new(0));
        let count = attempt_count.clone();

        let result = policy
            .execute("test_op", || {
                let count = count.clone();
                async move {
                    *count.lock().await += 1;
                    Err::<i32, TestError>(TestError::Fatal)
                }
            })
            .await;

        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(*attempt_count.lock().await, 1); // Should not retry
    }

    #[tokio::test]
    async fn test_execute_if_with_predicate() {
        let policy = RetryPolicy::fast();
        let attempt_count = Arc::new(Mutex::new(0));
        let count = attempt_count.clone();

        let result: std::result::Result<(), String> = policy
            .execute_if(
                "string_errors",
                |e: &String| e.contains("timeout"),
                || {
                    let count = count.clone();
                    async move {
                        *count.lock().await += 1;
                        Err("timeout talking to upstream".to_string())
                    }
                },
            )
            .await;

        assert!(result.is_err());
        assert_eq!(*attempt_count.lock().await, 3);
    }

    #[tokio::test]
    async fn test_observer_sees_each_retry() {
        let policy = RetryPolicy::fast();
        let mut observed = Vec::new();

        let result = policy
            .execute_observed(
                "observed",
                TestError::is_retryable,
                |attempt, _e: &TestError| observed.push(attempt),
                || async { Err::<(), TestError>(TestError::Transient(0)) },
            )
            .await;

        assert!(result.is_err());
        assert_eq!(observed, vec![1, 2]);
    }
}
