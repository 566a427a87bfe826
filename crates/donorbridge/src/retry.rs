//! Retry policies.
//!
//! Two policies live here:
//! - [`RetryConfig`] / [`with_retry`]: exponential backoff (backon) for
//!   idempotent destination reads such as donor lookups and code checks.
//! - [`LinearBackoff`]: the capped linear delay the backfill uses between
//!   failed batch calls.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

/// Initial backoff delay in milliseconds for idempotent reads.
pub const INITIAL_BACKOFF_MS: u64 = 500;

/// Maximum backoff delay in milliseconds for idempotent reads.
pub const MAX_BACKOFF_MS: u64 = 5_000;

/// Maximum retries for a single idempotent read.
pub const MAX_READ_RETRIES: u32 = 3;

/// Configuration for retry operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Minimum delay between retries.
    pub min_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Maximum number of retry attempts.
    pub max_retries: usize,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            max_retries: MAX_READ_RETRIES as usize,
            with_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with custom values.
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration, max_retries: usize) -> Self {
        Self {
            min_delay,
            max_delay,
            max_retries,
            with_jitter: true,
        }
    }

    /// Never retry.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set whether to use jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    /// Build an exponential backoff strategy from this configuration.
    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }
}

/// Execute an idempotent operation, retrying errors `is_retryable` accepts.
///
/// Only use this for calls that are safe to repeat: a retried create could
/// produce a duplicate record on the destination.
///
/// # Example
///
/// ```ignore
/// let donor = with_retry(
///     || async { self.query_donor(email).await },
///     DestinationError::is_transport,
///     short_error_message,
///     "find_donor",
///     self.retry.clone(),
/// )
/// .await?;
/// ```
pub async fn with_retry<T, E, F, Fut, IsRetryable, ShortMsg>(
    mut operation: F,
    is_retryable: IsRetryable,
    short_message: ShortMsg,
    label: &str,
    config: RetryConfig,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
    IsRetryable: Fn(&E) -> bool + Send + Sync + 'static,
    ShortMsg: Fn(&E) -> String + Send + Sync + 'static,
{
    let attempt = AtomicU32::new(0);

    let retry_op = || {
        attempt.fetch_add(1, Ordering::SeqCst);
        operation()
    };

    retry_op
        .retry(config.into_backoff())
        .notify(|err, dur| {
            tracing::debug!(
                operation = label,
                attempt = attempt.load(Ordering::SeqCst),
                retry_in_ms = dur.as_millis() as u64,
                error = %short_message(err),
                "Retrying destination read"
            );
        })
        .when(is_retryable)
        .await
}

/// Capped linear delay: `min(attempt * step, max)`.
///
/// With the defaults the first failure waits 2s, the second 4s, and every
/// failure from the fifth on waits 10s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    pub step: Duration,
    pub max: Duration,
}

impl Default for LinearBackoff {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(2),
            max: Duration::from_secs(10),
        }
    }
}

impl LinearBackoff {
    /// Delay before retry number `attempt` (1-based). Attempt 0 waits nothing.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();

        assert_eq!(config.min_delay, Duration::from_millis(INITIAL_BACKOFF_MS));
        assert_eq!(config.max_delay, Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(config.max_retries, MAX_READ_RETRIES as usize);
        assert!(config.with_jitter);
    }

    #[test]
    fn test_retry_config_disabled() {
        assert_eq!(RetryConfig::disabled().max_retries, 0);
    }

    #[test]
    fn linear_backoff_grows_by_step_and_caps() {
        let backoff = LinearBackoff::default();
        assert_eq!(backoff.delay_for(0), Duration::ZERO);
        assert_eq!(backoff.delay_for(1), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(4));
        assert_eq!(backoff.delay_for(5), Duration::from_secs(10));
        assert_eq!(backoff.delay_for(50), Duration::from_secs(10));
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_secs(10));
    }

    #[derive(Debug, Clone)]
    struct TestError {
        message: &'static str,
        transient: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl std::error::Error for TestError {}

    #[tokio::test(start_paused = true)]
    async fn with_retry_retries_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);
        let operation = move || {
            let calls_capture = Arc::clone(&calls_capture);
            async move {
                let n = calls_capture.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(TestError {
                        message: "timeout",
                        transient: true,
                    })
                } else {
                    Ok(7u32)
                }
            }
        };

        let result = with_retry(
            operation,
            |e: &TestError| e.transient,
            |e: &TestError| e.to_string(),
            "find_donor",
            RetryConfig::default().with_jitter(false),
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);
        let operation = move || {
            let calls_capture = Arc::clone(&calls_capture);
            async move {
                calls_capture.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TestError {
                    message: "timeout",
                    transient: true,
                })
            }
        };

        let err = with_retry(
            operation,
            |e: &TestError| e.transient,
            |e: &TestError| e.to_string(),
            "validate_code",
            RetryConfig::new(Duration::from_millis(10), Duration::from_millis(10), 2),
        )
        .await
        .expect_err("expected error");

        assert_eq!(err.to_string(), "timeout");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn with_retry_does_not_retry_permanent_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);

        let operation = move || {
            let calls_capture = Arc::clone(&calls_capture);
            async move {
                calls_capture.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TestError {
                    message: "bad api key",
                    transient: false,
                })
            }
        };

        let err = with_retry(
            operation,
            |e: &TestError| e.transient,
            |e: &TestError| e.to_string(),
            "test_connection",
            RetryConfig::default(),
        )
        .await
        .expect_err("expected error");

        assert_eq!(err.to_string(), "bad api key");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
