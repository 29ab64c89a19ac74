//! Retry utilities with exponential backoff.
//!
//! Used around clip encodes, where a crashed or timed-out encoder is worth
//! another attempt but a missing binary or input is not.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Base delay for exponential backoff (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Operation name for logging.
    pub operation_name: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with the given operation name.
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    /// Set the total number of attempts (at least one is always made).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the base delay for exponential backoff.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the backoff cap.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based).
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Result of a retry operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded.
    Success { value: T, attempts: u32 },
    /// Operation failed permanently or after all attempts were used.
    Failed { error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    /// Returns true if the operation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success { .. })
    }

    /// Attempts made, successful or not.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryResult::Success { attempts, .. } | RetryResult::Failed { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success { value, .. } => Ok(value),
            RetryResult::Failed { error, .. } => Err(error),
        }
    }
}

/// Execute an async operation, retrying every failure.
///
/// # Example
/// ```ignore
/// let config = RetryConfig::new("probe").with_max_attempts(3);
/// let result = retry_async(&config, |_attempt| async { probe(&path).await }).await;
/// ```
pub async fn retry_async<F, Fut, T, E>(config: &RetryConfig, operation: F) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_async_if(config, |_| true, operation).await
}

/// Execute an async operation, retrying failures for which `should_retry`
/// returns true. The operation receives the 1-based attempt number.
pub async fn retry_async_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    should_retry: P,
    mut operation: F,
) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                return RetryResult::Success {
                    value,
                    attempts: attempt,
                }
            }
            Err(e) if attempt < max_attempts && should_retry(&e) => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    operation = %config.operation_name,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Attempt failed, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                debug!(
                    operation = %config.operation_name,
                    attempt,
                    "Giving up: {}",
                    e
                );
                return RetryResult::Failed {
                    error: e,
                    attempts: attempt,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_retry_config_delay_calculation() {
        let config = RetryConfig::new("test").with_base_delay(Duration::from_millis(100));

        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn test_retry_config_max_delay() {
        let config = RetryConfig::new("test")
            .with_base_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5));

        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let config = RetryConfig::new("once").with_max_attempts(1);
        let result: RetryResult<(), String> = tokio_test::block_on(retry_async(&config, |_| async {
            Err("boom".to_string())
        }));
        assert!(!result.is_success());
        assert_eq!(result.attempts(), 1);
    }

    #[tokio::test]
    async fn test_retry_async_immediate_success() {
        let config = RetryConfig::new("test");
        let call_count = AtomicU32::new(0);

        let result = retry_async(&config, |_| {
            call_count.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, String>(42) }
        })
        .await;

        assert!(result.is_success());
        assert_eq!(result.attempts(), 1);
        assert_eq!(result.into_result().unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_async_eventual_success() {
        let config = RetryConfig::new("test").with_base_delay(Duration::from_millis(1));
        let call_count = AtomicU32::new(0);

        let result = retry_async(&config, |attempt| {
            call_count.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err("transient error")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert!(result.is_success());
        assert_eq!(result.attempts(), 3);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_after_max_attempts() {
        let config = RetryConfig::new("test")
            .with_max_attempts(3)
            .with_base_delay(Duration::from_millis(1));
        let call_count = AtomicU32::new(0);

        let result: RetryResult<(), &str> = retry_async(&config, |_| {
            call_count.fetch_add(1, Ordering::SeqCst);
            async { Err("still broken") }
        })
        .await;

        assert!(!result.is_success());
        assert_eq!(result.attempts(), 3);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let config = RetryConfig::new("test").with_base_delay(Duration::from_millis(1));
        let call_count = AtomicU32::new(0);

        let result: RetryResult<(), &str> = retry_async_if(
            &config,
            |e: &&str| *e != "permanent",
            |_| {
                call_count.fetch_add(1, Ordering::SeqCst);
                async { Err("permanent") }
            },
        )
        .await;

        assert_eq!(result.attempts(), 1);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }
}
