//! Retry policy implementation with exponential backoff.
//!
//! Retrying is always an explicit caller decision. Only idempotent probes,
//! such as waiting for a service to come up, go through a policy.

use crate::PlatformError;
use std::time::Duration;
use tracing::debug;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Fixed-interval policy allowing `attempts` tries in total.
    ///
    /// `attempts` of zero is treated as one.
    #[must_use]
    pub fn fixed(attempts: u32, interval: Duration) -> Self {
        Self {
            max_retries: attempts.saturating_sub(1),
            initial_delay: interval,
            max_delay: interval,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Create a new retry config with custom max retries.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Create a new retry config with custom initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Create a new retry config with custom max delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Create a new retry config without jitter.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

/// Retry policy for executing operations with automatic retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy with the given configuration.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create a retry policy with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Policy that tries exactly once.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::new(RetryConfig::default().with_max_retries(0))
    }

    /// Calculate the delay for a given attempt number.
    ///
    /// Uses exponential backoff with optional jitter.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay.as_millis() as f64
            * self.config.multiplier.powi(attempt as i32);

        let delay_ms = base_delay.min(self.config.max_delay.as_millis() as f64);

        let final_delay = if self.config.jitter {
            // Add up to 25% jitter
            let jitter_factor = 1.0 + (rand::random::<f64>() * 0.25);
            delay_ms * jitter_factor
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay as u64)
    }

    /// Check if an error should be retried.
    #[must_use]
    pub const fn should_retry(&self, error: &PlatformError, attempt: u32) -> bool {
        attempt < self.config.max_retries && error.is_retryable()
    }

    /// Execute an async operation with retries.
    ///
    /// # Errors
    ///
    /// Returns the last error if all retries are exhausted or the error
    /// is not retryable.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, PlatformError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, PlatformError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if !self.should_retry(&error, attempt) {
                        return Err(error);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    debug!(attempt, delay_ms = delay.as_millis(), %error, "Retrying after failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Get the maximum number of retries.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_delay_calculation_no_jitter() {
        let config = RetryConfig::default().without_jitter();
        let policy = RetryPolicy::new(config);

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_fixed_interval() {
        let policy = RetryPolicy::new(RetryConfig::fixed(10, Duration::from_secs(2)));

        assert_eq!(policy.max_retries(), 9);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(2));
        assert_eq!(RetryConfig::fixed(0, Duration::ZERO).max_retries, 0);
    }

    #[test]
    fn test_max_delay_cap() {
        let config = RetryConfig::default()
            .without_jitter()
            .with_max_delay(Duration::from_millis(150));
        let policy = RetryPolicy::new(config);

        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(150));
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::with_defaults();
        let transient = PlatformError::unavailable("refused");

        assert!(policy.should_retry(&transient, 0));
        assert!(policy.should_retry(&transient, 2));
        assert!(!policy.should_retry(&transient, 3));
        assert!(!policy.should_retry(&PlatformError::invalid_input("bad"), 0));
    }

    #[tokio::test]
    async fn test_execute_success() {
        let policy = RetryPolicy::with_defaults();
        let result: Result<i32, PlatformError> = policy.execute(|| async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_execute_retries_transient_until_success() {
        let policy = RetryPolicy::new(RetryConfig::fixed(5, Duration::from_millis(1)));
        let calls = AtomicU32::new(0);

        let result = policy
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(PlatformError::unavailable("not yet"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_tries_once() {
        let policy = RetryPolicy::no_retry();
        let calls = AtomicU32::new(0);

        let result: Result<(), PlatformError> = policy
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PlatformError::unavailable("down")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
