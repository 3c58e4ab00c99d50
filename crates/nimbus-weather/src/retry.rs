//! Retry policy for provider requests.
//!
//! Fixed delay, bounded attempts. Only errors that report themselves as
//! transient are retried; everything else is returned on first sight.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use nimbus_core::WeatherConfig;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_DELAY_SECS: u64 = 5;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Pause after each transient failure
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Duration::from_secs(DEFAULT_DELAY_SECS),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    pub fn from_config(config: &WeatherConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_secs(config.retry_delay_secs),
        )
    }
}

/// Errors that know whether a second try could succeed.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

/// Error classification for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

/// Decide what to do after `attempt` (1-based) failed with `error`.
pub fn decide<E: Retryable>(config: &RetryConfig, attempt: u32, error: &E) -> RetryDecision {
    if error.is_transient() && attempt < config.max_attempts {
        RetryDecision::Retry
    } else {
        RetryDecision::NoRetry
    }
}

/// Run `operation` until it succeeds, fails permanently or runs out of
/// attempts. On exhaustion the last transient error is returned.
///
/// # Example
/// ```ignore
/// let weather = with_retry(&RetryConfig::default(), || provider.fetch(lat, lon)).await?;
/// ```
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!("Request succeeded on attempt {}", attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                if !e.is_transient() {
                    tracing::debug!("Non-retryable error: {}", e);
                    return Err(e);
                }

                if decide(config, attempt, &e) == RetryDecision::NoRetry {
                    tracing::error!("All {} attempts exhausted: {}", config.max_attempts, e);
                    return Err(e);
                }

                tracing::warn!(
                    "Transient error on attempt {} of {}, retrying in {:?}: {}",
                    attempt,
                    config.max_attempts,
                    config.delay,
                    e
                );
                tokio::time::sleep(config.delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient(u32),
        Fatal,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Retryable for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, TestError::Transient(_))
        }
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.delay, Duration::from_secs(5));
    }

    #[test]
    fn test_from_weather_config() {
        let weather = WeatherConfig {
            max_attempts: 5,
            retry_delay_secs: 1,
            ..Default::default()
        };
        let config = RetryConfig::from_config(&weather);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.delay, Duration::from_secs(1));
    }

    #[test]
    fn test_decide() {
        let config = RetryConfig::default();
        assert_eq!(decide(&config, 1, &TestError::Transient(1)), RetryDecision::Retry);
        assert_eq!(decide(&config, 3, &TestError::Transient(3)), RetryDecision::NoRetry);
        assert_eq!(decide(&config, 1, &TestError::Fatal), RetryDecision::NoRetry);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_transient_failures_then_success() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result = with_retry(&RetryConfig::default(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(TestError::Transient(n))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two pauses, none after the successful attempt.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(15), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);

        let result: Result<u32, _> = with_retry(&RetryConfig::default(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err(TestError::Transient(n)) }
        })
        .await;

        assert_eq!(result, Err(TestError::Transient(3)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result: Result<u32, _> = with_retry(&RetryConfig::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError::Fatal) }
        })
        .await;

        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
