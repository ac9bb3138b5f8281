//! Bounded retry with backoff for ledger RPC calls.
//!
//! Only failures the classifier marks as retryable are retried. Everything else
//! (node rejections, malformed requests) is surfaced on the first attempt.
//!
//! ```ignore
//! use crate::retry::{retry_with_classifier, RetryConfig};
//!
//! let nonce = retry_with_classifier(&config, "eth_getTransactionCount", || async {
//!     ledger.pending_nonce(sender).await
//! }, RpcFailure::is_transient).await?;
//! ```

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::consts::{
    DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_MAX_RETRY_DELAY_MS, DEFAULT_RETRY_DELAY_MS,
};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included. Never zero.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub delay_ms: u64,
    /// Multiplier for exponential backoff. 1.0 = fixed delay, 2.0 = double each time.
    pub backoff_multiplier: f64,
    /// Maximum delay cap, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            delay_ms: DEFAULT_RETRY_DELAY_MS,
            backoff_multiplier: 2.0,
            max_delay_ms: DEFAULT_MAX_RETRY_DELAY_MS,
        }
    }
}

impl RetryConfig {
    /// Fixed delay between attempts.
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        let delay_ms = delay.as_millis() as u64;
        Self {
            max_attempts,
            delay_ms,
            backoff_multiplier: 1.0,
            max_delay_ms: delay_ms,
        }
    }

    /// Exponential backoff starting at `initial`, capped at `max_delay`.
    pub fn exponential(
        initial: Duration,
        max_attempts: u32,
        multiplier: f64,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_attempts,
            delay_ms: initial.as_millis() as u64,
            backoff_multiplier: multiplier,
            max_delay_ms: max_delay.as_millis() as u64,
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::fixed(Duration::ZERO, 1)
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        backoff_delay(
            Duration::from_millis(self.delay_ms),
            self.backoff_multiplier,
            Duration::from_millis(self.max_delay_ms),
            attempt,
        )
    }
}

/// `initial * multiplier^(attempt-1)`, capped at `max`.
pub(crate) fn backoff_delay(
    initial: Duration,
    multiplier: f64,
    max: Duration,
    attempt: u32,
) -> Duration {
    if multiplier <= 1.0 {
        return initial;
    }

    let factor = multiplier.powi(attempt.saturating_sub(1).min(64) as i32);
    let millis = initial.as_millis() as f64 * factor;
    if !millis.is_finite() || millis >= max.as_millis() as f64 {
        return max;
    }
    Duration::from_millis(millis as u64)
}

/// Retry an async operation while `is_retryable` holds and attempts remain.
pub async fn retry_with_classifier<F, Fut, T, E, C>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
    is_retryable: C,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    C: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "RPC call succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                if !is_retryable(&e) {
                    return Err(e);
                }

                if attempt >= max_attempts {
                    warn!(
                        operation = operation_name,
                        attempt,
                        error = %e,
                        "Retry attempts exhausted"
                    );
                    return Err(e);
                }

                let delay = config.delay_for_attempt(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "RPC call failed, retrying"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delay_for_attempt_fixed() {
        let config = RetryConfig::fixed(Duration::from_millis(300), 3);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(300));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(300));
    }

    #[test]
    fn test_delay_for_attempt_exponential() {
        let config = RetryConfig::exponential(
            Duration::from_millis(100),
            10,
            2.0,
            Duration::from_millis(1_000),
        );
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(800));
        // capped
        assert_eq!(config.delay_for_attempt(5), Duration::from_millis(1_000));
        assert_eq!(config.delay_for_attempt(500), Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_after_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::fixed(Duration::from_millis(50), 3);

        let result: Result<u32, String> = retry_with_classifier(
            &config,
            "eth_chainId",
            || {
                let attempts = attempts.clone();
                async move {
                    let current = attempts.fetch_add(1, Ordering::SeqCst);
                    if current < 2 {
                        Err(format!("connection refused ({})", current + 1))
                    } else {
                        Ok(31337)
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(31337));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausted() {
        let attempts = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::fixed(Duration::from_millis(10), 3);

        let result: Result<u32, String> = retry_with_classifier(
            &config,
            "eth_chainId",
            || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err("connection reset".to_string())
                }
            },
            |_| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<u32, String> = retry_with_classifier(
            &RetryConfig::default(),
            "eth_sendRawTransaction",
            || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err("nonce too low".to_string())
                }
            },
            |e| e.contains("connection"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let attempts = Arc::new(AtomicU32::new(0));
        let config = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::none()
        };

        let result: Result<u32, String> = retry_with_classifier(
            &config,
            "eth_call",
            || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err("timeout".to_string())
                }
            },
            |_| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
