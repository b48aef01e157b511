//! Retry with exponential backoff for outbound registry calls
//!
//! Delay before retry *n* (1-based) is `min(initial * multiplier^(n-1), max)`,
//! plus uniform jitter in `[0, delay/4]` when enabled, re-clamped to `max`.
//! Only errors for which [`RegistryError::is_retryable`] holds are retried.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::RegistryError;

/// Backoff settings
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts including the first; 0 is treated as 1
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Why a retried call gave up
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// Every attempt failed with a retryable error
    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted {
        attempts: u32,
        last_error: RegistryError,
    },

    /// An attempt failed with an error that retrying cannot fix
    #[error("{0}")]
    Definitive(RegistryError),
}

impl RetryPolicy {
    /// Deterministic part of the delay after `attempt` failed
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let max = self.max_delay.as_millis() as f64;

        let clamped = if millis.is_nan() || millis < 0.0 {
            0.0
        } else {
            millis.min(max)
        };
        Duration::from_millis(clamped as u64)
    }

    /// Delay to sleep after `attempt` failed, jitter included
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if !self.jitter {
            return base;
        }

        let quarter = base.as_millis() as u64 / 4;
        if quarter == 0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..=quarter);
        (base + Duration::from_millis(jitter)).min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails definitively, or attempts run out
    pub async fn run<F, Fut, T>(&self, mut operation: F) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RegistryError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(RetryError::Definitive(err)),
                Err(err) if attempt >= max_attempts => {
                    warn!(attempts = attempt, error = %err, "Retries exhausted");
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last_error: err,
                    });
                }
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "Retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: true,
        }
    }

    #[test]
    fn test_base_delay_grows_and_clamps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay(1), Duration::from_millis(500));
        assert_eq!(policy.base_delay(2), Duration::from_millis(1000));
        assert_eq!(policy.base_delay(4), Duration::from_millis(4000));
        assert_eq!(policy.base_delay(20), Duration::from_secs(30));
        assert_eq!(policy.base_delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_bounded() {
        let policy = RetryPolicy::default();
        for attempt in 1..10 {
            let base = policy.base_delay(attempt);
            let delay = policy.delay_for(attempt);
            assert!(delay >= base);
            assert!(delay <= base + base / 4);
            assert!(delay <= policy.max_delay);
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = fast()
            .run(move |_| async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RegistryError::Unavailable("503".into()))
                } else {
                    Ok("ack")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ack");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_reports_attempts() {
        let result: Result<(), _> = fast()
            .run(|_| async { Err(RegistryError::Unavailable("down".into())) })
            .await;

        match result {
            Err(RetryError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_definitive_error_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = fast()
            .run(move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RegistryError::from_status(400, "bad"))
            })
            .await;

        assert!(matches!(result, Err(RetryError::Definitive(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
