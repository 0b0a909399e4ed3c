//! Retry and backoff logic for Folio store transactions
//!
//! Store transactions are all-or-nothing, so a transaction that lost a
//! uniqueness race can simply be run again from scratch. This crate decides
//! which errors qualify for that, how many extra attempts are allowed, and
//! how long to wait between them.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors produced while building a retry policy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("multiplier must be at least 1.0, got {0}")]
    InvalidMultiplier(String),
    #[error("max interval {max:?} is shorter than initial interval {initial:?}")]
    InvalidInterval { initial: Duration, max: Duration },
}

/// Trait for categorizing errors as transient or permanent
pub trait RetryableError {
    /// Returns true if the error is transient and the operation should be retried
    fn is_transient(&self) -> bool;

    /// Returns true if the error is permanent and retries should stop
    fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

/// How many times a transient failure is retried and how long to pause in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_interval: Duration,
    max_interval: Duration,
    multiplier: f64,
}

impl RetryPolicy {
    /// Create a policy allowing `max_retries` extra attempts after the first one.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::new(0)
    }

    /// Set the pause before the first retry
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        if self.max_interval < interval {
            self.max_interval = interval;
        }
        self
    }

    /// Set the upper bound for a single pause
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set the growth factor between pauses
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    /// Check the policy parameters
    pub fn validate(&self) -> Result<(), PolicyError> {
        if !(self.multiplier >= 1.0) {
            return Err(PolicyError::InvalidMultiplier(self.multiplier.to_string()));
        }
        if self.max_interval < self.initial_interval {
            return Err(PolicyError::InvalidInterval {
                initial: self.initial_interval,
                max: self.max_interval,
            });
        }
        Ok(())
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_interval)
            .with_multiplier(self.multiplier)
            .with_max_elapsed_time(None)
            .build()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        conflict_retry_policy()
    }
}

/// Policy for version-number allocation races: one retry after a short pause.
pub fn conflict_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 1,
        initial_interval: Duration::from_millis(10),
        max_interval: Duration::from_millis(250),
        multiplier: 2.0,
    }
}

/// Run `f` until it succeeds, fails permanently, or the policy is exhausted.
///
/// `f` receives the 1-based attempt number. The error of the last attempt is
/// returned unchanged, so callers see the same error type they produced.
pub fn retry<T, E, F>(op_name: &'static str, policy: &RetryPolicy, mut f: F) -> Result<T, E>
where
    E: RetryableError + std::fmt::Display,
    F: FnMut(u32) -> Result<T, E>,
{
    let mut backoff = policy.backoff();
    backoff.reset();
    let mut attempt = 1;

    loop {
        debug!("Attempting operation '{}' (attempt {})", op_name, attempt);

        match f(attempt) {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        "Operation '{}' succeeded after {} attempts",
                        op_name, attempt
                    );
                }
                return Ok(value);
            }
            Err(err) if err.is_permanent() => return Err(err),
            Err(err) => {
                if attempt > policy.max_retries {
                    warn!(
                        "Operation '{}' still failing after {} attempts: {}",
                        op_name, attempt, err
                    );
                    return Err(err);
                }

                warn!(
                    "Operation '{}' failed on attempt {}, retrying: {}",
                    op_name, attempt, err
                );
                let pause = backoff.next_backoff().unwrap_or(policy.max_interval);
                std::thread::sleep(pause);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Busy,
        Broken,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl RetryableError for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, TestError::Busy)
        }
    }

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries).with_initial_interval(Duration::from_millis(1))
    }

    #[test]
    fn test_successful_operation() {
        let result: Result<&str, TestError> = retry("test_op", &fast(1), |_| Ok("success"));
        assert_eq!(result, Ok("success"));
    }

    #[test]
    fn test_transient_failure_then_success() {
        let calls = Cell::new(0);
        let result = retry("test_op", &fast(1), |attempt| {
            calls.set(calls.get() + 1);
            if attempt == 1 {
                Err(TestError::Busy)
            } else {
                Ok(attempt)
            }
        });

        assert_eq!(result, Ok(2));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_repeated_transient_failure_is_surfaced() {
        let calls = Cell::new(0);
        let result: Result<(), TestError> = retry("test_op", &fast(1), |_| {
            calls.set(calls.get() + 1);
            Err(TestError::Busy)
        });

        assert_eq!(result, Err(TestError::Busy));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_permanent_failure_is_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), TestError> = retry("test_op", &fast(3), |_| {
            calls.set(calls.get() + 1);
            Err(TestError::Broken)
        });

        assert_eq!(result, Err(TestError::Broken));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_no_retry_policy() {
        let calls = Cell::new(0);
        let _: Result<(), TestError> = retry("test_op", &RetryPolicy::no_retry(), |_| {
            calls.set(calls.get() + 1);
            Err(TestError::Busy)
        });
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_policy_validation() {
        assert!(conflict_retry_policy().validate().is_ok());
        assert!(fast(1).with_multiplier(0.5).validate().is_err());

        let inverted = RetryPolicy::new(1)
            .with_initial_interval(Duration::from_millis(100))
            .with_max_interval(Duration::from_millis(10));
        assert!(matches!(
            inverted.validate(),
            Err(PolicyError::InvalidInterval { .. })
        ));
    }
}
