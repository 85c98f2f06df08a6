//! Bounded polling with configurable backoff.
//!
//! [`PollExecutor`] drives a probe closure for a fixed number of rounds. Each
//! round waits first and probes second, so a caller that has just observed a
//! busy resource gives the other party time to finish before looking again.
//! Waiting goes through a [`Sleeper`] and can be interrupted between rounds by
//! a [`CancelFlag`].

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use super::cancel::CancelFlag;
use super::clock::{Sleeper, SystemClock};

/// Errors that can occur during polling operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    /// Every round ran without the probe producing a value
    #[error("All {attempts} polling rounds exhausted after waiting {waited:?}")]
    AttemptsExhausted {
        /// Rounds executed
        attempts: u32,
        /// Total time spent sleeping
        waited: Duration,
    },

    /// The polling configuration is invalid
    #[error("Invalid retry configuration: {message}")]
    InvalidConfiguration {
        /// What was wrong
        message: String,
    },

    /// Cancellation was requested between rounds
    #[error("Polling cancelled after {attempts} rounds")]
    Cancelled {
        /// Rounds completed before cancellation was observed
        attempts: u32,
    },
}

/// Result type for polling operations
pub type RetryResult<T> = Result<T, RetryError>;

/// Backoff strategy for calculating delays between rounds
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay before every round
    Fixed(Duration),
    /// Linear backoff: initial_delay + (attempt * increment)
    Linear {
        /// Delay before the first round
        initial_delay: Duration,
        /// Added per subsequent round
        increment: Duration,
    },
    /// Exponential backoff: initial_delay * base^attempt, capped at max_delay
    Exponential {
        /// Delay before the first round
        initial_delay: Duration,
        /// Growth factor
        base: f64,
        /// Upper bound for any single delay
        max_delay: Duration,
    },
}

impl BackoffStrategy {
    /// Calculate the delay for the given zero-based attempt
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed(delay) => *delay,
            BackoffStrategy::Linear { initial_delay, increment } => {
                initial_delay.saturating_add(increment.saturating_mul(attempt))
            }
            BackoffStrategy::Exponential { initial_delay, base, max_delay } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let delay = initial_delay.as_millis() as f64 * base.powi(exponent);
                let delay_ms = delay.min(max_delay.as_millis() as f64) as u64;
                Duration::from_millis(delay_ms)
            }
        }
    }
}

/// Configuration for polling behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of rounds
    pub max_attempts: u32,
    /// Backoff strategy for calculating delays
    pub backoff: BackoffStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 6, backoff: BackoffStrategy::Fixed(Duration::from_secs(2)) }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::InvalidConfiguration`] when `max_attempts` is zero
    /// or an exponential base is not positive.
    pub fn validate(&self) -> RetryResult<()> {
        if self.max_attempts == 0 {
            return Err(RetryError::InvalidConfiguration {
                message: "max_attempts must be greater than 0".to_string(),
            });
        }

        match &self.backoff {
            BackoffStrategy::Exponential { base, .. } if *base <= 0.0 => {
                Err(RetryError::InvalidConfiguration {
                    message: "exponential base must be greater than 0".to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Sum of every delay the configuration would sleep through
    pub fn total_wait(&self) -> Duration {
        (0..self.max_attempts)
            .map(|attempt| self.backoff.calculate_delay(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    /// Start from [`RetryConfig::default`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of rounds
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Use the same delay before every round
    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    /// Grow the delay linearly
    pub fn linear_backoff(mut self, initial_delay: Duration, increment: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Linear { initial_delay, increment };
        self
    }

    /// Grow the delay exponentially up to `max_delay`
    pub fn exponential_backoff(
        mut self,
        initial_delay: Duration,
        base: f64,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = BackoffStrategy::Exponential { initial_delay, base, max_delay };
        self
    }

    /// Validate and build
    ///
    /// # Errors
    ///
    /// Propagates [`RetryConfig::validate`] failures.
    pub fn build(self) -> RetryResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Value produced by a successful poll, with bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome<T> {
    /// What the probe returned
    pub value: T,
    /// One-based round on which the probe succeeded
    pub attempts: u32,
    /// Total time spent sleeping before success
    pub waited: Duration,
}

/// Executes a probe for a bounded number of rounds, sleeping before each.
#[derive(Debug, Clone)]
pub struct PollExecutor<S = SystemClock> {
    config: RetryConfig,
    sleeper: S,
    cancel: Option<CancelFlag>,
}

impl PollExecutor<SystemClock> {
    /// Create an executor that blocks on the real clock
    pub fn new(config: RetryConfig) -> Self {
        Self::with_sleeper(config, SystemClock)
    }
}

impl<S: Sleeper> PollExecutor<S> {
    /// Create an executor with a custom sleeper
    pub fn with_sleeper(config: RetryConfig, sleeper: S) -> Self {
        Self { config, sleeper, cancel: None }
    }

    /// Check `flag` before and after every sleep
    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }

    /// Run `probe` until it returns `Some` or the rounds run out.
    ///
    /// The probe receives the one-based round number.
    ///
    /// # Errors
    ///
    /// - [`RetryError::InvalidConfiguration`] if the config does not validate
    /// - [`RetryError::Cancelled`] if the cancel flag is raised between rounds
    /// - [`RetryError::AttemptsExhausted`] if no round produced a value
    pub fn poll<T, F>(&self, mut probe: F) -> RetryResult<PollOutcome<T>>
    where
        F: FnMut(u32) -> Option<T>,
    {
        self.config.validate()?;

        let mut waited = Duration::ZERO;
        for attempt in 1..=self.config.max_attempts {
            if self.cancelled() {
                debug!(attempt, "poll.cancelled");
                return Err(RetryError::Cancelled { attempts: attempt - 1 });
            }

            let delay = self.config.backoff.calculate_delay(attempt - 1);
            self.sleeper.sleep(delay);
            waited = waited.saturating_add(delay);

            if self.cancelled() {
                debug!(attempt, "poll.cancelled");
                return Err(RetryError::Cancelled { attempts: attempt - 1 });
            }

            if let Some(value) = probe(attempt) {
                debug!(attempt, waited_ms = waited.as_millis() as u64, "poll.satisfied");
                return Ok(PollOutcome { value, attempts: attempt, waited });
            }
            debug!(attempt, max_attempts = self.config.max_attempts, "poll.round_empty");
        }

        warn!(
            attempts = self.config.max_attempts,
            waited_ms = waited.as_millis() as u64,
            "poll.exhausted"
        );
        Err(RetryError::AttemptsExhausted { attempts: self.config.max_attempts, waited })
    }
}
