//! Retry policy for dispatch operations.
//!
//! Owns the attempt limit and the exponential backoff schedule applied between
//! primary attempts. The policy is fixed per dispatcher; per-request attempt
//! counts are passed in rather than stored.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Number of attempts made against the primary provider before switching
    /// to the fallback.
    ///
    /// Default: 2
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff (in milliseconds).
    ///
    /// The wait after the `n`th failed primary attempt is `base * 2^n`.
    ///
    /// Default: 1000 milliseconds
    #[serde(default = "defaults::base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for a single backoff wait (in milliseconds).
    ///
    /// Once the cap is reached successive waits are equal rather than
    /// strictly increasing.
    ///
    /// Default: None (uncapped)
    #[serde(default)]
    pub max_delay_ms: Option<u64>,

    /// Jitter factor for randomising backoff waits (0.0 to 1.0).
    ///
    /// A factor of 0.2 means ±20%. Any non-zero factor means successive
    /// waits are no longer guaranteed to increase.
    ///
    /// Default: 0.0 (exact schedule)
    #[serde(default)]
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            base_delay_ms: defaults::base_delay_ms(),
            max_delay_ms: None,
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_base_delay(mut self, base: Duration) -> Self {
        self.base_delay_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Check the policy is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidPolicy`] if `max_retries` is zero
    /// or `jitter_factor` lies outside `0.0..=1.0`.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_retries == 0 {
            return Err(ConfigurationError::InvalidPolicy(
                "max_retries must be at least 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigurationError::InvalidPolicy(format!(
                "jitter_factor must be within 0.0..=1.0, got {}",
                self.jitter_factor
            )));
        }

        Ok(())
    }

    /// Whether another primary attempt is allowed after `attempts_made`.
    #[must_use]
    pub const fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_retries
    }

    /// Wait before the next primary attempt, after `attempt` (1-indexed)
    /// attempts have failed.
    ///
    /// # Formula
    /// `delay = min(base * 2^attempt, max_delay) * (1 ± jitter)`
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = if attempt >= 64 {
            u64::MAX
        } else {
            self.base_delay_ms.saturating_mul(1u64 << attempt)
        };
        let delay = self.max_delay_ms.map_or(delay, |max| delay.min(max));

        if self.jitter_factor <= 0.0 || delay == 0 {
            return Duration::from_millis(delay);
        }

        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let jittered = {
            let jitter_range = (delay as f64) * self.jitter_factor;
            let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
            ((delay as f64) + jitter).max(0.0) as u64
        };

        Duration::from_millis(jittered)
    }
}

mod defaults {
    pub const fn max_retries() -> u32 {
        2
    }

    pub const fn base_delay_ms() -> u64 {
        1000 // 1 second
    }
}
