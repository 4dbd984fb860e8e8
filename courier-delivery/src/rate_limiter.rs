//! Per-provider token buckets
//!
//! Every attempt takes one token from its provider's bucket. An empty bucket
//! reports how long until the next token, and the dispatcher waits that long
//! (cancellably) before trying again. Buckets refill at
//! `messages_per_second` up to `burst_size` and are created lazily on a
//! provider's first attempt.

use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::ConfigurationError;

/// Configuration for rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Default attempts per second per provider
    #[serde(default = "default_messages_per_second")]
    pub messages_per_second: f64,

    /// Default burst size (max tokens in bucket)
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,

    /// Per-provider rate limit overrides, keyed by provider name
    #[serde(default)]
    pub provider_limits: ahash::AHashMap<String, ProviderRateLimit>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            messages_per_second: default_messages_per_second(),
            burst_size: default_burst_size(),
            provider_limits: ahash::AHashMap::default(),
        }
    }
}

impl RateLimitConfig {
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidPolicy`] if any rate is not a
    /// positive number or any burst size is zero.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let limits = std::iter::once((
            "default",
            self.messages_per_second,
            self.burst_size,
        ))
        .chain(
            self.provider_limits
                .iter()
                .map(|(name, limit)| (name.as_str(), limit.messages_per_second, limit.burst_size)),
        );

        for (scope, rate, burst) in limits {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(ConfigurationError::InvalidPolicy(format!(
                    "rate limit for {scope} must be positive, got {rate}"
                )));
            }
            if burst == 0 {
                return Err(ConfigurationError::InvalidPolicy(format!(
                    "burst size for {scope} must be at least 1"
                )));
            }
        }

        Ok(())
    }
}

/// Floor for reported waits, so a caller sleeping on a nearly refilled bucket
/// always makes progress.
const MIN_WAIT: Duration = Duration::from_millis(1);

const fn default_messages_per_second() -> f64 {
    10.0
}

const fn default_burst_size() -> u32 {
    20
}

/// Limit for one provider's bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProviderRateLimit {
    /// Sustained attempts per second
    pub messages_per_second: f64,
    /// Attempts allowed back to back from a full bucket
    pub burst_size: u32,
}

impl RateLimitConfig {
    /// The override for `provider`, or the defaults
    fn limit_for(&self, provider: &str) -> ProviderRateLimit {
        self.provider_limits
            .get(provider)
            .copied()
            .unwrap_or(ProviderRateLimit {
                messages_per_second: self.messages_per_second,
                burst_size: self.burst_size,
            })
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    limit: ProviderRateLimit,
    updated: Instant,
}

impl TokenBucket {
    fn full(limit: ProviderRateLimit) -> Self {
        Self {
            tokens: f64::from(limit.burst_size),
            limit,
            updated: Instant::now(),
        }
    }

    /// Credit the tokens earned since the last update, up to the burst size
    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.updated).as_secs_f64();

        self.tokens = elapsed
            .mul_add(self.limit.messages_per_second, self.tokens)
            .min(f64::from(self.limit.burst_size));
        self.updated = now;
    }

    /// Take one token, or report how long until one is available
    fn take(&mut self) -> Result<(), Duration> {
        self.refill(Instant::now());

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }

        let missing = 1.0 - self.tokens;
        Err(
            Duration::try_from_secs_f64(missing / self.limit.messages_per_second)
                .unwrap_or(Duration::MAX)
                .max(MIN_WAIT),
        )
    }
}

/// Token buckets keyed by provider name
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<String, TokenBucket>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    /// Take a token for an attempt against `provider`.
    ///
    /// # Errors
    ///
    /// Returns the time to wait before asking again when the bucket is empty.
    pub fn check_rate_limit(&self, provider: &str) -> Result<(), Duration> {
        let taken = self.take(provider);

        if let Err(wait) = taken {
            tracing::debug!(
                provider,
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                "Provider bucket empty"
            );
        }

        taken
    }

    fn take(&self, provider: &str) -> Result<(), Duration> {
        if let Some(mut bucket) = self.buckets.get_mut(provider) {
            return bucket.take();
        }

        self.buckets
            .entry(provider.to_string())
            .or_insert_with(|| TokenBucket::full(self.config.limit_for(provider)))
            .take()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const LIMIT: ProviderRateLimit = ProviderRateLimit {
        messages_per_second: 10.0,
        burst_size: 20,
    };

    #[test]
    fn test_full_bucket_allows_a_burst() {
        let mut bucket = TokenBucket::full(LIMIT);

        for _ in 0..20 {
            assert!(bucket.take().is_ok());
        }

        let wait = bucket.take().unwrap_err();
        assert!(wait >= MIN_WAIT);
        assert!(wait <= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_refills_at_configured_rate() {
        let mut bucket = TokenBucket::full(LIMIT);
        while bucket.take().is_ok() {}

        tokio::time::advance(Duration::from_secs(1)).await;
        bucket.refill(Instant::now());

        // 10 tokens after 1 second at 10/sec
        assert!((bucket.tokens - 10.0).abs() < 0.1);

        tokio::time::advance(Duration::from_secs(60)).await;
        bucket.refill(Instant::now());
        assert!((bucket.tokens - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_buckets_are_per_provider() {
        let limiter = RateLimiter::new(RateLimitConfig {
            messages_per_second: 1.0,
            burst_size: 2,
            ..RateLimitConfig::default()
        });

        assert!(limiter.check_rate_limit("user1@example.com").is_ok());
        assert!(limiter.check_rate_limit("user1@example.com").is_ok());
        assert!(limiter.check_rate_limit("user1@example.com").is_err());

        assert!(limiter.check_rate_limit("user2@example.com").is_ok());
    }

    #[test]
    fn test_provider_override() {
        let mut config = RateLimitConfig::default();
        config.provider_limits.insert(
            "fast@example.com".to_string(),
            ProviderRateLimit {
                messages_per_second: 100.0,
                burst_size: 100,
            },
        );
        assert_eq!(config.limit_for("slow@example.com"), LIMIT);

        let limiter = RateLimiter::new(config);

        for _ in 0..100 {
            assert!(limiter.check_rate_limit("fast@example.com").is_ok());
        }

        for _ in 0..20 {
            assert!(limiter.check_rate_limit("slow@example.com").is_ok());
        }
        assert!(limiter.check_rate_limit("slow@example.com").is_err());
    }

    #[test]
    fn test_config_validation() {
        assert!(RateLimitConfig::default().validate().is_ok());

        let config = RateLimitConfig {
            messages_per_second: 0.0,
            ..RateLimitConfig::default()
        };
        assert!(config.validate().is_err());

        let mut config = RateLimitConfig::default();
        config.provider_limits.insert(
            "user1@example.com".to_string(),
            ProviderRateLimit {
                messages_per_second: 1.0,
                burst_size: 0,
            },
        );
        assert!(config.validate().is_err());
    }
}
