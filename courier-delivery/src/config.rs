//! Dispatcher configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{policy::RetryPolicy, rate_limiter::RateLimitConfig};

/// Configuration for a [`Dispatcher`](crate::Dispatcher) and the layers
/// around it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Retry and backoff policy
    #[serde(default)]
    pub policy: RetryPolicy,

    /// Maximum duration of a single provider attempt (in milliseconds)
    ///
    /// An attempt exceeding this is treated as rejected.
    ///
    /// Default: None (no limit)
    #[serde(default)]
    pub attempt_timeout_ms: Option<u64>,

    /// Per-provider rate limiting
    ///
    /// Default: None (disabled)
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,

    /// How long a request id is remembered for duplicate suppression
    /// (in seconds)
    ///
    /// Default: None (disabled)
    #[serde(default)]
    pub idempotency_ttl_secs: Option<u64>,
}

impl DispatcherConfig {
    #[must_use]
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub fn idempotency_ttl(&self) -> Option<Duration> {
        self.idempotency_ttl_secs.map(Duration::from_secs)
    }
}
