//! Provider capability and the simulated transport
//!
//! A provider is an interchangeable, individually unreliable transport. The
//! engine only ever asks it to attempt one message and observes whether that
//! attempt was delivered or rejected; how the provider does its work is its
//! own business.

use std::time::Duration;

use async_trait::async_trait;
use courier_common::outgoing;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Result of a single delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptResult {
    Delivered,
    Rejected,
}

impl AttemptResult {
    #[must_use]
    pub const fn is_delivered(self) -> bool {
        matches!(self, Self::Delivered)
    }
}

impl From<bool> for AttemptResult {
    fn from(delivered: bool) -> Self {
        if delivered {
            Self::Delivered
        } else {
            Self::Rejected
        }
    }
}

/// A delivery transport the dispatcher can attempt a message against.
///
/// Implementations must be cheap to call concurrently; the dispatcher shares
/// one instance between every in-flight request.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identity of this provider, also used as the message sender.
    fn name(&self) -> &str;

    /// Attempt to deliver `message` once.
    async fn attempt_send(&self, message: &Message) -> AttemptResult;
}

/// Configuration for a [`SimulatedProvider`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedProviderConfig {
    /// Provider identity, e.g. `user1@example.com`
    pub name: String,

    /// Probability (0.0 to 1.0) that an attempt is delivered
    ///
    /// Default: 0.5
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,

    /// Artificial latency added to every attempt (in milliseconds)
    ///
    /// Default: 0
    #[serde(default)]
    pub latency_ms: u64,
}

const fn default_success_rate() -> f64 {
    0.5
}

/// A provider that delivers with a fixed probability.
///
/// Stands in for a real transport when running the engine without one.
#[derive(Debug, Clone)]
pub struct SimulatedProvider {
    name: String,
    success_rate: f64,
    latency: Duration,
}

impl SimulatedProvider {
    /// Create a provider delivering with probability `success_rate`, clamped
    /// into `0.0..=1.0`.
    #[must_use]
    pub fn new(name: impl Into<String>, success_rate: f64) -> Self {
        let success_rate = if success_rate.is_nan() {
            0.0
        } else {
            success_rate.clamp(0.0, 1.0)
        };

        Self {
            name: name.into(),
            success_rate,
            latency: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    #[must_use]
    pub const fn success_rate(&self) -> f64 {
        self.success_rate
    }
}

impl From<&SimulatedProviderConfig> for SimulatedProvider {
    fn from(config: &SimulatedProviderConfig) -> Self {
        Self::new(config.name.clone(), config.success_rate)
            .with_latency(Duration::from_millis(config.latency_ms))
    }
}

#[async_trait]
impl Provider for SimulatedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt_send(&self, message: &Message) -> AttemptResult {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let result = AttemptResult::from(rand::rng().random_bool(self.success_rate));

        outgoing!(
            provider = %self.name,
            recipient = %message.recipient,
            ?result,
            "Simulated provider attempt"
        );

        result
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::message::SendRequest;

    fn message() -> Message {
        Message::for_provider(
            &SendRequest::new("recipient@example.com", "Test Subject", "Test Body"),
            "user1@example.com",
        )
    }

    #[tokio::test]
    async fn test_certain_success() {
        let provider = SimulatedProvider::new("user1@example.com", 1.0);
        for _ in 0..32 {
            assert_eq!(
                provider.attempt_send(&message()).await,
                AttemptResult::Delivered
            );
        }
    }

    #[tokio::test]
    async fn test_certain_failure() {
        let provider = SimulatedProvider::new("user1@example.com", 0.0);
        for _ in 0..32 {
            assert_eq!(
                provider.attempt_send(&message()).await,
                AttemptResult::Rejected
            );
        }
    }

    #[test]
    fn test_success_rate_is_clamped() {
        assert!((SimulatedProvider::new("a", 4.0).success_rate() - 1.0).abs() < f64::EPSILON);
        assert!(SimulatedProvider::new("a", -1.0).success_rate().abs() < f64::EPSILON);
        assert!(SimulatedProvider::new("a", f64::NAN).success_rate().abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_applied() {
        let provider = SimulatedProvider::new("user1@example.com", 1.0)
            .with_latency(Duration::from_millis(250));

        let start = tokio::time::Instant::now();
        provider.attempt_send(&message()).await;
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[test]
    fn test_config_defaults() {
        let config: SimulatedProviderConfig =
            ron::from_str(r#"(name: "user2@example.com")"#).expect("valid config");
        let provider = SimulatedProvider::from(&config);

        assert_eq!(provider.name(), "user2@example.com");
        assert!((provider.success_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_attempt_result_from_bool() {
        assert!(AttemptResult::from(true).is_delivered());
        assert!(!AttemptResult::from(false).is_delivered());
    }
}
