//! Resilient message dispatch
//!
//! This crate provides:
//! - A [`ProviderRegistry`] of interchangeable, individually unreliable
//!   delivery providers
//! - A [`Dispatcher`] that picks a primary provider, retries it with
//!   exponential backoff and falls back to an alternate provider once
//! - Optional per-provider rate limiting and caller-keyed duplicate
//!   suppression

mod config;
mod dispatcher;
mod error;
mod idempotency;
mod message;
mod outcome;
pub mod policy;
mod provider;
mod rate_limiter;
mod registry;

pub use config::DispatcherConfig;
pub use dispatcher::Dispatcher;
pub use error::{ConfigurationError, DeliveryError};
pub use idempotency::{IdempotencyGuard, IdempotentDispatcher};
pub use message::{Message, SendRequest};
pub use outcome::{AttemptRecord, AttemptTier, DeliveryOutcome, DeliveryStatus};
pub use policy::RetryPolicy;
pub use provider::{AttemptResult, Provider, SimulatedProvider, SimulatedProviderConfig};
pub use rate_limiter::{ProviderRateLimit, RateLimitConfig, RateLimiter};
pub use registry::{MINIMUM_PROVIDERS, ProviderRegistry};

/// Re-exported so callers can cancel a send without depending on
/// `tokio-util` directly.
pub use tokio_util::sync::CancellationToken;
