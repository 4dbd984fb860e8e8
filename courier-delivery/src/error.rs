//! Typed error handling for dispatch operations.
//!
//! Only conditions that prevent a request from being attempted at all are
//! errors. A provider rejecting a message is a normal [`AttemptResult`] and an
//! exhausted or cancelled request is a normal [`DeliveryOutcome`].
//!
//! [`AttemptResult`]: crate::AttemptResult
//! [`DeliveryOutcome`]: crate::DeliveryOutcome

use thiserror::Error;

/// Top-level dispatch error type.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The dispatcher or its registry is misconfigured; no attempt was made.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// A request with the same id was already accepted inside the
    /// idempotency window.
    #[error("Duplicate request: {0}")]
    Duplicate(String),
}

/// Misconfiguration detected before any delivery attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Fallback needs at least two distinct providers.
    #[error("At least {required} providers are required, found {found}")]
    TooFewProviders { found: usize, required: usize },

    /// A provider with this name is already registered.
    #[error("Provider already registered: {0}")]
    DuplicateProvider(String),

    /// No provider with this name is registered.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// The retry policy is not usable.
    #[error("Invalid retry policy: {0}")]
    InvalidPolicy(String),
}

impl DeliveryError {
    /// Returns `true` if this error stems from configuration.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns `true` if this request was suppressed as a duplicate.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}
