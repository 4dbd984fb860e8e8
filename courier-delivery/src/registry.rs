//! Provider registry
//!
//! Holds the ordered set of providers known to a dispatcher. The registry is
//! built once and is read-only afterwards, so it can be shared between any
//! number of concurrent requests behind an `Arc` without synchronisation.
//!
//! # Selection rules
//!
//! - **Primary**: uniform random pick among all registered providers.
//! - **Fallback**: the provider registered immediately after the excluded one,
//!   wrapping around to the first. With two providers this is always "the
//!   other one".

use std::{fmt, sync::Arc};

use rand::Rng;

use crate::{error::ConfigurationError, provider::Provider};

/// Fallback is only meaningful with at least this many providers.
pub const MINIMUM_PROVIDERS: usize = 2;

/// Ordered, name-unique collection of providers
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn Provider>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from providers in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateProvider`] if two providers
    /// share a name.
    pub fn from_providers<I>(providers: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = Arc<dyn Provider>>,
    {
        let mut registry = Self::new();
        for provider in providers {
            registry.register(provider)?;
        }
        Ok(registry)
    }

    /// Append a provider to the registration order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateProvider`] if a provider with
    /// the same name is already registered.
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> Result<(), ConfigurationError> {
        if self.position(provider.name()).is_some() {
            return Err(ConfigurationError::DuplicateProvider(
                provider.name().to_string(),
            ));
        }

        self.providers.push(provider);
        Ok(())
    }

    /// Look up a provider by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.position(name).map(|index| self.providers[index].clone())
    }

    /// Names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|provider| provider.name())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Check that the registry can support primary selection plus fallback.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::TooFewProviders`] with fewer than
    /// [`MINIMUM_PROVIDERS`] registered.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.providers.len() < MINIMUM_PROVIDERS {
            return Err(ConfigurationError::TooFewProviders {
                found: self.providers.len(),
                required: MINIMUM_PROVIDERS,
            });
        }
        Ok(())
    }

    /// Pick the primary provider for a request, uniformly at random.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::TooFewProviders`] with fewer than
    /// [`MINIMUM_PROVIDERS`] registered.
    pub fn select_primary(&self) -> Result<Arc<dyn Provider>, ConfigurationError> {
        self.validate()?;

        let index = rand::rng().random_range(0..self.providers.len());
        Ok(self.providers[index].clone())
    }

    /// Pick the fallback for `excluding`: the next provider in registration
    /// order, wrapping around. Never returns `excluding` itself.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::TooFewProviders`] with fewer than
    /// [`MINIMUM_PROVIDERS`] registered, or
    /// [`ConfigurationError::UnknownProvider`] if `excluding` is not registered.
    pub fn select_fallback(&self, excluding: &str) -> Result<Arc<dyn Provider>, ConfigurationError> {
        self.validate()?;

        let index = self
            .position(excluding)
            .ok_or_else(|| ConfigurationError::UnknownProvider(excluding.to_string()))?;

        Ok(self.providers[(index + 1) % self.providers.len()].clone())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.providers
            .iter()
            .position(|provider| provider.name() == name)
    }
}
