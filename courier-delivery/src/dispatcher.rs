//! Delivery orchestration
//!
//! Executes the retry/fallback policy for one request at a time.
//!
//! ## State machine
//!
//! ```text
//! Initial ──> Attempting(primary) ──delivered──> Success
//!                 │      ^
//!        rejected │      │ backoff elapsed
//!                 v      │
//!         attempts < max_retries ? Retrying ─┘
//!                 │
//!                 │ attempts >= max_retries
//!                 v
//!            Exhausted ──> AttemptingFallback ──delivered──> Success
//!                                  │
//!                                  └──rejected──> Failed
//! ```
//!
//! Cancellation is observed before each attempt, during rate-limit waits,
//! while a provider call is in flight and during backoff. Once observed, no
//! further provider is invoked and the request ends as `Cancelled`.
//!
//! All per-request state lives in [`RequestState`] on the stack of the
//! `send` call; a [`Dispatcher`] can serve any number of concurrent requests.

use std::{sync::Arc, time::Duration};

use courier_common::{
    internal, outgoing,
    tracing::{info, warn},
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::DispatcherConfig,
    error::{ConfigurationError, DeliveryError},
    message::{Message, SendRequest},
    outcome::{AttemptRecord, AttemptTier, DeliveryOutcome, DeliveryStatus},
    policy::RetryPolicy,
    provider::{AttemptResult, Provider},
    rate_limiter::RateLimiter,
    registry::ProviderRegistry,
};

/// What happened when the dispatcher tried to run one attempt
enum AttemptStep {
    /// The provider answered
    Finished(AttemptResult),
    /// Cancelled while the provider call was outstanding
    Abandoned,
    /// Cancelled before the provider was invoked
    NotStarted,
}

/// Bookkeeping for a single request
struct RequestState {
    attempts_made: u32,
    history: Vec<AttemptRecord>,
}

impl RequestState {
    const fn new() -> Self {
        Self {
            attempts_made: 0,
            history: Vec::new(),
        }
    }

    fn record(
        &mut self,
        provider: &str,
        tier: AttemptTier,
        result: Option<AttemptResult>,
        backoff_before: Option<Duration>,
    ) {
        self.attempts_made += 1;
        self.history.push(AttemptRecord {
            number: self.attempts_made,
            provider: provider.to_string(),
            tier,
            result,
            backoff_before,
        });
    }

    fn finish(self, status: DeliveryStatus, provider: &str, used_fallback: bool) -> DeliveryOutcome {
        DeliveryOutcome {
            status,
            attempts_made: self.attempts_made,
            provider_used: provider.to_string(),
            used_fallback,
            history: self.history,
        }
    }
}

/// Runs the retry/backoff/fallback policy against a provider registry.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
    policy: RetryPolicy,
    attempt_timeout: Option<Duration>,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl Dispatcher {
    /// Create a dispatcher over `registry` using `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] if the policy is invalid or
    /// the registry holds fewer than two providers.
    pub fn new(registry: Arc<ProviderRegistry>, policy: RetryPolicy) -> Result<Self, DeliveryError> {
        policy.validate()?;
        registry.validate()?;

        internal!(
            level = DEBUG,
            providers = registry.len(),
            max_retries = policy.max_retries,
            base_delay_ms = policy.base_delay_ms,
            "Dispatcher initialised"
        );

        Ok(Self {
            registry,
            policy,
            attempt_timeout: None,
            rate_limiter: None,
        })
    }

    /// Create a dispatcher from configuration, wiring the attempt timeout and
    /// rate limiter when present.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] if any part of the
    /// configuration is invalid or the registry is too small.
    pub fn from_config(
        registry: Arc<ProviderRegistry>,
        config: &DispatcherConfig,
    ) -> Result<Self, DeliveryError> {
        let mut dispatcher = Self::new(registry, config.policy.clone())?;

        if let Some(timeout) = config.attempt_timeout() {
            dispatcher = dispatcher.with_attempt_timeout(timeout);
        }

        if let Some(rate_limit) = &config.rate_limit {
            rate_limit.validate()?;
            dispatcher = dispatcher.with_rate_limiter(RateLimiter::new(rate_limit.clone()));
        }

        Ok(dispatcher)
    }

    /// Treat any attempt running longer than `timeout` as rejected.
    #[must_use]
    pub const fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Gate every attempt on a token from the target provider's bucket.
    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(Arc::new(rate_limiter));
        self
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver `request`, running to a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] if no primary or fallback
    /// provider can be resolved. Rejections are never errors.
    pub async fn send(&self, request: &SendRequest) -> Result<DeliveryOutcome, DeliveryError> {
        self.send_with_cancellation(request, &CancellationToken::new())
            .await
    }

    /// Deliver `request`, abandoning it as soon as `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] if no primary or fallback
    /// provider can be resolved. Rejections and cancellation are reported
    /// through the outcome.
    #[tracing::instrument(level = "debug", skip_all, fields(recipient = %request.recipient))]
    pub async fn send_with_cancellation(
        &self,
        request: &SendRequest,
        cancel: &CancellationToken,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let mut state = RequestState::new();

        let primary_name = self.registry.select_primary()?.name().to_string();

        internal!(level = DEBUG, provider = %primary_name, "Selected primary provider");

        let mut backoff_before = None;
        loop {
            let provider = self
                .registry
                .get(&primary_name)
                .ok_or_else(|| ConfigurationError::UnknownProvider(primary_name.clone()))?;

            let message = Message::for_provider(request, &primary_name);
            match self.attempt(provider.as_ref(), &message, cancel).await {
                AttemptStep::Finished(result) => {
                    state.record(&primary_name, AttemptTier::Primary, Some(result), backoff_before);
                    if result.is_delivered() {
                        info!(
                            provider = %primary_name,
                            attempts = state.attempts_made,
                            "Message delivered"
                        );
                        return Ok(state.finish(DeliveryStatus::Delivered, &primary_name, false));
                    }

                    internal!(
                        level = DEBUG,
                        provider = %primary_name,
                        attempt = state.attempts_made,
                        "Attempt rejected"
                    );
                }
                AttemptStep::Abandoned => {
                    state.record(&primary_name, AttemptTier::Primary, None, backoff_before);
                    return Ok(Self::cancelled(state, &primary_name, false));
                }
                AttemptStep::NotStarted => {
                    return Ok(Self::cancelled(state, &primary_name, false));
                }
            }

            if !self.policy.should_retry(state.attempts_made) {
                break;
            }

            let delay = self.policy.backoff_delay(state.attempts_made);
            internal!(
                level = DEBUG,
                provider = %primary_name,
                attempt = state.attempts_made,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Retrying after backoff"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Ok(Self::cancelled(state, &primary_name, false));
                }
                () = tokio::time::sleep(delay) => {}
            }

            backoff_before = Some(delay);
        }

        let fallback = self.registry.select_fallback(&primary_name)?;
        let fallback_name = fallback.name().to_string();

        warn!(
            primary = %primary_name,
            fallback = %fallback_name,
            attempts = state.attempts_made,
            "Primary provider exhausted, switching to fallback"
        );

        let message = Message::for_provider(request, &fallback_name);
        match self.attempt(fallback.as_ref(), &message, cancel).await {
            AttemptStep::Finished(result) => {
                state.record(&fallback_name, AttemptTier::Fallback, Some(result), None);
                if result.is_delivered() {
                    info!(
                        provider = %fallback_name,
                        attempts = state.attempts_made,
                        "Message delivered by fallback provider"
                    );
                    Ok(state.finish(DeliveryStatus::Delivered, &fallback_name, true))
                } else {
                    warn!(
                        provider = %fallback_name,
                        attempts = state.attempts_made,
                        "Fallback provider rejected message, giving up"
                    );
                    Ok(state.finish(DeliveryStatus::Failed, &fallback_name, true))
                }
            }
            AttemptStep::Abandoned => {
                state.record(&fallback_name, AttemptTier::Fallback, None, None);
                Ok(Self::cancelled(state, &fallback_name, true))
            }
            AttemptStep::NotStarted => Ok(Self::cancelled(state, &primary_name, false)),
        }
    }

    /// Run one attempt against `provider`, honouring rate limits, the
    /// attempt timeout and cancellation.
    async fn attempt(
        &self,
        provider: &dyn Provider,
        message: &Message,
        cancel: &CancellationToken,
    ) -> AttemptStep {
        if cancel.is_cancelled() {
            return AttemptStep::NotStarted;
        }

        if let Some(rate_limiter) = &self.rate_limiter {
            while let Err(wait) = rate_limiter.check_rate_limit(provider.name()) {
                internal!(
                    provider = %provider.name(),
                    wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    "Waiting for rate limit"
                );

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return AttemptStep::NotStarted,
                    () = tokio::time::sleep(wait) => {}
                }
            }
        }

        outgoing!(provider = %provider.name(), recipient = %message.recipient, "Attempting delivery");

        let call = async {
            match self.attempt_timeout {
                Some(timeout) => tokio::time::timeout(timeout, provider.attempt_send(message))
                    .await
                    .unwrap_or_else(|_| {
                        warn!(
                            provider = %provider.name(),
                            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                            "Attempt timed out"
                        );
                        AttemptResult::Rejected
                    }),
                None => provider.attempt_send(message).await,
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => AttemptStep::Abandoned,
            result = call => AttemptStep::Finished(result),
        }
    }

    fn cancelled(state: RequestState, provider: &str, used_fallback: bool) -> DeliveryOutcome {
        info!(
            provider,
            attempts = state.attempts_made,
            "Delivery cancelled"
        );
        state.finish(DeliveryStatus::Cancelled, provider, used_fallback)
    }
}
