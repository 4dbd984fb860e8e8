//! Builds the dispatch stack from configuration and drives requests through it

use std::{sync::Arc, time::Duration};

use courier_common::internal;
use courier_delivery::{
    CancellationToken, DeliveryError, DeliveryOutcome, Dispatcher, IdempotentDispatcher, Provider,
    ProviderRegistry, SendRequest, SimulatedProvider,
};
use tokio::task::JoinSet;

use crate::{config::CourierConfig, response::Response};

#[derive(Debug)]
enum Service {
    Direct(Dispatcher),
    Idempotent(IdempotentDispatcher),
}

/// The configured dispatcher, optionally fronted by duplicate suppression
#[derive(Debug)]
pub struct Courier {
    service: Service,
}

impl Courier {
    /// Register the configured providers and build the dispatcher around them.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] if a provider name repeats,
    /// fewer than two providers are configured, or the dispatcher settings are
    /// invalid.
    pub fn from_config(config: &CourierConfig) -> Result<Self, DeliveryError> {
        let registry = ProviderRegistry::from_providers(config.providers.iter().map(|provider| {
            let provider = SimulatedProvider::from(provider);
            internal!(
                level = DEBUG,
                provider = %provider.name(),
                success_rate = provider.success_rate(),
                "Registering provider"
            );
            Arc::new(provider) as Arc<dyn Provider>
        }))?;

        let dispatcher = Dispatcher::from_config(Arc::new(registry), &config.dispatcher)?;

        let service = match config.dispatcher.idempotency_ttl() {
            Some(ttl) => Service::Idempotent(IdempotentDispatcher::new(dispatcher, ttl)),
            None => Service::Direct(dispatcher),
        };

        Ok(Self { service })
    }

    #[must_use]
    pub const fn is_idempotent(&self) -> bool {
        matches!(self.service, Service::Idempotent(_))
    }

    /// Send a single request.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::send_with_cancellation`] and
    /// [`IdempotentDispatcher::send_with_cancellation`].
    pub async fn send(
        &self,
        request: &SendRequest,
        cancel: &CancellationToken,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        match &self.service {
            Service::Direct(dispatcher) => dispatcher.send_with_cancellation(request, cancel).await,
            Service::Idempotent(idempotent) => {
                idempotent.send_with_cancellation(request, cancel).await
            }
        }
    }

    /// Send every request concurrently, returning responses in request order.
    ///
    /// # Errors
    ///
    /// Returns an error if a send task panics.
    pub async fn run(
        self: Arc<Self>,
        requests: Vec<SendRequest>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Vec<Response>> {
        internal!(level = DEBUG, requests = requests.len(), "Dispatching requests");

        let mut tasks = JoinSet::new();
        for (index, request) in requests.into_iter().enumerate() {
            let courier = Arc::clone(&self);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let result = courier.send(&request, &cancel).await;
                if let Ok(outcome) = &result {
                    internal!(
                        level = DEBUG,
                        request = index,
                        status = ?outcome.status,
                        primary_attempts = outcome.primary_attempts(),
                        backoff_ms = u64::try_from(outcome.total_backoff().as_millis())
                            .unwrap_or(u64::MAX),
                        "Request finished"
                    );
                }
                (index, Response::from_result(&result))
            });
        }

        let mut responses = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            responses.push(joined?);
        }
        responses.sort_unstable_by_key(|(index, _)| *index);

        Ok(responses.into_iter().map(|(_, response)| response).collect())
    }
}

/// Cancel `cancel` on Ctrl-C, on SIGTERM, or once `deadline` has elapsed.
///
/// # Errors
///
/// Returns an error if the signal handlers cannot be installed.
#[tracing::instrument(level = "trace", skip_all)]
pub async fn cancel_on_shutdown(
    cancel: CancellationToken,
    deadline: Option<Duration>,
) -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    let expired = async {
        match deadline {
            Some(deadline) => tokio::time::sleep(deadline).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        () = cancel.cancelled() => return Ok(()),
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered, cancelling outstanding deliveries");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, cancelling outstanding deliveries");
        }
        () = expired => {
            internal!(level = WARN, "Timed out, cancelling outstanding deliveries");
        }
    }

    cancel.cancel();
    Ok(())
}
