//! Worker event dispatch.
//!
//! This module defines the worker that owns the registry, router, executor
//! and retry queue, and routes each host event to the matching handler.
//! Every event ends with exactly one `done` reply.

use std::sync::Arc;

use tidecache_client::{Executor, Handled, Network, RetryQueue, Router, RuleAction, resolve};
use tidecache_core::{AppConfig, CacheRegistry, Error, Request};
use tokio::sync::RwLock;

use crate::handlers::control::ControlOutcome;
use crate::handlers::lifecycle::Phase;
use crate::protocol::{HostEvent, HostReply, ReplySink, WireRequest, WireResponse};

/// Result of intercepting one request.
pub enum FetchDecision {
    /// Declined; the host performs the request itself.
    Passthrough(&'static str),
    Handled(Handled),
    Failed(Error),
}

/// The worker runtime.
pub struct Worker {
    pub(crate) config: AppConfig,
    pub(crate) registry: CacheRegistry,
    pub(crate) network: Arc<dyn Network>,
    pub(crate) router: Router,
    pub(crate) executor: Executor,
    pub(crate) queue: RetryQueue,
    pub(crate) phase: RwLock<Phase>,
}

impl Worker {
    /// Build a worker over an opened registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] when the configured origin or offline
    /// page do not resolve.
    pub fn new(config: AppConfig, registry: CacheRegistry, network: Arc<dyn Network>) -> Result<Self, Error> {
        let router = Router::from_config(&config)?;
        let offline_page = resolve(&config.offline_page, router.origin()).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let executor = Executor::new(registry.clone(), network.clone(), offline_page);
        let queue = RetryQueue::new(registry.clone(), network.clone(), config.queue.clone());

        Ok(Self {
            config,
            registry,
            network,
            router,
            executor,
            queue,
            phase: RwLock::new(Phase::default()),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &RetryQueue {
        &self.queue
    }

    pub async fn phase(&self) -> Phase {
        *self.phase.read().await
    }

    /// Handle one event, sending its replies and the final `done`.
    pub async fn dispatch(&self, event: HostEvent, sink: &ReplySink) {
        let kind = event.kind();
        let ok = match event {
            HostEvent::Install => self.on_install().await,
            HostEvent::Activate => self.on_activate(sink).await,
            HostEvent::Fetch { request } => self.on_fetch(request, sink).await,
            HostEvent::Message { data } => {
                if self.handle_message(data).await == ControlOutcome::SkipWaiting {
                    sink.send(HostReply::SkipWaiting);
                }
                true
            }
            HostEvent::Sync { tag } => self.on_sync(&tag).await,
            HostEvent::Push { data } => {
                if let Some(notification) = self.build_notification(data.as_deref()) {
                    sink.send(HostReply::ShowNotification { notification });
                }
                true
            }
            HostEvent::NotificationClick { action, data } => {
                if let Some(url) = self.click_target(action.as_deref(), data.as_ref()) {
                    sink.send(HostReply::OpenWindow { url });
                }
                true
            }
            HostEvent::Enqueue { request } => self.on_enqueue(request, sink).await,
        };

        tracing::debug!(event = kind, ok, "event settled");
        sink.send(HostReply::Done { ok });
    }

    /// Route and execute one intercepted request.
    pub async fn handle_fetch(&self, request: &Request) -> FetchDecision {
        let route = self.router.classify(request);
        match route.action {
            RuleAction::Passthrough => FetchDecision::Passthrough(route.rule),
            RuleAction::Execute { strategy, options } => {
                tracing::debug!(rule = route.rule, strategy = %strategy, url = %request.url, "handling request");
                match self.executor.execute(strategy, request, options).await {
                    Ok(handled) => FetchDecision::Handled(handled),
                    Err(e) => FetchDecision::Failed(e),
                }
            }
        }
    }

    async fn on_fetch(&self, wire: WireRequest, sink: &ReplySink) -> bool {
        let request = match wire.into_request(self.router.origin()) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "declining unparseable request");
                sink.send(HostReply::Passthrough { rule: "unparseable".to_string() });
                return true;
            }
        };

        match self.handle_fetch(&request).await {
            FetchDecision::Passthrough(rule) => {
                sink.send(HostReply::Passthrough { rule: rule.to_string() });
                true
            }
            FetchDecision::Handled(handled) => {
                let Handled { response, source, revalidation } = handled;
                sink.send(HostReply::Respond { response: WireResponse::from(&response), source });
                revalidation.settled().await;
                true
            }
            FetchDecision::Failed(e) => {
                tracing::info!(url = %request.url, error = %e, "request failed with no fallback");
                sink.send(HostReply::Failed { error: e.to_string() });
                true
            }
        }
    }
}
