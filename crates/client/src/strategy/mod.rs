//! Fetch-and-cache strategy executors.
//!
//! ### Strategies
//! - **CacheFirst**: serve a hit without touching the network; on a miss,
//!   fetch, store, return.
//! - **NetworkFirst**: fetch and store; on failure serve a hit.
//! - **StaleWhileRevalidate**: start the fetch, serve a hit immediately and
//!   store the fetched copy in the background; on a miss, wait for the fetch.
//! - **NetworkOnly**: never reads or writes a partition.
//!
//! Cache-storage errors never reach the caller: a failing lookup is a miss
//! and a failing write is logged. Only 2xx responses are stored.

pub mod fallback;

use std::fmt;
use std::sync::Arc;

use tidecache_core::{CacheRegistry, CachedEntry, Error, PartitionRole, Request, RequestIdentity, Response};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

use crate::fetch::Network;

pub use fallback::Fallback;

/// The four interchangeable executors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    CacheFirst(PartitionRole),
    NetworkFirst(PartitionRole),
    StaleWhileRevalidate(PartitionRole),
    NetworkOnly,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::CacheFirst(role) => write!(f, "cache-first({role})"),
            Strategy::NetworkFirst(role) => write!(f, "network-first({role})"),
            Strategy::StaleWhileRevalidate(role) => write!(f, "stale-while-revalidate({role})"),
            Strategy::NetworkOnly => f.write_str("network-only"),
        }
    }
}

/// Per-rule knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOptions {
    pub fallback: Option<Fallback>,
    /// Treat 5xx responses like a transport failure.
    pub server_errors_as_failure: bool,
}

/// Where a returned response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseSource {
    Cache,
    Network,
    Fallback,
}

/// Background cache write still owed after a response was produced.
///
/// The write does not start until this is settled or dropped, so it can
/// never race the caller's read of the response it already holds.
#[derive(Debug, Default)]
pub struct Revalidation {
    release: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Revalidation {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.handle.is_some()
    }

    /// Let the background write proceed and wait for it to finish or fail.
    pub async fn settled(mut self) {
        if let Some(release) = self.release.take() {
            let _ = release.send(());
        }
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "revalidation task aborted");
        }
    }
}

/// Result of running a strategy.
#[derive(Debug)]
pub struct Handled {
    pub response: Response,
    pub source: ResponseSource,
    pub revalidation: Revalidation,
}

impl Handled {
    fn new(response: Response, source: ResponseSource) -> Self {
        Self { response, source, revalidation: Revalidation::none() }
    }
}

/// Runs strategies against the registry and the network.
#[derive(Clone)]
pub struct Executor {
    registry: CacheRegistry,
    network: Arc<dyn Network>,
    offline_page: Url,
}

impl Executor {
    pub fn new(registry: CacheRegistry, network: Arc<dyn Network>, offline_page: Url) -> Self {
        Self { registry, network, offline_page }
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    /// Run `strategy` for `request`.
    ///
    /// # Errors
    ///
    /// Returns the network error when the strategy has neither a cached
    /// entry nor a fallback to serve.
    pub async fn execute(&self, strategy: Strategy, request: &Request, options: ExecOptions) -> Result<Handled, Error> {
        match strategy {
            Strategy::CacheFirst(role) => self.cache_first(role, request, options).await,
            Strategy::NetworkFirst(role) => self.network_first(role, request, options).await,
            Strategy::StaleWhileRevalidate(role) => self.stale_while_revalidate(role, request, options).await,
            Strategy::NetworkOnly => self.network_only(request, options).await,
        }
    }

    async fn cache_first(&self, role: PartitionRole, request: &Request, options: ExecOptions) -> Result<Handled, Error> {
        let identity = RequestIdentity::from(request);
        let epoch = self.registry.wipe_epoch();
        if let Some(entry) = self.lookup(role, &identity).await {
            return Ok(Handled::new(entry.response, ResponseSource::Cache));
        }

        match fetch_checked(self.network.as_ref(), request, options).await {
            Ok(response) => {
                store(&self.registry, epoch, role, &identity, &response).await;
                Ok(Handled::new(response, ResponseSource::Network))
            }
            Err(e) => self.fall_back(request, options, e).await,
        }
    }

    async fn network_first(&self, role: PartitionRole, request: &Request, options: ExecOptions) -> Result<Handled, Error> {
        let identity = RequestIdentity::from(request);
        let epoch = self.registry.wipe_epoch();
        match fetch_checked(self.network.as_ref(), request, options).await {
            Ok(response) => {
                store(&self.registry, epoch, role, &identity, &response).await;
                Ok(Handled::new(response, ResponseSource::Network))
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "network-first falling back to cache");
                match self.lookup(role, &identity).await {
                    Some(entry) => Ok(Handled::new(entry.response, ResponseSource::Cache)),
                    None => self.fall_back(request, options, e).await,
                }
            }
        }
    }

    async fn stale_while_revalidate(
        &self, role: PartitionRole, request: &Request, options: ExecOptions,
    ) -> Result<Handled, Error> {
        let identity = RequestIdentity::from(request);
        let epoch = self.registry.wipe_epoch();

        let network = self.network.clone();
        let outgoing = request.clone();
        let in_flight = tokio::spawn(async move { fetch_checked(network.as_ref(), &outgoing, options).await });

        if let Some(entry) = self.lookup(role, &identity).await {
            let (release, released) = oneshot::channel::<()>();
            let registry = self.registry.clone();
            let url = request.url.clone();
            let handle = tokio::spawn(async move {
                let fetched = join_fetch(in_flight).await;
                let _ = released.await;
                match fetched {
                    Ok(response) => store(&registry, epoch, role, &identity, &response).await,
                    Err(e) => tracing::debug!(url = %url, error = %e, "revalidation failed; keeping cached copy"),
                }
            });
            let mut handled = Handled::new(entry.response, ResponseSource::Cache);
            handled.revalidation = Revalidation { release: Some(release), handle: Some(handle) };
            return Ok(handled);
        }

        match join_fetch(in_flight).await {
            Ok(response) => {
                store(&self.registry, epoch, role, &identity, &response).await;
                Ok(Handled::new(response, ResponseSource::Network))
            }
            Err(e) => self.fall_back(request, options, e).await,
        }
    }

    async fn network_only(&self, request: &Request, options: ExecOptions) -> Result<Handled, Error> {
        match fetch_checked(self.network.as_ref(), request, options).await {
            Ok(response) => Ok(Handled::new(response, ResponseSource::Network)),
            Err(e) => self.fall_back(request, options, e).await,
        }
    }

    async fn lookup(&self, role: PartitionRole, identity: &RequestIdentity) -> Option<CachedEntry> {
        match self.registry.match_entry(role, identity).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(role = %role, url = %identity.url, error = %e, "cache lookup failed; treating as miss");
                None
            }
        }
    }

    async fn fall_back(&self, request: &Request, options: ExecOptions, cause: Error) -> Result<Handled, Error> {
        match options.fallback {
            Some(fallback) => {
                tracing::debug!(url = %request.url, error = %cause, ?fallback, "serving fallback");
                let response = fallback.respond(&self.registry, request, &self.offline_page).await;
                Ok(Handled::new(response, ResponseSource::Fallback))
            }
            None => Err(cause),
        }
    }
}

async fn fetch_checked(network: &dyn Network, request: &Request, options: ExecOptions) -> Result<Response, Error> {
    let response = network.fetch(request).await?;
    if options.server_errors_as_failure && response.is_server_error() {
        return Err(Error::HttpStatus(response.status));
    }
    Ok(response)
}

async fn join_fetch(handle: JoinHandle<Result<Response, Error>>) -> Result<Response, Error> {
    match handle.await {
        Ok(result) => result,
        Err(e) => Err(Error::Network(format!("fetch aborted: {e}"))),
    }
}

/// Store a copy of a 2xx response unless a wipe happened since `epoch`.
/// Failures are logged, never returned.
async fn store(
    registry: &CacheRegistry, epoch: u64, role: PartitionRole, identity: &RequestIdentity, response: &Response,
) {
    if !response.is_success() {
        return;
    }
    match registry.put_since(epoch, role, identity, &response.snapshot()).await {
        Ok(true) => {}
        Ok(false) => tracing::debug!(role = %role, url = %identity.url, "partitions wiped since fetch; dropping write"),
        Err(e) => tracing::warn!(role = %role, url = %identity.url, error = %e, "cache write failed"),
    }
}
