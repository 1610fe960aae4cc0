//! Install and activate.
//!
//! Install primes the versioned static partition with the precache list.
//! Activate evicts every partition outside the current keep-list, then
//! claims open clients and tells them a new version is live.

use serde::Serialize;
use serde_json::json;
use tidecache_client::resolve;
use tidecache_core::{Error, PartitionRole, Request, RequestIdentity, Response};

use crate::handler::Worker;
use crate::protocol::{HostReply, ReplySink};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    #[default]
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
}

impl Worker {
    async fn set_phase(&self, phase: Phase) {
        let mut current = self.phase.write().await;
        tracing::debug!(from = ?*current, to = ?phase, "lifecycle transition");
        *current = phase;
    }

    pub(crate) async fn on_install(&self) -> bool {
        self.set_phase(Phase::Installing).await;
        match self.install().await {
            Ok(count) => {
                tracing::info!(version = %self.registry.version(), assets = count, "installed");
                self.set_phase(Phase::Installed).await;
                true
            }
            Err(e) => {
                tracing::error!(version = %self.registry.version(), error = %e, "install failed");
                self.set_phase(Phase::Parsed).await;
                false
            }
        }
    }

    /// Fetch every precache asset, then store them all.
    ///
    /// Nothing is written unless every fetch succeeded, so a failed install
    /// leaves no partially primed partition behind.
    ///
    /// # Errors
    ///
    /// Returns the first resolution, network or storage error.
    pub async fn install(&self) -> Result<usize, Error> {
        let epoch = self.registry.wipe_epoch();
        let mut primed: Vec<(RequestIdentity, Response)> = Vec::with_capacity(self.config.precache_assets.len());

        for asset in &self.config.precache_assets {
            let url = resolve(asset, self.router.origin()).map_err(|e| Error::InvalidUrl(format!("{asset}: {e}")))?;
            let request = Request::get(url);
            let response = self.network.fetch(&request).await?;
            if !response.is_success() {
                return Err(Error::HttpStatus(response.status));
            }
            primed.push((RequestIdentity::from(&request), response));
        }

        self.registry.open(PartitionRole::Static).await?;
        let mut written = 0;
        for (identity, response) in &primed {
            if self.registry.put_since(epoch, PartitionRole::Static, identity, response).await? {
                written += 1;
            }
        }
        Ok(written)
    }

    pub(crate) async fn on_activate(&self, sink: &ReplySink) -> bool {
        self.set_phase(Phase::Activating).await;
        match self.activate().await {
            Ok(deleted) => {
                tracing::info!(version = %self.registry.version(), deleted = ?deleted, "activated");
                self.set_phase(Phase::Activated).await;
                sink.send(HostReply::Claim);
                sink.send(HostReply::Broadcast {
                    message: json!({ "type": "updated", "version": self.registry.version() }),
                });
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "activation failed");
                self.set_phase(Phase::Installed).await;
                false
            }
        }
    }

    /// Delete every partition not on the keep-list and return their names.
    ///
    /// # Errors
    ///
    /// Returns a storage error if eviction fails.
    pub async fn activate(&self) -> Result<Vec<String>, Error> {
        let keep = self.registry.keep_list();
        self.registry.evict_except(&keep).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::tests::{run, test_worker, test_worker_on, url};
    use crate::protocol::HostEvent;
    use tidecache_core::{AppConfig, CacheDb, CacheRegistry};

    #[tokio::test]
    async fn test_install_primes_static_partition() {
        let (worker, network) = test_worker().await;
        network.set_response(&url("/"), Response::new(200, "text/html", "shell")).await;
        network.set_response(&url("/offline.html"), Response::new(200, "text/html", "offline")).await;

        let replies = run(&worker, HostEvent::Install).await;
        assert_eq!(replies, vec![HostReply::Done { ok: true }]);
        assert_eq!(worker.phase().await, Phase::Installed);

        let entries = worker.registry.entries(PartitionRole::Static).await.unwrap();
        let urls: Vec<_> = entries.iter().map(|e| e.identity.url.as_str()).collect();
        assert_eq!(urls, vec![url("/").as_str(), url("/offline.html").as_str()]);
        assert_eq!(worker.registry.partition_names().await.unwrap(), vec!["static-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_install_failure_writes_nothing() {
        let (worker, network) = test_worker().await;
        network.set_response(&url("/"), Response::new(200, "text/html", "shell")).await;
        network.fail(&url("/offline.html")).await;

        let replies = run(&worker, HostEvent::Install).await;
        assert_eq!(replies, vec![HostReply::Done { ok: false }]);
        assert_eq!(worker.phase().await, Phase::Parsed);
        assert!(worker.registry.entries(PartitionRole::Static).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_install_rejects_error_status() {
        let (worker, network) = test_worker().await;
        network.set_response(&url("/"), Response::new(500, "text/html", "boom")).await;
        network.set_response(&url("/offline.html"), Response::new(200, "text/html", "offline")).await;

        let err = worker.install().await.unwrap_err();
        assert!(matches!(err, Error::HttpStatus(500)));
    }

    #[tokio::test]
    async fn test_activate_evicts_previous_version_only() {
        let config = AppConfig { version: "v3".into(), ..AppConfig::default() };
        let db = CacheDb::open_in_memory().await.unwrap();
        let (worker, _network) = test_worker_on(db.clone(), config);
        let identity = RequestIdentity::new("GET", url("/a"));
        let body = Response::new(200, "text/plain", "x");

        let v2 = CacheRegistry::new(db, "v2");
        v2.put(PartitionRole::Static, &identity, &body).await.unwrap();
        for role in [PartitionRole::AiSession, PartitionRole::Documents, PartitionRole::Fonts] {
            worker.registry.put(role, &identity, &body).await.unwrap();
        }

        let replies = run(&worker, HostEvent::Activate).await;
        assert_eq!(replies[0], HostReply::Claim);
        assert_eq!(
            replies[1],
            HostReply::Broadcast { message: json!({"type": "updated", "version": "v3"}) }
        );
        assert_eq!(replies[2], HostReply::Done { ok: true });

        let mut names = worker.registry.partition_names().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["ai-cache", "docs-cache", "fonts-cache"]);
        assert_eq!(worker.phase().await, Phase::Activated);
    }
}
