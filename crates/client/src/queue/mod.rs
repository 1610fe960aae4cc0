//! Mutation retry queue.
//!
//! Holds mutating requests the host handed off after a connectivity failure
//! and replays them on a reconnect trigger. Entries live in the
//! `sync-queue` partition, one entry per mutation, so a security wipe
//! clears them along with everything else.
//!
//! ### Retention
//! - Entries older than `max_age_days` are dropped instead of replayed.
//! - Past `max_entries`, the oldest entries are dropped on enqueue.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tidecache_core::config::QueueConfig;
use tidecache_core::{CacheRegistry, Error, Headers, PartitionRole, Request, RequestIdentity, Response};
use url::Url;

use crate::fetch::Network;

const QUEUE_METHOD: &str = "QUEUE";

/// A mutating request waiting for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMutation {
    pub id: String,
    pub method: String,
    pub url: Url,
    pub headers: BTreeMap<String, String>,
    #[serde(with = "hex")]
    pub body: Vec<u8>,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedMutation {
    fn from_request(request: &Request, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            body: request.body.to_vec(),
            enqueued_at: now,
        }
    }

    fn identity(&self) -> RequestIdentity {
        RequestIdentity::new(QUEUE_METHOD, &self.id)
    }

    pub fn to_request(&self) -> Request {
        let headers: Headers = self.headers.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        Request::get(self.url.clone())
            .with_method(&self.method)
            .with_body(self.body.clone())
            .with_headers(headers)
    }

    /// An age limit too large to represent never expires anything.
    fn is_expired(&self, now: DateTime<Utc>, max_age_days: i64) -> bool {
        Duration::try_days(max_age_days).is_some_and(|limit| now - self.enqueued_at > limit)
    }
}

/// Outcome of one reconnect trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub delivered: usize,
    pub retained: usize,
    pub expired: usize,
}

#[derive(Clone)]
pub struct RetryQueue {
    registry: CacheRegistry,
    network: Arc<dyn Network>,
    config: QueueConfig,
}

impl RetryQueue {
    pub fn new(registry: CacheRegistry, network: Arc<dyn Network>, config: QueueConfig) -> Self {
        Self { registry, network, config }
    }

    /// Persist a mutation for later delivery.
    pub async fn enqueue(&self, request: &Request) -> Result<QueuedMutation, Error> {
        self.enqueue_at(request, Utc::now()).await
    }

    async fn enqueue_at(&self, request: &Request, now: DateTime<Utc>) -> Result<QueuedMutation, Error> {
        let mutation = QueuedMutation::from_request(request, now);
        let record = Response::new(200, "application/json", serde_json::to_vec(&mutation)?);
        self.registry.put(PartitionRole::SyncQueue, &mutation.identity(), &record).await?;
        tracing::info!(id = %mutation.id, method = %mutation.method, url = %mutation.url, "queued mutation");

        self.trim().await?;
        Ok(mutation)
    }

    /// Queued mutations in enumeration order.
    pub async fn pending(&self) -> Result<Vec<QueuedMutation>, Error> {
        let entries = self.registry.entries(PartitionRole::SyncQueue).await?;
        let mut mutations = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_slice::<QueuedMutation>(&entry.response.body) {
                Ok(mutation) => mutations.push(mutation),
                Err(e) => {
                    tracing::warn!(key = %entry.identity.url, error = %e, "dropping undecodable queued mutation");
                    self.registry.delete(PartitionRole::SyncQueue, &entry.identity).await?;
                }
            }
        }
        Ok(mutations)
    }

    /// Attempt delivery of every queued mutation.
    ///
    /// A failed or throwing delivery leaves the entry queued and does not
    /// stop the remaining entries.
    pub async fn replay(&self) -> Result<ReplayReport, Error> {
        self.replay_at(Utc::now()).await
    }

    async fn replay_at(&self, now: DateTime<Utc>) -> Result<ReplayReport, Error> {
        let mut report = ReplayReport::default();

        for mutation in self.pending().await? {
            if mutation.is_expired(now, self.config.max_age_days) {
                self.remove(&mutation).await;
                report.expired += 1;
                continue;
            }

            match self.network.fetch(&mutation.to_request()).await {
                Ok(response) if response.is_success() => {
                    self.remove(&mutation).await;
                    report.delivered += 1;
                }
                Ok(response) => {
                    tracing::debug!(id = %mutation.id, status = response.status, "replay rejected; keeping queued");
                    report.retained += 1;
                }
                Err(e) => {
                    tracing::debug!(id = %mutation.id, error = %e, "replay failed; keeping queued");
                    report.retained += 1;
                }
            }
        }

        tracing::info!(
            delivered = report.delivered,
            retained = report.retained,
            expired = report.expired,
            "replayed queued mutations"
        );
        Ok(report)
    }

    async fn remove(&self, mutation: &QueuedMutation) {
        if let Err(e) = self.registry.delete(PartitionRole::SyncQueue, &mutation.identity()).await {
            tracing::warn!(id = %mutation.id, error = %e, "failed to remove queued mutation");
        }
    }

    async fn trim(&self) -> Result<(), Error> {
        let pending = self.pending().await?;
        let excess = pending.len().saturating_sub(self.config.max_entries);
        for mutation in pending.iter().take(excess) {
            tracing::warn!(id = %mutation.id, "queue full; dropping oldest mutation");
            self.remove(mutation).await;
        }
        Ok(())
    }
}
