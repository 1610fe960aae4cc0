//! Control messages posted by the hosted page.
//!
//! The channel is fire-and-forget: malformed or unrecognized messages are
//! dropped without a reply and failures inside a handler are only logged.

use serde::Deserialize;
use serde_json::Value;
use tidecache_client::resolve;
use tidecache_core::{Error, PartitionRole, Request, RequestIdentity, Response};

use crate::handler::Worker;

/// Path of the single session snapshot entry inside the AI session partition.
pub const SESSION_SNAPSHOT_PATH: &str = "/__tidecache/session/latest";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    SkipWaiting,
    ClearCachesOnLogout,
    CacheAiResponse { conversation: Value },
    CacheDocument { url: String },
}

/// What handling a message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    SkipWaiting,
    Wiped(u64),
    SessionStored,
    DocumentCached,
    Ignored,
}

impl ControlMessage {
    /// Decode a posted message; `None` for anything unrecognized.
    pub fn parse(data: Value) -> Option<Self> {
        match serde_json::from_value(data) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unrecognized control message");
                None
            }
        }
    }
}

impl Worker {
    pub async fn handle_message(&self, data: Value) -> ControlOutcome {
        let Some(message) = ControlMessage::parse(data) else {
            return ControlOutcome::Ignored;
        };

        match message {
            ControlMessage::SkipWaiting => ControlOutcome::SkipWaiting,
            ControlMessage::ClearCachesOnLogout => match self.registry.wipe_all().await {
                Ok(count) => ControlOutcome::Wiped(count),
                Err(e) => {
                    tracing::error!(error = %e, "security wipe failed");
                    ControlOutcome::Ignored
                }
            },
            ControlMessage::CacheAiResponse { conversation } => match self.store_session_snapshot(&conversation).await {
                Ok(()) => ControlOutcome::SessionStored,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to store session snapshot");
                    ControlOutcome::Ignored
                }
            },
            ControlMessage::CacheDocument { url } => match self.precache_document(&url).await {
                Ok(()) => ControlOutcome::DocumentCached,
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "precache skipped");
                    ControlOutcome::Ignored
                }
            },
        }
    }

    fn session_identity(&self) -> Result<RequestIdentity, Error> {
        let url = resolve(SESSION_SNAPSHOT_PATH, self.router.origin())
            .map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(RequestIdentity::new("GET", url.as_str()))
    }

    async fn store_session_snapshot(&self, conversation: &Value) -> Result<(), Error> {
        let identity = self.session_identity()?;
        let record = Response::new(200, "application/json", serde_json::to_vec(conversation)?);
        self.registry.put(PartitionRole::AiSession, &identity, &record).await
    }

    /// The most recent session snapshot, if one is stored and decodes.
    pub async fn latest_session(&self) -> Option<Value> {
        let identity = self.session_identity().ok()?;
        let entry = match self.registry.match_entry(PartitionRole::AiSession, &identity).await {
            Ok(entry) => entry?,
            Err(e) => {
                tracing::warn!(error = %e, "session snapshot lookup failed");
                return None;
            }
        };
        serde_json::from_slice(&entry.response.body).ok()
    }

    async fn precache_document(&self, url: &str) -> Result<(), Error> {
        let url = resolve(url, self.router.origin()).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let request = Request::get(url);
        let epoch = self.registry.wipe_epoch();
        let response = self.network.fetch(&request).await?;
        if !response.is_success() {
            return Err(Error::HttpStatus(response.status));
        }
        let written = self
            .registry
            .put_since(epoch, PartitionRole::Documents, &RequestIdentity::from(&request), &response)
            .await?;
        if written {
            tracing::info!(url = %request.url, "precached document");
        } else {
            tracing::debug!(url = %request.url, "partitions wiped during precache; dropped");
        }
        Ok(())
    }
}
