//! Reconnect replay and mutation hand-off.

use tidecache_client::ReplayReport;
use tidecache_core::Error;

use crate::handler::Worker;
use crate::protocol::{HostReply, ReplySink, WireRequest};

impl Worker {
    /// Replay the retry queue when `tag` is the configured sync tag.
    ///
    /// Returns `Ok(None)` for any other tag.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the queue cannot be read.
    pub async fn sync(&self, tag: &str) -> Result<Option<ReplayReport>, Error> {
        if tag != self.config.sync_tag {
            tracing::debug!(tag, "ignoring unrelated sync tag");
            return Ok(None);
        }
        self.queue.replay().await.map(Some)
    }

    pub(crate) async fn on_sync(&self, tag: &str) -> bool {
        match self.sync(tag).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(tag, error = %e, "replay failed");
                false
            }
        }
    }

    pub(crate) async fn on_enqueue(&self, wire: WireRequest, sink: &ReplySink) -> bool {
        let request = match wire.into_request(self.router.origin()) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "refusing to queue unparseable mutation");
                return false;
            }
        };

        match self.queue.enqueue(&request).await {
            Ok(_) => {
                sink.send(HostReply::RegisterSync { tag: self.config.sync_tag.clone() });
                true
            }
            Err(e) => {
                tracing::error!(url = %request.url, error = %e, "failed to queue mutation");
                false
            }
        }
    }
}
