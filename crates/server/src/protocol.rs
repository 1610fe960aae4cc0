//! Line-delimited JSON protocol spoken with the host runtime.
//!
//! Every inbound line is one event tagged by `event`; every outbound line is
//! one reply tagged by `reply`. Both carry the host's correlation `id`.
//! Bodies cross the wire hex-encoded because they are opaque bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tidecache_client::{ResponseSource, resolve};
use tidecache_core::{Headers, Request, RequestMode, Response};
use tokio::sync::mpsc;
use url::Url;

use crate::error::ProtocolError;
use crate::handlers::push::Notification;

/// One event line from the host.
#[derive(Debug, Clone, Deserialize)]
pub struct Inbound {
    pub id: u64,
    #[serde(flatten)]
    pub event: HostEvent,
}

impl Inbound {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(line)?)
    }
}

/// Replies owed for a line that carries an `id` but does not decode.
///
/// A fetch is declined so the host performs it itself; any other event
/// completes unsuccessfully. `None` when no id can be read.
pub fn undecodable_replies(line: &str) -> Option<(u64, Vec<HostReply>)> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    let id = value.get("id")?.as_u64()?;
    let replies = if value.get("event").and_then(serde_json::Value::as_str) == Some("fetch") {
        vec![HostReply::Passthrough { rule: "unparseable".to_string() }, HostReply::Done { ok: true }]
    } else {
        vec![HostReply::Done { ok: false }]
    };
    Some((id, replies))
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum HostEvent {
    Install,
    Activate,
    Fetch {
        request: WireRequest,
    },
    Message {
        data: serde_json::Value,
    },
    Sync {
        tag: String,
    },
    Push {
        #[serde(default)]
        data: Option<String>,
    },
    NotificationClick {
        #[serde(default)]
        action: Option<String>,
        #[serde(default)]
        data: Option<serde_json::Value>,
    },
    Enqueue {
        request: WireRequest,
    },
}

impl HostEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            HostEvent::Install => "install",
            HostEvent::Activate => "activate",
            HostEvent::Fetch { .. } => "fetch",
            HostEvent::Message { .. } => "message",
            HostEvent::Sync { .. } => "sync",
            HostEvent::Push { .. } => "push",
            HostEvent::NotificationClick { .. } => "notification-click",
            HostEvent::Enqueue { .. } => "enqueue",
        }
    }
}

/// Request as the host describes it. Relative URLs resolve against the origin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WireRequest {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub mode: RequestMode,
    #[serde(default)]
    pub body_hex: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl WireRequest {
    pub fn into_request(self, origin: &Url) -> Result<Request, ProtocolError> {
        let url = resolve(&self.url, origin).map_err(|e| ProtocolError::InvalidRequest(e.to_string()))?;
        let body = match self.body_hex {
            Some(hex_body) => hex::decode(hex_body.trim()).map_err(|e| ProtocolError::InvalidRequest(e.to_string()))?,
            None => Vec::new(),
        };

        let mut request = Request::get(url)
            .with_method(self.method)
            .with_headers(self.headers.into_iter().collect())
            .with_body(body);
        request.mode = self.mode;
        Ok(request)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireResponse {
    pub status: u16,
    pub headers: Headers,
    pub body_hex: String,
}

impl From<&Response> for WireResponse {
    fn from(response: &Response) -> Self {
        Self { status: response.status, headers: response.headers.clone(), body_hex: hex::encode(&response.body) }
    }
}

/// One reply line to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outbound {
    pub id: u64,
    #[serde(flatten)]
    pub reply: HostReply,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reply", rename_all = "kebab-case")]
pub enum HostReply {
    Respond { response: WireResponse, source: ResponseSource },
    Passthrough { rule: String },
    Failed { error: String },
    Broadcast { message: serde_json::Value },
    SkipWaiting,
    Claim,
    ShowNotification { notification: Notification },
    OpenWindow { url: String },
    RegisterSync { tag: String },
    /// Completion signal; the host holds the event open until it arrives.
    Done { ok: bool },
}

/// Reply channel bound to one event id.
#[derive(Debug, Clone)]
pub struct ReplySink {
    id: u64,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ReplySink {
    pub fn new(id: u64, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { id, tx }
    }

    pub fn send(&self, reply: HostReply) {
        if self.tx.send(Outbound { id: self.id, reply }).is_err() {
            tracing::debug!(id = self.id, "reply dropped, host output closed");
        }
    }
}
