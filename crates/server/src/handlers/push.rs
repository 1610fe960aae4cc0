//! Push bridge.
//!
//! Turns push payloads into notifications and notification clicks into
//! window navigation. Payloads are ephemeral and never touch the registry.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tidecache_client::resolve;
use tidecache_core::config::PushDefaults;

use crate::handler::Worker;

/// Action name that closes a notification with no further effect.
pub const DISMISS_ACTION: &str = "dismiss";

#[derive(Debug, Clone, Default, Deserialize)]
struct PushPayload {
    title: Option<String>,
    body: Option<String>,
    icon: Option<String>,
    tag: Option<String>,
    url: Option<String>,
    #[serde(default)]
    data: Option<PushData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PushData {
    url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationData {
    pub url: String,
}

/// Notification the host should display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub tag: String,
    pub data: NotificationData,
}

impl Notification {
    fn from_payload(payload: PushPayload, defaults: &PushDefaults) -> Self {
        let url = payload
            .data
            .and_then(|d| d.url)
            .or(payload.url)
            .unwrap_or_else(|| defaults.url.clone());

        Self {
            title: payload.title.unwrap_or_else(|| defaults.title.clone()),
            body: payload.body.unwrap_or_else(|| defaults.body.clone()),
            icon: payload.icon.unwrap_or_else(|| defaults.icon.clone()),
            tag: payload.tag.unwrap_or_else(|| defaults.tag.clone()),
            data: NotificationData { url },
        }
    }
}

/// Build a notification from raw payload text.
///
/// An absent or blank payload and one that is not a JSON object both
/// produce no notification.
pub fn build_notification(raw: Option<&str>, defaults: &PushDefaults) -> Option<Notification> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match serde_json::from_str::<PushPayload>(raw) {
        Ok(payload) => Some(Notification::from_payload(payload, defaults)),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring malformed push payload");
            None
        }
    }
}

impl Worker {
    pub fn build_notification(&self, raw: Option<&str>) -> Option<Notification> {
        build_notification(raw, &self.config.push)
    }

    /// Absolute URL to open for a notification click, `None` on dismiss.
    pub fn click_target(&self, action: Option<&str>, data: Option<&Value>) -> Option<String> {
        if action == Some(DISMISS_ACTION) {
            return None;
        }

        let target = data
            .and_then(|d| d.get("url"))
            .and_then(Value::as_str)
            .unwrap_or("/");

        match resolve(target, self.router.origin()) {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                tracing::debug!(target, error = %e, "unusable click target, opening site root");
                Some(self.router.origin().to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::tests::{run, test_worker, url};
    use crate::protocol::{HostEvent, HostReply};
    use serde_json::json;

    #[test]
    fn test_payload_fields_override_defaults() {
        let defaults = PushDefaults::default();
        let raw = r#"{"title":"Invoice approved","body":"INV-204","tag":"invoices","url":"/invoices/204"}"#;
        let notification = build_notification(Some(raw), &defaults).unwrap();
        assert_eq!(notification.title, "Invoice approved");
        assert_eq!(notification.body, "INV-204");
        assert_eq!(notification.tag, "invoices");
        assert_eq!(notification.icon, defaults.icon);
        assert_eq!(notification.data.url, "/invoices/204");
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let defaults = PushDefaults::default();
        let notification = build_notification(Some("{}"), &defaults).unwrap();
        assert_eq!(notification.title, defaults.title);
        assert_eq!(notification.body, defaults.body);
        assert_eq!(notification.tag, defaults.tag);
        assert_eq!(notification.data.url, "/");
    }

    #[test]
    fn test_nested_data_url_wins() {
        let raw = r#"{"url":"/a","data":{"url":"/b"}}"#;
        let notification = build_notification(Some(raw), &PushDefaults::default()).unwrap();
        assert_eq!(notification.data.url, "/b");
    }

    #[test]
    fn test_missing_or_malformed_payload() {
        let defaults = PushDefaults::default();
        assert!(build_notification(None, &defaults).is_none());
        assert!(build_notification(Some("   "), &defaults).is_none());
        assert!(build_notification(Some("not json"), &defaults).is_none());
        assert!(build_notification(Some("[1,2]"), &defaults).is_none());
    }

    #[tokio::test]
    async fn test_push_event_replies() {
        let (worker, _network) = test_worker().await;

        let replies = run(&worker, HostEvent::Push { data: Some(r#"{"title":"Hi"}"#.into()) }).await;
        assert_eq!(replies.len(), 2);
        let HostReply::ShowNotification { notification } = &replies[0] else { panic!("expected notification") };
        assert_eq!(notification.title, "Hi");

        let replies = run(&worker, HostEvent::Push { data: None }).await;
        assert_eq!(replies, vec![HostReply::Done { ok: true }]);
    }

    #[tokio::test]
    async fn test_click_targets() {
        let (worker, _network) = test_worker().await;
        assert_eq!(worker.click_target(Some("dismiss"), Some(&json!({"url": "/x"}))), None);
        assert_eq!(worker.click_target(Some("open"), Some(&json!({"url": "/x"}))), Some(url("/x")));
        assert_eq!(worker.click_target(None, None), Some(url("/")));

        let replies = run(&worker, HostEvent::NotificationClick { action: Some("dismiss".into()), data: None }).await;
        assert_eq!(replies, vec![HostReply::Done { ok: true }]);
    }
}
