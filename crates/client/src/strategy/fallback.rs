//! Degraded responses returned when both cache and network come up empty.

use tidecache_core::{CacheRegistry, PartitionRole, Request, RequestIdentity, Response};
use url::Url;

use crate::router::assets::is_image;

const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="150" viewBox="0 0 200 150"><rect width="200" height="150" fill="#e5e7eb"/><text x="100" y="80" font-family="sans-serif" font-size="14" fill="#6b7280" text-anchor="middle">Offline</text></svg>"##;

/// What to serve when a strategy cannot produce a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// The primed offline page from the static partition.
    OfflinePage,
    /// SVG placeholder for images, 503 text for everything else.
    Placeholder,
}

impl Fallback {
    pub async fn respond(self, registry: &CacheRegistry, request: &Request, offline_page: &Url) -> Response {
        match self {
            Fallback::OfflinePage => offline_page_response(registry, offline_page).await,
            Fallback::Placeholder => placeholder(request),
        }
    }
}

/// Only the offline page key is consulted; no other cached HTML is served.
async fn offline_page_response(registry: &CacheRegistry, offline_page: &Url) -> Response {
    let identity = RequestIdentity::new("GET", offline_page.as_str());
    match registry.match_entry(PartitionRole::Static, &identity).await {
        Ok(Some(entry)) => entry.response,
        Ok(None) => unavailable(),
        Err(e) => {
            tracing::warn!(error = %e, "offline page lookup failed");
            unavailable()
        }
    }
}

fn placeholder(request: &Request) -> Response {
    if is_image(request.url.path()) {
        let mut response = Response::new(200, "image/svg+xml", PLACEHOLDER_SVG);
        response.headers.insert("cache-control", "no-store");
        response
    } else {
        unavailable()
    }
}

fn unavailable() -> Response {
    Response::new(503, "text/plain; charset=utf-8", "Service Unavailable")
}
