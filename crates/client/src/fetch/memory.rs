//! In-memory network for offline simulation and tests.
//!
//! Serves responses registered per URL, 404 for anything else. A global
//! offline switch turns every fetch into a transport failure, and a gate
//! holds a URL's fetch until it is released.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tidecache_core::{Error, Request, Response};
use tokio::sync::{Mutex, Notify};

use super::Network;

#[derive(Default)]
pub struct MemoryNetwork {
    responses: Mutex<HashMap<String, Response>>,
    failing: Mutex<Vec<String>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    requests: Mutex<Vec<(String, String)>>,
    offline: AtomicBool,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `response` for every request to `url`.
    pub async fn set_response(&self, url: &str, response: Response) {
        self.responses.lock().await.insert(url.to_string(), response);
    }

    /// Make requests to `url` fail at the transport level.
    pub async fn fail(&self, url: &str) {
        self.failing.lock().await.push(url.to_string());
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Hold fetches of `url` until the returned gate is notified.
    pub async fn gate(&self, url: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().await.insert(url.to_string(), gate.clone());
        gate
    }

    /// `(method, url)` of every fetch attempted, in order.
    pub async fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().await.clone()
    }

    pub async fn request_count(&self, url: &str) -> usize {
        self.requests.lock().await.iter().filter(|(_, u)| u == url).count()
    }
}

#[async_trait]
impl Network for MemoryNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let url = request.url.as_str().to_string();
        self.requests.lock().await.push((request.method.clone(), url.clone()));

        let gate = self.gates.lock().await.get(&url).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network("offline".into()));
        }
        if self.failing.lock().await.contains(&url) {
            return Err(Error::Network(format!("connection reset: {url}")));
        }

        match self.responses.lock().await.get(&url) {
            Some(response) => Ok(response.snapshot()),
            None => Ok(Response::new(404, "text/plain", "Not Found")),
        }
    }
}
