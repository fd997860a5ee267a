//! Mock host seams shared by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};
use crate::network::{Network, Request, Response};

/// A mock network serving canned responses.
///
/// Unknown URLs fail like an unreachable host.
#[derive(Default)]
pub struct MockNetwork {
    /// Maps URL → (status, body).
    routes: Mutex<HashMap<String, (u16, Bytes)>>,
    /// Extra response headers per URL.
    headers: Mutex<HashMap<String, Vec<(String, String)>>>,
    calls: AtomicUsize,
    log: Mutex<Vec<Request>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, url: &str, status: u16, body: &str) -> Self {
        self.set(url, status, body);
        self
    }

    pub fn with_header(self, url: &str, name: &str, value: &str) -> Self {
        self.headers
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push((name.to_string(), value.to_string()));
        self
    }

    pub fn set(&self, url: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, Bytes::from(body.to_string())));
    }

    pub fn unset(&self, url: &str) {
        self.routes.lock().unwrap().remove(url);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(request.clone());
        let route = self.routes.lock().unwrap().get(&request.url).cloned();
        let headers = self
            .headers
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .unwrap_or_default();
        match route {
            Some((status, body)) => Ok(Response {
                url: request.url.clone(),
                status,
                content_type: Some("text/plain".to_string()),
                headers,
                body,
            }),
            None => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("mock: no route for {}", request.url),
            ))),
        }
    }
}

/// The four default precache routes plus a valid data document.
pub fn origin() -> MockNetwork {
    MockNetwork::new()
        .route("/", 200, "<html>root</html>")
        .route("/index.html", 200, "<html>index</html>")
        .route("/manifest.json", 200, r#"{"name":"MLB Wild Card Tracker"}"#)
        .route("/data.json", 200, r#"{ "al": [], "nl": [] }"#)
}
