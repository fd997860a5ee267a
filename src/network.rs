//! Network abstraction over the upstream origin.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;

use crate::config::NetworkConfig;
use crate::error::{Error, Result};

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: [&str; 10] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Returns true if a header with this name is passed through between the
/// page and the origin.
#[must_use]
pub fn is_forwarded_header(name: &str) -> bool {
    !HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// An outgoing request intercepted from the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP method, upper-case.
    pub method: String,
    /// Path (plus query) relative to the origin, or an absolute URL.
    pub url: String,
    /// Request headers as sent by the page, in order.
    pub headers: Vec<(String, String)>,
    /// Request body; empty for bodiless requests.
    pub body: Bytes,
}

impl Request {
    /// Creates a `GET` request for `url`.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Creates a request with an explicit method.
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns true if this request may be answered from the cache.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.method == "GET"
    }
}

/// A response from the network or the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// URL the response answers.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Remaining end-to-end headers, in upstream order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Bytes,
}

impl Response {
    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Looks up one of [`headers`](Self::headers) by name, ignoring case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Abstraction over live network fetches for testability.
#[async_trait]
pub trait Network: Send + Sync {
    /// Performs the request against the network.
    ///
    /// HTTP error statuses are returned as responses; only transport
    /// failures and unsendable requests are errors.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Network implementation backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    http: reqwest::Client,
    origin: String,
}

impl HttpNetwork {
    /// Builds an HTTP network for the configured origin.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;
        Ok(Self::with_client(http, &config.origin))
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn with_client(http: reqwest::Client, origin: &str) -> Self {
        Self {
            http,
            origin: origin.trim_end_matches('/').to_string(),
        }
    }

    /// Resolves a request URL against the origin.
    #[must_use]
    pub fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{url}", self.origin)
        } else {
            format!("{}/{url}", self.origin)
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let target = self.resolve(&request.url);
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| Error::InvalidRequest(format!("bad method {:?}", request.method)))?;

        let mut builder = self.http.request(method, &target);
        for (name, value) in &request.headers {
            if is_forwarded_header(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let headers = resp
            .headers()
            .iter()
            .filter(|(name, _)| **name != CONTENT_TYPE && is_forwarded_header(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = resp.bytes().await?;
        log::debug!("{} {target} -> {status} ({} bytes)", request.method, body.len());
        Ok(Response {
            url: request.url.clone(),
            status,
            content_type,
            headers,
            body,
        })
    }
}
