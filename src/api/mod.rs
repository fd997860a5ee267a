//! HTTP host for the worker.
//!
//! Page requests are answered by the fetch interceptor; lifecycle events
//! are delivered under `/sw/`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::event::{ClickEvent, PushEvent};
use crate::network::{Request, is_forwarded_header};
use crate::notification::NotificationCenter;
use crate::worker::ServiceWorker;

/// Header reporting whether a page request was served from the cache.
pub const CACHE_HEADER: &str = "x-sw-cache";

#[derive(Clone)]
struct AppState {
    worker: ServiceWorker,
    notifications: Arc<NotificationCenter>,
}

/// Body of `/sw/sync` and `/sw/periodicsync`.
#[derive(Deserialize)]
struct SyncRequest {
    tag: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    cache_name: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        log::warn!("Request failed: {self}");
        (StatusCode::BAD_GATEWAY, self.to_string()).into_response()
    }
}

/// Parses an optional JSON body; an empty body yields `T::default()`.
fn optional_json<T: for<'de> Deserialize<'de> + Default>(body: &Bytes) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(body)?)
}

async fn sw_health(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(HealthResponse {
        status: "ok".to_string(),
        cache_name: state.worker.config().cache_name.clone(),
    })
}

async fn sw_install(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(axum::Json(state.worker.install().await?))
}

async fn sw_push(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse> {
    let event: PushEvent = optional_json(&body)?;
    Ok(axum::Json(state.worker.push(event).await?))
}

async fn sw_notification_click(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let event: ClickEvent = if body.iter().all(u8::is_ascii_whitespace) {
        ClickEvent::on_push(None)
    } else {
        serde_json::from_slice(&body)?
    };
    Ok(axum::Json(state.worker.notification_click(event).await?))
}

async fn sw_sync(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse> {
    let payload: SyncRequest = serde_json::from_slice(&body)?;
    Ok(axum::Json(state.worker.sync(&payload.tag).await))
}

async fn sw_periodic_sync(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse> {
    let payload: SyncRequest = serde_json::from_slice(&body)?;
    Ok(axum::Json(state.worker.periodic_sync(&payload.tag).await))
}

async fn sw_notifications(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.notifications.visible())
}

/// Answers any other request through the worker's fetch interceptor.
async fn intercept(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    request_headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let url = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), ToString::to_string);
    let mut request = Request::new(method.as_str(), url).with_body(body);
    for (name, value) in &request_headers {
        if !is_forwarded_header(name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }
    let (response, source) = state.worker.fetch_with_source(&request).await?;

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut headers = HeaderMap::new();
    for (name, value) in &response.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => log::debug!("Dropping unrepresentable header {name} from {}", response.url),
        }
    }
    if let Some(value) = response
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        headers.insert(CONTENT_TYPE, value);
    }
    headers.insert(
        HeaderName::from_static(CACHE_HEADER),
        HeaderValue::from_static(source.as_str()),
    );
    Ok((status, headers, Body::from(response.body)).into_response())
}

/// Builds the router for a worker and the notification center it shows into.
pub fn router(worker: ServiceWorker, notifications: Arc<NotificationCenter>) -> Router {
    let state = AppState {
        worker,
        notifications,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/sw/health", get(sw_health))
        .route("/sw/install", post(sw_install))
        .route("/sw/push", post(sw_push))
        .route("/sw/notificationclick", post(sw_notification_click))
        .route("/sw/sync", post(sw_sync))
        .route("/sw/periodicsync", post(sw_periodic_sync))
        .route("/sw/notifications", get(sw_notifications))
        .fallback(intercept)
        .layer(cors)
        .with_state(state)
}

/// Serves the worker until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the address is invalid or cannot be bound.
pub async fn run_server(
    config: &ApiConfig,
    worker: ServiceWorker,
    notifications: Arc<NotificationCenter>,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| Error::Config(format!("invalid bind address: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Serving on http://{}", listener.local_addr()?);

    axum::serve(listener, router(worker, notifications))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStorage;
    use crate::clients::LoggingClients;
    use crate::config::WorkerConfig;
    use crate::testing::{MockNetwork, origin};

    struct TestServer {
        base: String,
        clients: Arc<LoggingClients>,
        network: Arc<MockNetwork>,
        http: reqwest::Client,
    }

    async fn start() -> TestServer {
        let notifications = Arc::new(NotificationCenter::new());
        let clients = Arc::new(LoggingClients::new());
        let network = Arc::new(
            origin()
                .route("/live.txt", 200, "live")
                .with_header("/live.txt", "etag", "\"live-1\"")
                .with_header("/live.txt", "cache-control", "no-cache")
                .route("/standings", 201, "saved"),
        );
        let worker = ServiceWorker::new(
            WorkerConfig::default(),
            Arc::new(MemoryCacheStorage::new()),
            network.clone(),
            notifications.clone(),
            clients.clone(),
        );
        let app = router(worker, notifications);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        TestServer {
            base: format!("http://{addr}"),
            clients,
            network,
            http: reqwest::Client::new(),
        }
    }

    async fn json(resp: reqwest::Response) -> serde_json::Value {
        serde_json::from_str(&resp.text().await.unwrap()).unwrap()
    }

    impl TestServer {
        async fn post(&self, path: &str, body: &str) -> reqwest::Response {
            self.http
                .post(format!("{}{path}", self.base))
                .header("content-type", "application/json")
                .body(body.to_string())
                .send()
                .await
                .unwrap()
        }

        async fn get(&self, path: &str) -> reqwest::Response {
            self.http
                .get(format!("{}{path}", self.base))
                .send()
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn health_reports_cache_name() {
        let server = start().await;
        let body = json(server.get("/sw/health").await).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["cache_name"], "mlb-tracker-v1");
    }

    #[tokio::test]
    async fn cached_pages_are_marked_hits() {
        let server = start().await;
        assert!(server.post("/sw/install", "").await.status().is_success());

        let resp = server.get("/index.html").await;
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()[CACHE_HEADER], "hit");
        assert_eq!(resp.text().await.unwrap(), "<html>index</html>");
    }

    #[tokio::test]
    async fn uncached_pages_come_from_network() {
        let server = start().await;
        let resp = server.get("/live.txt").await;
        assert_eq!(resp.headers()[CACHE_HEADER], "miss");
        assert_eq!(resp.text().await.unwrap(), "live");
    }

    #[tokio::test]
    async fn upstream_headers_are_passed_back() {
        let server = start().await;
        let resp = server.get("/live.txt").await;
        assert_eq!(resp.headers()["etag"], "\"live-1\"");
        assert_eq!(resp.headers()["cache-control"], "no-cache");
        assert_eq!(resp.headers()["content-type"], "text/plain");
    }

    #[tokio::test]
    async fn page_post_keeps_body_and_headers() {
        let server = start().await;
        let resp = server
            .http
            .post(format!("{}/standings", server.base))
            .header("accept", "application/json")
            .header("if-none-match", "\"v1\"")
            .body(r#"{"team":"SEA"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        assert_eq!(resp.headers()[CACHE_HEADER], "miss");

        let sent = server.network.requests().pop().unwrap();
        assert_eq!(sent.method, "POST");
        assert_eq!(sent.body, Bytes::from_static(br#"{"team":"SEA"}"#));
        let header = |name: &str| {
            sent.headers
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(header("accept").as_deref(), Some("application/json"));
        assert_eq!(header("if-none-match").as_deref(), Some("\"v1\""));
        assert_eq!(header("host"), None);
    }

    #[tokio::test]
    async fn network_failure_is_bad_gateway() {
        let server = start().await;
        let resp = server.get("/nowhere").await;
        assert_eq!(resp.status(), 502);
    }

    #[tokio::test]
    async fn push_then_list_notifications() {
        let server = start().await;
        let resp = server
            .post("/sw/push", r#"{"text":"Standings changed"}"#)
            .await;
        assert!(resp.status().is_success());

        let shown = json(server.get("/sw/notifications").await).await;
        assert_eq!(shown.as_array().unwrap().len(), 1);
        assert_eq!(shown[0]["body"], "Standings changed");
        assert_eq!(shown[0]["tag"], "mlb-update");
    }

    #[tokio::test]
    async fn push_with_empty_body_uses_default() {
        let server = start().await;
        let shown = json(server.post("/sw/push", "").await).await;
        assert_eq!(shown["body"], "MLB Wild Card standings have been updated!");
    }

    #[tokio::test]
    async fn click_routes_on_action() {
        let server = start().await;
        server.post("/sw/push", "").await;

        let dismissed = json(server.post("/sw/notificationclick", r#"{"action":"close"}"#).await).await;
        assert_eq!(dismissed["result"], "dismissed");
        assert!(server.clients.opened().is_empty());

        let opened = json(server.post("/sw/notificationclick", "").await).await;
        assert_eq!(opened["result"], "opened");
        assert_eq!(opened["action"], "default");
        assert_eq!(server.clients.opened(), vec!["/"]);
    }

    #[tokio::test]
    async fn sync_endpoints_report_outcomes() {
        let server = start().await;

        let done = json(server.post("/sw/sync", r#"{"tag":"background-sync"}"#).await).await;
        assert_eq!(done["result"], "completed");
        assert_eq!(done["data_path"], "/data.json");

        let ignored = json(server.post("/sw/periodicsync", r#"{"tag":"something-else"}"#).await).await;
        assert_eq!(ignored["result"], "ignored");

        let resp = server.get("/data.json").await;
        assert_eq!(resp.headers()[CACHE_HEADER], "hit");
        assert_eq!(resp.text().await.unwrap(), r#"{"al":[],"nl":[]}"#);
    }

    #[tokio::test]
    async fn malformed_event_body_is_rejected() {
        let server = start().await;
        let resp = server.post("/sw/push", "{not json").await;
        assert_eq!(resp.status(), 502);
    }

    #[tokio::test]
    async fn sync_body_without_tag_is_bad_gateway() {
        let server = start().await;
        for path in ["/sw/sync", "/sw/periodicsync"] {
            assert_eq!(server.post(path, "{}").await.status(), 502);
            assert_eq!(server.post(path, "").await.status(), 502);

            let untyped = server
                .http
                .post(format!("{}{path}", server.base))
                .body(r#"{"tag":"background-sync"}"#)
                .send()
                .await
                .unwrap();
            assert!(untyped.status().is_success());
        }
    }
}
