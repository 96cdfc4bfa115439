//! `CometServer`: Axum HTTP + WebSocket front of the mailbox hub.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Form, FromRequestParts, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, trace};
use tvcomet_core::Envelope;
use tvcomet_settings::ServerSettings;

use crate::errors::HubError;
use crate::health::HealthResponse;
use crate::hub::{HubConfig, MailboxHub, Origin};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The mailbox table.
    pub hub: Arc<MailboxHub>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Accepted WebSocket sub-protocol.
    pub subprotocol: Arc<str>,
    /// How often sockets re-check their mailbox without a wake-up.
    pub flush_interval: Duration,
    /// Bound address, once listening.
    pub local_addr: Arc<OnceLock<SocketAddr>>,
}

/// The comet server.
pub struct CometServer {
    settings: ServerSettings,
    hub: Arc<MailboxHub>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    local_addr: Arc<OnceLock<SocketAddr>>,
}

impl CometServer {
    /// Create a server with a fresh hub.
    pub fn new(settings: ServerSettings) -> Self {
        let hub = Arc::new(MailboxHub::new(HubConfig::from(&settings)));
        Self::with_hub(settings, hub)
    }

    /// Create a server around an existing hub (e.g. one fed by the log bridge).
    pub fn with_hub(settings: ServerSettings, hub: Arc<MailboxHub>) -> Self {
        Self {
            settings,
            shutdown: Arc::new(ShutdownCoordinator::new(hub.clone())),
            hub,
            start_time: Instant::now(),
            local_addr: Arc::new(OnceLock::new()),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            subprotocol: Arc::from(self.settings.subprotocol.as_str()),
            flush_interval: self.settings.socket_flush_interval(),
            local_addr: self.local_addr.clone(),
        };

        Router::new()
            .route("/comet/poll", get(poll_handler).post(poll_handler))
            .route("/comet/ws", get(ws_handler))
            .route("/comet/debug", get(debug_handler).post(debug_handler))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind to the configured address and serve until shutdown.
    ///
    /// Returns the bound address and the serving task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener =
            TcpListener::bind((self.settings.host.as_str(), self.settings.port)).await?;
        let addr = listener.local_addr()?;
        let _ = self.local_addr.set(addr);
        info!(%addr, "comet server listening");

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "comet server failed");
            }
        });
        Ok((addr, handle))
    }

    /// Spawn the mailbox expiry sweeper.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        self.hub
            .spawn_sweeper(self.settings.sweep_interval(), self.shutdown.token())
    }

    /// Get the mailbox hub.
    pub fn hub(&self) -> &Arc<MailboxHub> {
        &self.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server settings.
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }
}

/// Addresses of the requesting connection.
pub struct ClientOrigin(pub Origin);

impl FromRequestParts<AppState> for ClientOrigin {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self(Origin {
            peer,
            local: state.local_addr.get().copied(),
        }))
    }
}

/// Parameters of `/comet/poll`, from the query string or a form body.
#[derive(Debug, Default, Deserialize)]
pub struct PollParams {
    /// Mailbox to read.
    pub boxid: Option<String>,
    /// Non-zero to skip the wait.
    pub immediate: Option<String>,
}

impl PollParams {
    fn boxid(&self) -> Option<&str> {
        self.boxid.as_deref().filter(|s| !s.is_empty())
    }

    fn immediate(&self) -> bool {
        self.immediate
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .is_some_and(|n| n != 0)
    }
}

/// Parameters carrying just a mailbox id.
#[derive(Debug, Default, Deserialize)]
pub struct BoxParams {
    /// Mailbox id.
    pub boxid: Option<String>,
}

/// GET|POST /comet/poll
async fn poll_handler(
    State(state): State<AppState>,
    ClientOrigin(origin): ClientOrigin,
    Form(params): Form<PollParams>,
) -> Result<Json<Envelope>, HubError> {
    trace!(boxid = ?params.boxid, immediate = params.immediate(), "poll");
    let envelope = state
        .hub
        .poll(params.boxid(), params.immediate(), &origin)
        .await?;
    Ok(Json(envelope))
}

/// GET /comet/ws
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ClientOrigin(origin): ClientOrigin,
    Query(params): Query<BoxParams>,
) -> Response {
    if !state.hub.is_running() {
        return HubError::ShuttingDown.into_response();
    }
    let boxid = params.boxid.filter(|s| !s.is_empty());
    ws.protocols([state.subprotocol.to_string()])
        .on_upgrade(move |socket| websocket::run_socket(socket, state, boxid, origin))
}

/// GET|POST /comet/debug
async fn debug_handler(State(state): State<AppState>, Form(params): Form<BoxParams>) -> StatusCode {
    match params.boxid.as_deref().filter(|s| !s.is_empty()) {
        Some(boxid) => {
            let _ = state.hub.toggle_debug(boxid);
            StatusCode::OK
        }
        None => StatusCode::BAD_REQUEST,
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::snapshot(&state.hub, state.start_time.elapsed()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn make_server() -> CometServer {
        let settings = ServerSettings {
            port: 0,
            ..ServerSettings::default()
        };
        CometServer::new(settings)
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 100_000)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn poll_params_parsing() {
        let p = PollParams {
            boxid: Some(String::new()),
            immediate: Some("1".into()),
        };
        assert!(p.boxid().is_none());
        assert!(p.immediate());
        let p = PollParams {
            boxid: Some("abc".into()),
            immediate: Some("0".into()),
        };
        assert_eq!(p.boxid(), Some("abc"));
        assert!(!p.immediate());
        assert!(!PollParams::default().immediate());
        let p = PollParams {
            boxid: None,
            immediate: Some("yes".into()),
        };
        assert!(!p.immediate());
    }

    #[tokio::test]
    async fn health_endpoint_returns_counts() {
        let server = make_server();
        let _ = server.hub().find_or_create(None, &Origin::default()).unwrap();
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["mailboxes"], 1);
        assert_eq!(parsed["sockets"], 0);
    }

    #[tokio::test]
    async fn immediate_get_poll_returns_seeded_envelope() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/comet/poll?immediate=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["boxid"].as_str().unwrap().len(), 40);
        assert_eq!(parsed["messages"][0]["notificationClass"], "accessUpdate");
        assert_eq!(parsed["messages"][1]["notificationClass"], "setServerIpPort");
    }

    #[tokio::test]
    async fn form_post_poll_resumes_mailbox() {
        let server = make_server();
        let id = server.hub().find_or_create(None, &Origin::default()).unwrap();
        let resp = server
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/comet/poll")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from(format!("boxid={id}&immediate=1")))
                    .unwrap(),
            )
            .await
            .unwrap();
        let parsed = body_json(resp).await;
        assert_eq!(parsed["boxid"], id.as_str());
        assert_eq!(parsed["messages"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn poll_after_shutdown_is_bad_request() {
        let server = make_server();
        server.shutdown().shutdown();
        let resp = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/comet/poll?immediate=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn debug_requires_boxid() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/comet/debug").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn debug_toggles_mailbox() {
        let server = make_server();
        let id = server.hub().find_or_create(None, &Origin::default()).unwrap();
        let resp = server
            .router()
            .oneshot(
                Request::builder()
                    .uri(format!("/comet/debug?boxid={id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(server.hub().debug_enabled(&id));
        assert_eq!(server.hub().pending(&id), 3);
    }

    #[tokio::test]
    async fn ws_without_upgrade_is_rejected() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/comet/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/nonexistent").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
