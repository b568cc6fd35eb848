//! `CourierServer`: axum HTTP + WebSocket surface over the delivery core.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use courier_core::{EventId, RecipientId};
use courier_store::OutboxStore;
use futures::StreamExt;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::ack;
use crate::config::{DeliveryConfig, ServerConfig};
use crate::context::DeliveryContext;
use crate::dispatch::DomainDispatcher;
use crate::groups::GroupMembership;
use crate::health::{self, HealthResponse};
use crate::identity::IdentityResolver;
use crate::presence::PresenceTable;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::hub::Hub;
use crate::websocket::session::accept_and_run;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Hub, presence, dispatcher and delivery tuning.
    pub ctx: Arc<DeliveryContext>,
    /// Authenticates handshakes and HTTP callers.
    pub identity: Arc<dyn IdentityResolver>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Prometheus handle; `/metrics` answers 404 without one.
    pub metrics: Option<PrometheusHandle>,
    /// When the server started.
    pub start_time: Instant,
}

/// The courier delivery server.
pub struct CourierServer {
    config: ServerConfig,
    ctx: Arc<DeliveryContext>,
    identity: Arc<dyn IdentityResolver>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl CourierServer {
    /// Create a server around the given collaborators.
    pub fn new(
        config: ServerConfig,
        delivery: DeliveryConfig,
        outbox: Arc<dyn OutboxStore>,
        groups: Arc<dyn GroupMembership>,
        dispatcher: Arc<dyn DomainDispatcher>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        let hub = Arc::new(Hub::new(outbox, groups, config.max_connections));
        let ctx = Arc::new(DeliveryContext {
            hub,
            presence: Arc::new(PresenceTable::new()),
            dispatcher,
            config: delivery,
        });
        Self {
            config,
            ctx,
            identity,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from this recorder handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            ctx: self.ctx.clone(),
            identity: self.identity.clone(),
            shutdown: self.shutdown.clone(),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/version", get(version_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .route("/presence/{peer_id}", get(presence_handler))
            .route("/messages", get(messages_handler))
            .route(
                "/users/{user_id}/messages/{message_id}/ack",
                post(ack_handler),
            )
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve until shutdown is signalled.
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "http server stopped with error");
            }
        });

        info!(%local_addr, "courier server listening");
        Ok((local_addr, handle))
    }

    /// Stop accepting, close every connection and wait for in-flight work,
    /// bounded by the configured shutdown timeout. Presence is cleared once
    /// the hub has drained.
    ///
    /// Returns `false` when the drain timed out.
    pub async fn drain(&self) -> bool {
        let ctx = self.ctx.clone();
        let drained = self
            .shutdown
            .graceful_shutdown(
                async move {
                    ctx.hub.shutdown().await;
                    ctx.presence.clear();
                },
                Some(self.ctx.config.shutdown_timeout),
            )
            .await;
        if !drained {
            warn!(
                connections = self.ctx.hub.connection_count(),
                "connections still open after shutdown timeout"
            );
        }
        drained
    }

    /// Shared delivery context.
    pub fn context(&self) -> &Arc<DeliveryContext> {
        &self.ctx
    }

    /// Connection registry.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.ctx.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Errors surfaced by the HTTP routes.
#[derive(Debug)]
enum ApiError {
    Unauthorized,
    Forbidden,
    Unavailable,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden".to_string()),
            Self::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "shutting down".to_string()),
            Self::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<RecipientId, ApiError> {
    state.identity.resolve(headers).await.map_err(|e| {
        debug!(error = %e, "rejected unauthenticated request");
        ApiError::Unauthorized
    })
}

#[derive(Serialize)]
struct DataResponse<T> {
    data: T,
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let draining = state.shutdown.is_shutting_down() || state.ctx.hub.is_shutting_down();
    Json(health::health_check(
        state.start_time,
        state.ctx.hub.connection_count(),
        state.ctx.presence.tracked(),
        draining,
    ))
}

/// GET /version
async fn version_handler() -> Json<serde_json::Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /ws: authenticate, then upgrade and run the connection.
async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    if state.shutdown.is_shutting_down() || state.ctx.hub.is_shutting_down() {
        return Err(ApiError::Unavailable);
    }
    let recipient = authenticate(&state, &headers).await?;
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let ctx = state.ctx.clone();
    let tracker = ctx.hub.tracker().clone();
    let response = ws
        .max_message_size(ctx.config.max_frame_bytes)
        .on_upgrade(move |socket| async move {
            let (sink, stream) = socket.split();
            // refusal is logged inside the session
            let _ = tracker
                .track_future(accept_and_run(sink, stream, recipient, ctx))
                .await;
        });
    Ok(response)
}

/// GET /presence/{peer_id}: current presence of a peer; subscribes the caller
/// to the peer's future changes.
async fn presence_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(peer_id): Path<String>,
) -> Result<Json<DataResponse<Option<courier_core::PresenceRecord>>>, ApiError> {
    let caller = authenticate(&state, &headers).await?;
    let peer = RecipientId::from(peer_id);
    if state.ctx.presence.subscribe(&peer, caller.clone()) {
        debug!(subscriber = %caller, owner = %peer, "presence subscription added");
    }
    Ok(Json(DataResponse {
        data: state.ctx.presence.get(&peer),
    }))
}

/// GET /messages: the caller's pending events, oldest first.
async fn messages_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DataResponse<Vec<courier_core::ServerPush>>>, ApiError> {
    let caller = authenticate(&state, &headers).await?;
    let pending = state
        .ctx
        .hub
        .outbox()
        .list_ordered(&caller)
        .await
        .map_err(|e| {
            error!(recipient = %caller, error = %e, "failed to list pending events");
            ApiError::Internal("failed to list pending events".into())
        })?;
    Ok(Json(DataResponse { data: pending }))
}

/// POST /users/{user_id}/messages/{message_id}/ack: delivery confirmed by a
/// push-notification path.
async fn ack_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((user_id, message_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let caller = authenticate(&state, &headers).await?;
    if caller.as_str() != user_id {
        return Err(ApiError::Forbidden);
    }
    let event_id = EventId::from(message_id);
    let outcome = ack::confirm_notification(&state.ctx.hub, &caller, &event_id)
        .await
        .map_err(|e| {
            error!(recipient = %caller, %event_id, error = %e, "notification confirmation failed");
            ApiError::Internal("failed to confirm delivery".into())
        })?;
    debug!(recipient = %caller, %event_id, ?outcome, "notification confirmed");
    Ok(Json(json!({ "status": "ok" })))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
