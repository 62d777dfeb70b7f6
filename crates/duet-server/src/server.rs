//! `DuetServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::header;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use duet_core::ClientId;

use crate::assets;
use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::registry::{RegistryHandle, actor::DEFAULT_COMMAND_BUFFER, spawn_registry};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::{SessionConfig, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the session registry actor.
    pub registry: RegistryHandle,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Per-connection settings.
    pub session_config: SessionConfig,
    /// Largest accepted WebSocket message.
    pub max_message_size: usize,
    /// Prometheus render handle.
    pub metrics: PrometheusHandle,
}

/// The duet server: two static files, one WebSocket relay.
pub struct DuetServer {
    config: ServerConfig,
    registry: RegistryHandle,
    registry_task: JoinHandle<()>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: PrometheusHandle,
    start_time: Instant,
}

impl DuetServer {
    /// Create a server and start its registry actor.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: ServerConfig, metrics: PrometheusHandle) -> Self {
        let (registry, registry_task) = spawn_registry(DEFAULT_COMMAND_BUFFER);
        Self {
            config,
            registry,
            registry_task,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            session_config: SessionConfig::from(&self.config),
            max_message_size: self.config.max_message_size,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .merge(assets::routes(&self.config.assets_dir))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task,
    /// which finishes after [`ShutdownCoordinator::shutdown`] once in-flight
    /// connections have closed.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(source) => return Err(ServerError::Bind { addr, source }),
        };
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "server error");
            }
        });

        info!(addr = %local_addr, assets = %self.config.assets_dir.display(), "duet server listening");
        Ok((local_addr, handle))
    }

    /// Get the registry handle.
    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Whether the registry actor is still running.
    pub fn registry_running(&self) -> bool {
        !self.registry_task.is_finished()
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let client_id = ClientId::new();
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| {
            run_ws_session(
                socket,
                client_id,
                state.registry,
                state.session_config,
                state.shutdown.token(),
            )
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.registry.snapshot().await.ok();
    let resp = health::health_check(
        state.start_time,
        snapshot.as_ref().map(|s| s.count()),
        snapshot.map_or(duet_core::MAX_SESSIONS, |s| s.capacity),
    );
    Json(resp)
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
