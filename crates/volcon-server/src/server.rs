use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use volcon_settings::VolconSettings;
use volcon_telemetry::MetricsRecorder;

use crate::connection::{self, ConnectionConfig};
use crate::handlers;
use crate::hub::DeviceHub;
use crate::liveness;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    /// `0` binds an ephemeral port.
    pub port: u16,
    pub max_send_queue: usize,
    pub keepalive_interval: Duration,
    pub sweep_interval: Duration,
    /// `None` leaves requests pending until a reply or disconnect.
    pub request_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&VolconSettings::default())
    }
}

impl ServerConfig {
    pub fn from_settings(settings: &VolconSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_send_queue: settings.server.max_send_queue,
            keepalive_interval: settings.liveness.keepalive_interval(),
            sweep_interval: settings.liveness.sweep_interval(),
            request_timeout: settings.requests.timeout(),
        }
    }

    fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            max_send_queue: self.max_send_queue,
            keepalive_interval: self.keepalive_interval,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: DeviceHub,
    pub connection: ConnectionConfig,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(hub: DeviceHub, connection: ConnectionConfig, shutdown: CancellationToken) -> Self {
        Self {
            hub,
            connection,
            shutdown,
            started_at: Instant::now(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/ping", get(handlers::ping))
        .route("/devices", get(handlers::list_devices))
        .route("/adjustVolume", post(handlers::adjust_volume))
        .route("/setVolume", post(handlers::set_volume))
        .route("/setMute", post(handlers::set_mute))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind, start serving, and start the sweep task. Everything stops when
/// `shutdown` is cancelled.
pub async fn start(
    config: ServerConfig,
    metrics: Arc<MetricsRecorder>,
    shutdown: CancellationToken,
) -> Result<ServerHandle, std::io::Error> {
    let hub = DeviceHub::new(metrics, config.request_timeout);

    let sweep = liveness::start_sweep_task(hub.clone(), config.sweep_interval, shutdown.clone());

    let state = AppState::new(hub.clone(), config.connection_config(), shutdown.clone());
    let router = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        addr = %local_addr,
        request_timeout = ?config.request_timeout,
        "volcon server started"
    );

    let serve_token = shutdown.clone();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { serve_token.cancelled().await })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "server terminated");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        hub,
        shutdown,
        server,
        sweep,
    })
}

/// Handle returned by `start()`; keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    hub: DeviceHub,
    shutdown: CancellationToken,
    server: JoinHandle<()>,
    sweep: JoinHandle<()>,
}

impl ServerHandle {
    pub fn hub(&self) -> &DeviceHub {
        &self.hub
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Task handles to await during graceful shutdown.
    pub fn into_tasks(self) -> Vec<JoinHandle<()>> {
        vec![self.server, self.sweep]
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::serve_connection(socket, state.hub, state.connection, state.shutdown)
    })
}
