//! `RelayServer`: axum HTTP + WebSocket listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use pilot_core::RelayError;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::broker::{HeartbeatMonitor, RelayBroker};
use crate::config::{PORT_ENV_VAR, RelayConfig};
use crate::controller::ControllerSession;
use crate::health::{self, HealthCounts, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::run_ws_session;

/// Body served to a plain HTTP GET on `/`.
pub const BANNER: &str = "Figma Pilot WebSocket Server";

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Relay broker.
    pub broker: Arc<RelayBroker>,
    /// Controller session.
    pub controller: Arc<ControllerSession>,
    /// Server configuration.
    pub config: Arc<RelayConfig>,
    /// When the server was created.
    pub start_time: Instant,
}

/// The relay server: owns the broker, the controller session, and the
/// heartbeat.
pub struct RelayServer {
    config: Arc<RelayConfig>,
    broker: Arc<RelayBroker>,
    controller: Arc<ControllerSession>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl RelayServer {
    /// Create a server. Nothing is bound until [`listen`](Self::listen).
    pub fn new(config: RelayConfig) -> Self {
        let broker = Arc::new(RelayBroker::new());
        let controller = ControllerSession::new(broker.clone(), config.request_timeout)
            .with_url(config.ws_url(config.port));
        Self {
            config: Arc::new(config),
            broker,
            controller: Arc::new(controller),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        let state = AppState {
            broker: self.broker.clone(),
            controller: self.controller.clone(),
            config: self.config.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind, start the heartbeat, and serve until shutdown.
    ///
    /// Returns the bound address and the server task. On shutdown the task
    /// stops accepting, closes every endpoint, stops the heartbeat, and
    /// abandons pending commands.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), RelayError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| self.bind_error(&addr, &e))?;
        let local_addr = listener.local_addr().map_err(|e| self.bind_error(&addr, &e))?;

        self.controller
            .set_url(self.config.ws_url(local_addr.port()));
        info!(%local_addr, "relay listening");

        let router = self.router();
        let token = self.shutdown.token();
        let broker = self.broker.clone();
        let controller = self.controller.clone();
        let heartbeat = HeartbeatMonitor::new(
            self.config.heartbeat_interval,
            self.config.heartbeat_grace,
        )
        .spawn(broker.clone(), token.clone());

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                warn!(error = %e, "server error");
            }
            broker.close_all();
            let _ = heartbeat.await;
            let _ = controller.abandon_pending();
            info!("relay stopped");
        });

        Ok((local_addr, handle))
    }

    fn bind_error(&self, addr: &str, e: &std::io::Error) -> RelayError {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            RelayError::PortInUse {
                port: self.config.port,
                env_var: PORT_ENV_VAR,
            }
        } else {
            RelayError::Bind {
                addr: addr.to_owned(),
                message: e.to_string(),
            }
        }
    }

    /// Broker.
    pub fn broker(&self) -> &Arc<RelayBroker> {
        &self.broker
    }

    /// Controller session.
    pub fn controller(&self) -> &Arc<ControllerSession> {
        &self.controller
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

/// GET /: WebSocket upgrade, or the banner for plain HTTP.
async fn root_handler(
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match ws {
        Ok(ws) => {
            let max_send_queue = state.config.max_send_queue;
            ws.max_message_size(state.config.max_message_size)
                .on_upgrade(move |socket| run_ws_session(socket, state.broker, max_send_queue))
        }
        Err(_) => BANNER.into_response(),
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let counts = HealthCounts {
        connections: state.broker.endpoint_count(),
        channels: state.broker.channel_names().len(),
        pending_requests: state.controller.pending_count(),
        controller_connected: state.controller.is_connected(),
    };
    Json(health::health_check(state.start_time, counts))
}
