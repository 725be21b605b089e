//! `KeysprintServer` — Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use keysprint_core::GameError;
use keysprint_core::ids::GameId;
use keysprint_core::protocol::GameSnapshot;
use keysprint_engine::Arena;

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The registry of live games.
    pub arena: Arc<Arena>,
    /// Server configuration.
    pub config: ServerConfig,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Currently attached WebSocket connections.
    pub connections: Arc<AtomicUsize>,
    /// Prometheus render handle for `/metrics`.
    pub metrics: PrometheusHandle,
}

/// The main keysprint server.
pub struct KeysprintServer {
    config: ServerConfig,
    arena: Arc<Arena>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    connections: Arc<AtomicUsize>,
    metrics: PrometheusHandle,
}

impl KeysprintServer {
    /// Create a new server around an arena.
    pub fn new(config: ServerConfig, arena: Arc<Arena>, metrics: PrometheusHandle) -> Self {
        Self {
            config,
            arena,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            connections: Arc::new(AtomicUsize::new(0)),
            metrics,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            arena: self.arena.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            connections: self.connections.clone(),
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/game/create", post(create_game_handler))
            .route("/game/{game_id}", get(lookup_game_handler))
            .route("/ws/{game_id}", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind the configured address, serve until shutdown, and start the
    /// abandoned-game sweeper. Returns the bound address and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;

        let app = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(e) = served {
                error!(error = %e, "server error");
            }
        });

        self.spawn_sweeper();
        Ok((addr, handle))
    }

    /// The registry of live games.
    pub fn arena(&self) -> &Arc<Arena> {
        &self.arena
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Periodically reap games nobody can finish. Exits on shutdown.
    fn spawn_sweeper(&self) {
        let arena = self.arena.clone();
        let token = self.shutdown.token();
        let every = Duration::from_secs(self.config.sweep_interval_secs);
        let ttl = Duration::from_secs(self.config.abandoned_after_secs);
        drop(tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            // Skip the immediate first tick
            let _ = tick.tick().await;
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let evicted = arena.evict_abandoned(ttl);
                        if evicted > 0 {
                            info!(evicted, "abandoned-game sweep");
                        }
                    }
                    () = token.cancelled() => break,
                }
            }
        }));
    }
}

/// Engine error carried onto the HTTP surface.
struct ApiError(GameError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GameError::NotFound { .. } => StatusCode::NOT_FOUND,
            GameError::Validation { .. } | GameError::Protocol { .. } => StatusCode::BAD_REQUEST,
            GameError::Closed { .. } => StatusCode::GONE,
            GameError::Connection { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self.0.to_error_body())).into_response()
    }
}

/// POST /game/create
async fn create_game_handler(State(state): State<AppState>) -> (StatusCode, Json<GameSnapshot>) {
    let game = state.arena.create_game();
    info!(game_id = %game.id(), "game created");
    (StatusCode::CREATED, Json(game.snapshot()))
}

/// GET /game/{game_id}
async fn lookup_game_handler(
    Path(game_id): Path<GameId>,
    State(state): State<AppState>,
) -> Result<Json<GameSnapshot>, ApiError> {
    let game = state.arena.get(game_id).map_err(ApiError)?;
    Ok(Json(game.snapshot()))
}

/// GET /ws/{game_id} — upgrade and attach to a game.
///
/// The arena lookup happens before the upgrade so an unknown id fails the
/// handshake with a regular 404 instead of a doomed socket.
async fn ws_handler(
    Path(game_id): Path<GameId>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    match state.arena.get(game_id) {
        Ok(game) => ws.on_upgrade(move |socket| websocket::run_player_session(socket, game, state)),
        Err(err) => ApiError(err).into_response(),
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.connections.load(Ordering::Relaxed);
    let resp = health::health_check(state.start_time, connections, state.arena.len());
    Json(resp)
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}
