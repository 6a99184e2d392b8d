//! Axum router, listener and the handle that shuts everything down.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use dicechat_core::ConnectionId;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health;
use crate::room::{spawn_room, ChatRoom, RoomHandle};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::{run_ws_session, SessionTimings};

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub room: RoomHandle,
    pub config: Arc<ServerConfig>,
    /// Open WebSocket connections, counted at upgrade time.
    pub connections: Arc<AtomicUsize>,
    pub shutdown: CancellationToken,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(room: RoomHandle, config: ServerConfig, shutdown: CancellationToken) -> Self {
        Self {
            room,
            config: Arc::new(config),
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown,
            start_time: Instant::now(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Spawn the room dispatcher, bind the listener and start serving.
pub async fn start(config: ServerConfig, room: ChatRoom) -> Result<ServerHandle, ServerError> {
    let coordinator = ShutdownCoordinator::new();
    let token = coordinator.token();
    let (room_handle, room_task) = spawn_room(room, token.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    let timeout = config.shutdown_timeout();

    let router = build_router(AppState::new(room_handle.clone(), config, token.clone()));

    info!(addr = %local_addr, "dicechat server started");

    let server_task = tokio::spawn(async move {
        let serve = axum::serve(listener, router)
            .with_graceful_shutdown(async move { token.cancelled().await });
        if let Err(e) = serve.await {
            warn!(error = %e, "server exited with error");
        }
    });

    Ok(ServerHandle {
        addr: local_addr,
        room: room_handle,
        coordinator,
        tasks: vec![server_task, room_task],
        timeout,
    })
}

/// Handle returned by [`start`]; keeps the background tasks alive.
pub struct ServerHandle {
    addr: SocketAddr,
    room: RoomHandle,
    coordinator: ShutdownCoordinator,
    tasks: Vec<JoinHandle<()>>,
    timeout: Duration,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn room(&self) -> &RoomHandle {
        &self.room
    }

    /// Stop accepting, close every connection and wait for the tasks.
    pub async fn shutdown(self) {
        info!("shutting down server");
        self.coordinator
            .graceful_shutdown(self.tasks, self.timeout)
            .await;
        info!("server stopped");
    }
}

/// Reservation of one connection slot, released on drop.
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn acquire(counter: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| Self(Arc::clone(counter)))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// GET /ws
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let Some(slot) = ConnectionSlot::acquire(&state.connections, state.config.max_connections)
    else {
        warn!(
            max_connections = state.config.max_connections,
            "connection limit reached, rejecting upgrade"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    };

    let id = ConnectionId::new();
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    info!(conn_id = %id, origin, "websocket upgrade");

    let timings = SessionTimings::from(state.config.as_ref());
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            let _slot = slot;
            run_ws_session(socket, id, state.room, timings, state.shutdown).await;
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Response {
    match state.room.stats().await {
        Ok(stats) => Json(health::health_check(state.start_time, stats)).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "unavailable", "error": e.to_string() })),
        )
            .into_response(),
    }
}
