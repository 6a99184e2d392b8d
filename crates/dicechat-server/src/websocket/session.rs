//! Connection lifecycle: from upgrade through disconnect, one task per
//! client.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use dicechat_core::ConnectionId;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use crate::config::ServerConfig;
use crate::room::RoomHandle;

/// Heartbeat and queue sizing for one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionTimings {
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub send_queue_capacity: usize,
}

impl From<&ServerConfig> for SessionTimings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval().max(Duration::from_secs(1)),
            heartbeat_timeout: config.heartbeat_timeout(),
            send_queue_capacity: config.send_queue_capacity.max(1),
        }
    }
}

/// What an inbound frame means for the session.
#[derive(Debug, PartialEq, Eq)]
enum Inbound {
    Text(String),
    Activity,
    Ignored,
    Close,
}

fn classify(msg: Message) -> Inbound {
    match msg {
        Message::Text(text) => Inbound::Text(text.to_string()),
        Message::Binary(data) => {
            debug!(len = data.len(), "dropping binary frame");
            Inbound::Ignored
        }
        Message::Ping(_) | Message::Pong(_) => Inbound::Activity,
        Message::Close(_) => Inbound::Close,
    }
}

/// `true` once a client has missed a full heartbeat cycle and been silent
/// longer than `timeout`.
fn heartbeat_expired(connection: &ClientConnection, timeout: Duration) -> bool {
    !connection.check_alive() && connection.last_pong_elapsed() > timeout
}

/// Run a WebSocket session for a connected client.
///
/// Registers with the room (which sends the history snapshot), pumps
/// inbound text frames to the dispatcher, and forwards the outbound queue
/// with periodic Ping frames. Leaves the room on any exit path.
#[instrument(skip_all, fields(conn_id = %id))]
pub async fn run_ws_session(
    ws: WebSocket,
    id: ConnectionId,
    room: RoomHandle,
    timings: SessionTimings,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<str>>(timings.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(id.clone(), send_tx));
    let close = connection.close_token();

    if room.join(Arc::clone(&connection)).await.is_err() {
        warn!("room is not running, dropping connection");
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    }
    info!("client connected");

    let outbound_conn = Arc::clone(&connection);
    let outbound_close = close.clone();
    let outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(timings.heartbeat_interval);
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if heartbeat_expired(&outbound_conn, timings.heartbeat_timeout) {
                        warn!(timeout = ?timings.heartbeat_timeout, "client unresponsive, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                _ = outbound_close.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
        outbound_conn.request_close();
    });

    loop {
        let msg = tokio::select! {
            _ = close.cancelled() => {
                debug!("connection closed by server");
                break;
            }
            _ = shutdown.cancelled() => {
                debug!("server shutting down");
                break;
            }
            msg = ws_rx.next() => msg,
        };

        let msg = match msg {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "websocket read failed");
                break;
            }
            None => break,
        };

        match classify(msg) {
            Inbound::Text(text) => {
                connection.mark_alive();
                if room.frame(id.clone(), text).await.is_err() {
                    warn!("room stopped while client was connected");
                    break;
                }
            }
            Inbound::Activity => connection.mark_alive(),
            Inbound::Ignored => {}
            Inbound::Close => {
                info!("client sent close frame");
                break;
            }
        }
    }

    outbound.abort();
    let _ = room.leave(id).await;
    info!(
        duration_secs = connection.age().as_secs(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
}
