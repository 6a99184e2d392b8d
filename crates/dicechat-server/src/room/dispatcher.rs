//! The single task that owns the [`ChatRoom`] and applies commands in
//! arrival order.

use std::sync::Arc;

use dicechat_core::ConnectionId;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ChatRoom, RoomStats};
use crate::error::ServerError;
use crate::websocket::ClientConnection;

/// Pending commands buffered ahead of the dispatcher.
pub const ROOM_QUEUE_CAPACITY: usize = 1024;

pub enum RoomCommand {
    Join(Arc<ClientConnection>),
    Frame { id: ConnectionId, text: String },
    Leave(ConnectionId),
    Stats(oneshot::Sender<RoomStats>),
}

/// Cloneable sender side of the room dispatcher.
#[derive(Clone)]
pub struct RoomHandle {
    tx: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub async fn join(&self, connection: Arc<ClientConnection>) -> Result<(), ServerError> {
        self.send(RoomCommand::Join(connection)).await
    }

    pub async fn frame(&self, id: ConnectionId, text: String) -> Result<(), ServerError> {
        self.send(RoomCommand::Frame { id, text }).await
    }

    pub async fn leave(&self, id: ConnectionId) -> Result<(), ServerError> {
        self.send(RoomCommand::Leave(id)).await
    }

    pub async fn stats(&self) -> Result<RoomStats, ServerError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Stats(reply)).await?;
        rx.await.map_err(|_| ServerError::RoomClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), ServerError> {
        self.tx.send(cmd).await.map_err(|_| ServerError::RoomClosed)
    }
}

/// Move `room` onto its own task. The task runs until `shutdown` fires or
/// every [`RoomHandle`] is dropped.
pub fn spawn_room(room: ChatRoom, shutdown: CancellationToken) -> (RoomHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(ROOM_QUEUE_CAPACITY);
    let task = tokio::spawn(run(room, rx, shutdown));
    (RoomHandle { tx }, task)
}

async fn run(mut room: ChatRoom, mut rx: mpsc::Receiver<RoomCommand>, shutdown: CancellationToken) {
    info!("room dispatcher started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("room dispatcher shutting down");
                break;
            }
            cmd = rx.recv() => {
                let Some(cmd) = cmd else {
                    debug!("all room handles dropped");
                    break;
                };
                apply(&mut room, cmd);
            }
        }
    }
    let stats = room.stats();
    info!(
        connections = stats.connections,
        players = stats.players,
        history_len = stats.history_len,
        "room dispatcher stopped"
    );
}

fn apply(room: &mut ChatRoom, cmd: RoomCommand) {
    match cmd {
        RoomCommand::Join(connection) => room.accept(connection),
        RoomCommand::Frame { id, text } => room.handle_frame(&id, &text),
        RoomCommand::Leave(id) => room.close(&id),
        RoomCommand::Stats(reply) => {
            let _ = reply.send(room.stats());
        }
    }
}
