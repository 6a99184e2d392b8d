//! WebSocket client connection state shared between the room and the
//! connection task.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dicechat_core::ConnectionId;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Represents a connected WebSocket client.
pub struct ClientConnection {
    pub id: ConnectionId,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<str>>,
    pub connected_at: Instant,
    /// Whether the client has shown activity since the last heartbeat check.
    is_alive: AtomicBool,
    /// When the last Pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Count of messages dropped due to full or closed channel.
    dropped_messages: AtomicU64,
    /// Cancelled when the room wants this connection gone.
    close: CancellationToken,
}

impl ClientConnection {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<str>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            close: CancellationToken::new(),
        }
    }

    /// Queue a serialized frame without waiting.
    ///
    /// Returns `false` if the channel is full or closed, and increments
    /// the dropped message counter.
    pub fn send(&self, payload: Arc<str>) -> bool {
        if self.tx.try_send(payload).is_ok() {
            true
        } else {
            self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or frame received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Ask the connection task to hang up.
    pub fn request_close(&self) {
        self.close.cancel();
    }

    pub fn is_close_requested(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Token the connection task watches for [`Self::request_close`].
    pub fn close_token(&self) -> CancellationToken {
        self.close.clone()
    }

    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
