//! # dicechat-server
//!
//! Axum WebSocket server for the dice chat room.
//!
//! - `room`: session state machine, roster, broadcast and the single
//!   dispatcher task that owns all room state
//! - `websocket`: per-connection send queue, heartbeat and frame pump
//! - HTTP endpoints: `/ws` upgrade, `/health`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod room;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use error::ServerError;
pub use room::{ChatRoom, RoomConfig, RoomHandle, RoomStats};
pub use server::{build_router, start, AppState, ServerHandle};
