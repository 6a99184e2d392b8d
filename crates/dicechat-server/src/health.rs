//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

use crate::room::RoomStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the room dispatcher answers.
    pub status: String,
    pub uptime_secs: u64,
    /// Open WebSocket connections, logged in or not.
    pub connections: usize,
    /// Logged-in players.
    pub players: usize,
    pub history_len: usize,
    pub colors_available: usize,
}

/// Build a health response from the room's live counters.
pub fn health_check(start_time: Instant, stats: RoomStats) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: stats.connections,
        players: stats.players,
        history_len: stats.history_len,
        colors_available: stats.colors_available,
    }
}
