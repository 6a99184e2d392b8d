//! Settings types and their compiled defaults.

use std::collections::BTreeMap;
use std::str::FromStr;

use dicechat_core::{DEFAULT_HISTORY_CAPACITY, DEFAULT_PALETTE};
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub server: ServerSettings,
    pub room: RoomSettings,
    pub logging: LoggingSettings,
}

/// Listener and per-connection transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Upgrades beyond this many open connections are refused.
    pub max_connections: usize,
    pub heartbeat_interval_secs: u64,
    /// Close a connection that has not answered for this long.
    pub heartbeat_timeout_secs: u64,
    /// Largest accepted WebSocket frame, in bytes.
    pub max_message_size: usize,
    /// Outbound queue length per connection.
    pub send_queue_capacity: usize,
    /// Close a connection after this many dropped outbound messages (0 = never).
    pub max_dropped_messages: u64,
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 1337,
            max_connections: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
            send_queue_capacity: 256,
            max_dropped_messages: 64,
            shutdown_timeout_secs: 10,
        }
    }
}

/// Chat room behaviour.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomSettings {
    pub history_capacity: usize,
    /// `#rrggbb` identity colors; the number of entries caps concurrent players.
    pub palette: Vec<String>,
    pub max_username_len: usize,
    pub max_message_len: usize,
    pub max_roll_sides: u32,
    pub max_roll_count: u32,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            palette: DEFAULT_PALETTE.iter().map(|c| (*c).to_string()).collect(),
            max_username_len: 32,
            max_message_len: 2000,
            max_roll_sides: 1000,
            max_roll_count: 100,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default level. `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-target level overrides, e.g. `"dicechat_server" => "debug"`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            modules: BTreeMap::new(),
        }
    }
}

impl LoggingSettings {
    /// Parsed default level, `INFO` when unparseable.
    pub fn level(&self) -> Level {
        Level::from_str(&self.level).unwrap_or(Level::INFO)
    }

    /// Parsed per-module overrides; unparseable entries are skipped.
    pub fn module_levels(&self) -> Vec<(String, Level)> {
        self.modules
            .iter()
            .filter_map(|(module, level)| Some((module.clone(), Level::from_str(level).ok()?)))
            .collect()
    }
}

impl ChatSettings {
    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let room = &self.room;
        if room.palette.is_empty() {
            return Err(invalid("room.palette must contain at least one color"));
        }
        for (i, color) in room.palette.iter().enumerate() {
            if !is_hex_color(color) {
                return Err(invalid(format!("room.palette entry {color:?} is not #rrggbb")));
            }
            if room.palette[..i].iter().any(|c| c.eq_ignore_ascii_case(color)) {
                return Err(invalid(format!("room.palette lists {color} twice")));
            }
        }
        if room.history_capacity == 0 {
            return Err(invalid("room.history_capacity must be at least 1"));
        }
        if room.max_username_len == 0 || room.max_message_len == 0 {
            return Err(invalid("room length limits must be at least 1"));
        }
        if room.max_roll_sides == 0 || room.max_roll_count == 0 {
            return Err(invalid("room roll limits must be at least 1"));
        }

        let server = &self.server;
        if server.send_queue_capacity == 0 || server.max_connections == 0 {
            return Err(invalid("server queue and connection limits must be at least 1"));
        }
        if server.heartbeat_interval_secs == 0
            || server.heartbeat_timeout_secs < server.heartbeat_interval_secs
        {
            return Err(invalid(
                "server.heartbeat_timeout_secs must be >= heartbeat_interval_secs > 0",
            ));
        }

        Level::from_str(&self.logging.level)
            .map_err(|_| invalid(format!("unknown log level {:?}", self.logging.level)))?;
        for (module, level) in &self.logging.modules {
            Level::from_str(level)
                .map_err(|_| invalid(format!("unknown log level {level:?} for {module}")))?;
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> SettingsError {
    SettingsError::InvalidValue(msg.into())
}

fn is_hex_color(s: &str) -> bool {
    s.len() == 7 && s.starts_with('#') && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}
