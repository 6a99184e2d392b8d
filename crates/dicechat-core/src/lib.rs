//! # dicechat-core
//!
//! Domain types for the dice chat room: identity colors, the replay
//! history, the dice roller and the JSON wire protocol. Nothing here does
//! I/O; the server crate owns connections and scheduling.

pub mod colors;
pub mod dice;
pub mod errors;
pub mod escape;
pub mod history;
pub mod ids;
pub mod protocol;

pub use colors::{Color, ColorPool, DEFAULT_PALETTE};
pub use dice::{DiceRoller, Roll, RollLimits};
pub use errors::{DiceError, RoomError};
pub use escape::escape_html;
pub use history::{
    now_millis, ChatEntry, HistoryBuffer, HistoryEntry, HistorySnapshot, Player, PlayersRegistry,
    RollEntry, DEFAULT_HISTORY_CAPACITY,
};
pub use ids::ConnectionId;
pub use protocol::{ClientEvent, ErrorNotice, ServerEvent};
