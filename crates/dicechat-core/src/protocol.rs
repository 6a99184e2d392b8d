//! JSON wire protocol: `{"event": <name>, "data": {...}}` in both directions.

use serde::{Deserialize, Serialize, Serializer};

use crate::errors::RoomError;
use crate::history::{HistoryEntry, HistorySnapshot, Player};

/// Outer shape of every server frame.
#[derive(Serialize)]
pub(crate) struct Envelope<'a, T> {
    event: &'a str,
    data: T,
}

impl<'a, T> Envelope<'a, T> {
    pub(crate) fn new(event: &'a str, data: T) -> Self {
        Self { event, data }
    }
}

/// A decoded client frame.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Login { username: String },
    Chat { message: String },
    /// Signed so that negative requests reach validation.
    Roll { dim: i64, count: i64 },
}

impl ClientEvent {
    /// Decode a text frame. Unknown events and malformed payloads are errors.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Chat { .. } => "chat",
            Self::Roll { .. } => "roll",
        }
    }
}

/// Private rejection notice, payload of the `error` event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorNotice {
    pub code: String,
    pub message: String,
}

impl From<&RoomError> for ErrorNotice {
    fn from(err: &RoomError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Everything the server sends to clients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerEvent {
    History(HistorySnapshot),
    Auth(Player),
    LoggedIn(Player),
    LoggedOut { username: String },
    /// A chat or roll broadcast; same bytes as its history replay.
    Entry(HistoryEntry),
    Error(ErrorNotice),
}

#[derive(Serialize)]
struct LoggedOutData<'a> {
    username: &'a str,
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::History(_) => "history",
            Self::Auth(_) => "auth",
            Self::LoggedIn(_) => "logged_in",
            Self::LoggedOut { .. } => "logged_out",
            Self::Entry(entry) => entry.event_name(),
            Self::Error(_) => "error",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Serialize for ServerEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let event = self.name();
        match self {
            Self::History(snapshot) => Envelope::new(event, snapshot).serialize(serializer),
            Self::Auth(player) | Self::LoggedIn(player) => {
                Envelope::new(event, player).serialize(serializer)
            }
            Self::LoggedOut { username } => {
                Envelope::new(event, LoggedOutData { username }).serialize(serializer)
            }
            Self::Entry(entry) => entry.serialize(serializer),
            Self::Error(notice) => Envelope::new(event, notice).serialize(serializer),
        }
    }
}
