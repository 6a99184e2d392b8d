//! Bounded replay log of chat and roll events, plus the registry of
//! logged-in players that is replayed with it.

use std::collections::{BTreeMap, VecDeque};

use serde::{Serialize, Serializer};

use crate::colors::Color;
use crate::protocol::Envelope;

/// Number of entries the reference server keeps for replay.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Server-assigned entry timestamp, in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A logged-in player as shown to other clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Player {
    pub username: String,
    pub color: Color,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatEntry {
    /// Milliseconds since the Unix epoch.
    pub time: i64,
    pub message: String,
    pub author: String,
    pub color: Color,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RollEntry {
    pub time: i64,
    pub dim: u32,
    pub count: u32,
    pub rolls: Vec<u32>,
    pub author: String,
    pub color: Color,
}

/// One replayable room event.
///
/// Serializes as the full broadcast envelope, with the event name repeated
/// inside `data`: `{"event":"chat","data":{"event":"chat",...}}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HistoryEntry {
    Chat(ChatEntry),
    Roll(RollEntry),
}

impl HistoryEntry {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Chat(_) => "chat",
            Self::Roll(_) => "roll",
        }
    }

    pub fn author(&self) -> &str {
        match self {
            Self::Chat(e) => &e.author,
            Self::Roll(e) => &e.author,
        }
    }

    pub fn time(&self) -> i64 {
        match self {
            Self::Chat(e) => e.time,
            Self::Roll(e) => e.time,
        }
    }
}

#[derive(Serialize)]
struct Tagged<'a, T> {
    event: &'static str,
    #[serde(flatten)]
    entry: &'a T,
}

impl Serialize for HistoryEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let event = self.event_name();
        match self {
            Self::Chat(entry) => Envelope::new(event, Tagged { event, entry }).serialize(serializer),
            Self::Roll(entry) => Envelope::new(event, Tagged { event, entry }).serialize(serializer),
        }
    }
}

/// Username → player map of everyone currently logged in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PlayersRegistry(BTreeMap<String, Player>);

impl PlayersRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a player. Returns `false` and leaves the registry untouched if
    /// the username is already registered.
    pub fn insert(&mut self, player: Player) -> bool {
        if self.0.contains_key(&player.username) {
            return false;
        }
        self.0.insert(player.username.clone(), player);
        true
    }

    pub fn remove(&mut self, username: &str) -> Option<Player> {
        self.0.remove(username)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.0.contains_key(username)
    }

    pub fn get(&self, username: &str) -> Option<&Player> {
        self.0.get(username)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.0.values()
    }
}

/// Payload of the `history` event sent to every new connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistorySnapshot {
    pub messages: Vec<HistoryEntry>,
    pub players: PlayersRegistry,
}

/// FIFO log holding at most `capacity` entries; the oldest are evicted.
#[derive(Clone, Debug)]
pub struct HistoryBuffer {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl HistoryBuffer {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn snapshot(&self, players: &PlayersRegistry) -> HistorySnapshot {
        HistorySnapshot {
            messages: self.entries.iter().cloned().collect(),
            players: players.clone(),
        }
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
