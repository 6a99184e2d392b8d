//! The chat room: roster, history, players, colors and dice, mutated only
//! by the dispatcher task.

pub mod dispatcher;
pub mod roster;
pub mod session;

pub use dispatcher::{spawn_room, RoomCommand, RoomHandle};
pub use roster::{Delivery, Member, Roster};
pub use session::{Session, SessionState};

use std::sync::Arc;

use dicechat_core::{
    escape_html, now_millis, ChatEntry, ClientEvent, Color, ColorPool, ConnectionId, DiceRoller,
    ErrorNotice, HistoryBuffer, HistoryEntry, Player, PlayersRegistry, RollEntry, RollLimits,
    RoomError, ServerEvent, DEFAULT_HISTORY_CAPACITY, DEFAULT_PALETTE,
};
use dicechat_settings::ChatSettings;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::websocket::ClientConnection;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomConfig {
    pub history_capacity: usize,
    pub palette: Vec<Color>,
    pub max_username_len: usize,
    pub max_message_len: usize,
    pub roll_limits: RollLimits,
    pub max_dropped_messages: u64,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            palette: DEFAULT_PALETTE.iter().map(|c| Color::new(*c)).collect(),
            max_username_len: 32,
            max_message_len: 2000,
            roll_limits: RollLimits::default(),
            max_dropped_messages: 64,
        }
    }
}

impl From<&ChatSettings> for RoomConfig {
    fn from(settings: &ChatSettings) -> Self {
        let room = &settings.room;
        Self {
            history_capacity: room.history_capacity,
            palette: room.palette.iter().map(Color::new).collect(),
            max_username_len: room.max_username_len,
            max_message_len: room.max_message_len,
            roll_limits: RollLimits {
                max_sides: room.max_roll_sides,
                max_count: room.max_roll_count,
            },
            max_dropped_messages: settings.server.max_dropped_messages,
        }
    }
}

/// Counters reported by `/health`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RoomStats {
    pub connections: usize,
    pub players: usize,
    pub history_len: usize,
    pub colors_available: usize,
}

pub struct ChatRoom {
    roster: Roster,
    history: HistoryBuffer,
    players: PlayersRegistry,
    colors: ColorPool,
    dice: DiceRoller,
    max_username_len: usize,
    max_message_len: usize,
}

impl ChatRoom {
    /// Room with the palette shuffled once from OS entropy.
    pub fn new(config: RoomConfig) -> Self {
        let colors = ColorPool::shuffled(config.palette.clone(), &mut StdRng::from_entropy());
        let dice = DiceRoller::new(config.roll_limits);
        Self::assemble(config, colors, dice)
    }

    /// Deterministic room: palette order and dice both derive from `seed`.
    pub fn seeded(config: RoomConfig, seed: u64) -> Self {
        let colors = ColorPool::shuffled(config.palette.clone(), &mut StdRng::seed_from_u64(seed));
        let dice = DiceRoller::seeded(seed, config.roll_limits);
        Self::assemble(config, colors, dice)
    }

    fn assemble(config: RoomConfig, colors: ColorPool, dice: DiceRoller) -> Self {
        Self {
            roster: Roster::new(config.max_dropped_messages),
            history: HistoryBuffer::new(config.history_capacity),
            players: PlayersRegistry::new(),
            colors,
            dice,
            max_username_len: config.max_username_len,
            max_message_len: config.max_message_len,
        }
    }

    /// Register a new connection and send it the history snapshot.
    pub fn accept(&mut self, connection: Arc<ClientConnection>) {
        let id = connection.id.clone();
        if !self.roster.register(connection) {
            warn!(conn_id = %id, "connection registered twice, ignoring");
            return;
        }
        let snapshot = self.history.snapshot(&self.players);
        self.roster.send_to(&id, &ServerEvent::History(snapshot));
        info!(conn_id = %id, connections = self.roster.len(), "connection accepted");
    }

    /// Interpret one inbound text frame from `id`.
    ///
    /// Undecodable frames and events that do not fit the session state are
    /// dropped. Rejected requests get a private `error` event.
    pub fn handle_frame(&mut self, id: &ConnectionId, raw: &str) {
        let event = match ClientEvent::decode(raw) {
            Ok(event) => event,
            Err(e) => {
                debug!(conn_id = %id, error = %e, "dropping undecodable frame");
                return;
            }
        };
        let Some(member) = self.roster.get(id) else {
            warn!(conn_id = %id, "frame from unknown connection");
            return;
        };
        if !member.session.accepts(&event) {
            debug!(conn_id = %id, event = event.name(), "ignoring event in current state");
            return;
        }
        let player = member.session.player().cloned();

        let result = match (event, player) {
            (ClientEvent::Login { username }, None) => self.login(id, &username),
            (ClientEvent::Chat { message }, Some(player)) => self.chat(player, &message),
            (ClientEvent::Roll { dim, count }, Some(player)) => self.roll(player, dim, count),
            _ => Ok(()),
        };

        if let Err(err) = result {
            info!(conn_id = %id, code = err.code(), error = %err, "request rejected");
            self.roster
                .send_to(id, &ServerEvent::Error(ErrorNotice::from(&err)));
        }
    }

    /// Drop a connection and release whatever its session held.
    pub fn close(&mut self, id: &ConnectionId) {
        let Some(member) = self.roster.unregister(id) else {
            debug!(conn_id = %id, "close for unknown connection");
            return;
        };
        let Some(player) = member.session.close() else {
            info!(conn_id = %id, "anonymous connection closed");
            return;
        };

        self.players.remove(&player.username);
        if !self.colors.release(player.color.clone()) {
            warn!(color = %player.color, "released color was not checked out");
        }
        info!(conn_id = %id, username = %player.username, "user logged out");
        self.roster.broadcast(&ServerEvent::LoggedOut {
            username: player.username,
        });
    }

    pub fn stats(&self) -> RoomStats {
        RoomStats {
            connections: self.roster.len(),
            players: self.players.len(),
            history_len: self.history.len(),
            colors_available: self.colors.available(),
        }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn players(&self) -> &PlayersRegistry {
        &self.players
    }

    pub fn colors(&self) -> &ColorPool {
        &self.colors
    }

    fn login(&mut self, id: &ConnectionId, requested: &str) -> Result<(), RoomError> {
        let trimmed = requested.trim();
        if trimmed.is_empty() {
            return Err(RoomError::InvalidUsername("username is empty".into()));
        }
        let len = trimmed.chars().count();
        if len > self.max_username_len {
            return Err(RoomError::InvalidUsername(format!(
                "username is {len} characters, limit is {}",
                self.max_username_len
            )));
        }
        let username = escape_html(trimmed);
        if self.players.contains(&username) {
            return Err(RoomError::UsernameTaken(username));
        }
        let color = self.colors.checkout()?;
        let player = Player { username, color };

        let Some(member) = self.roster.get_mut(id) else {
            self.colors.release(player.color);
            return Ok(());
        };
        member.session.authenticate(player.clone());
        self.players.insert(player.clone());

        info!(
            conn_id = %id,
            username = %player.username,
            color = %player.color,
            "user logged in"
        );
        self.roster.send_to(id, &ServerEvent::Auth(player.clone()));
        self.roster.broadcast(&ServerEvent::LoggedIn(player));
        Ok(())
    }

    fn chat(&mut self, player: Player, message: &str) -> Result<(), RoomError> {
        let len = message.chars().count();
        if len > self.max_message_len {
            return Err(RoomError::MessageTooLong {
                len,
                max: self.max_message_len,
            });
        }
        debug!(author = %player.username, len, "chat message");
        self.publish(HistoryEntry::Chat(ChatEntry {
            time: now_millis(),
            message: escape_html(message),
            author: player.username,
            color: player.color,
        }));
        Ok(())
    }

    fn roll(&mut self, player: Player, dim: i64, count: i64) -> Result<(), RoomError> {
        let roll = self.dice.roll(dim, count)?;
        debug!(author = %player.username, dim = roll.dim, count = roll.count, "dice roll");
        self.publish(HistoryEntry::Roll(RollEntry {
            time: now_millis(),
            dim: roll.dim,
            count: roll.count,
            rolls: roll.rolls,
            author: player.username,
            color: player.color,
        }));
        Ok(())
    }

    fn publish(&mut self, entry: HistoryEntry) {
        self.history.append(entry.clone());
        self.roster.broadcast(&ServerEvent::Entry(entry));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    struct Client {
        id: ConnectionId,
        rx: mpsc::Receiver<Arc<str>>,
    }

    impl Client {
        fn drain(&mut self) -> Vec<Value> {
            let mut out = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                out.push(serde_json::from_str(&frame).unwrap());
            }
            out
        }

        fn next(&mut self) -> Value {
            let frame = self.rx.try_recv().expect("expected a queued frame");
            serde_json::from_str(&frame).unwrap()
        }
    }

    fn connect(room: &mut ChatRoom, id: &str) -> Client {
        let (tx, rx) = mpsc::channel(64);
        let id = ConnectionId::from_raw(id);
        room.accept(Arc::new(ClientConnection::new(id.clone(), tx)));
        Client { id, rx }
    }

    fn send(room: &mut ChatRoom, client: &Client, frame: Value) {
        room.handle_frame(&client.id, &frame.to_string());
    }

    fn login(room: &mut ChatRoom, client: &Client, name: &str) {
        send(room, client, json!({"event": "login", "data": {"username": name}}));
    }

    fn small_palette(colors: &[&str]) -> RoomConfig {
        RoomConfig {
            palette: colors.iter().map(|c| Color::new(*c)).collect(),
            ..RoomConfig::default()
        }
    }

    #[test]
    fn two_clients_login_chat_and_disconnect() {
        let mut room = ChatRoom::seeded(RoomConfig::default(), 7);

        let mut a = connect(&mut room, "a");
        assert_eq!(
            a.next(),
            json!({"event": "history", "data": {"messages": [], "players": {}}})
        );

        login(&mut room, &a, "alice");
        let auth = a.next();
        assert_eq!(auth["event"], "auth");
        assert_eq!(auth["data"]["username"], "alice");
        let c1 = auth["data"]["color"].clone();
        assert_eq!(
            a.next(),
            json!({"event": "logged_in", "data": {"username": "alice", "color": c1}})
        );

        let mut b = connect(&mut room, "b");
        assert_eq!(
            b.next(),
            json!({"event": "history", "data": {
                "messages": [],
                "players": {"alice": {"username": "alice", "color": c1}}
            }})
        );

        login(&mut room, &b, "bob");
        assert_eq!(b.next()["event"], "auth");
        let joined_b = b.next();
        let joined_a = a.next();
        assert_eq!(joined_a, joined_b);
        assert_eq!(joined_a["event"], "logged_in");
        assert_eq!(joined_a["data"]["username"], "bob");
        let c2 = joined_a["data"]["color"].clone();
        assert_ne!(c1, c2);

        send(&mut room, &a, json!({"event": "chat", "data": {"message": "<b>hi</b>"}}));
        for client in [&mut a, &mut b] {
            let chat = client.next();
            assert_eq!(chat["event"], "chat");
            assert_eq!(chat["data"]["event"], "chat");
            assert_eq!(chat["data"]["message"], "&lt;b&gt;hi&lt;/b&gt;");
            assert_eq!(chat["data"]["author"], "alice");
            assert_eq!(chat["data"]["color"], c1);
            assert!(chat["data"]["time"].as_i64().unwrap() > 0);
        }

        let c2 = Color::new(c2.as_str().unwrap());
        assert!(!room.colors().is_available(&c2));
        room.close(&b.id);
        assert_eq!(
            a.drain(),
            vec![json!({"event": "logged_out", "data": {"username": "bob"}})]
        );
        assert!(room.colors().is_available(&c2));
        assert!(!room.players().contains("bob"));
        assert_eq!(room.history().len(), 1);
    }

    #[test]
    fn chat_and_roll_ignored_before_login() {
        let mut room = ChatRoom::seeded(RoomConfig::default(), 1);
        let mut a = connect(&mut room, "a");
        let mut watcher = connect(&mut room, "w");
        a.drain();
        watcher.drain();

        send(&mut room, &a, json!({"event": "chat", "data": {"message": "hi"}}));
        send(&mut room, &a, json!({"event": "roll", "data": {"dim": 6, "count": 2}}));
        assert!(a.drain().is_empty());
        assert!(watcher.drain().is_empty());
        assert!(room.history().is_empty());
    }

    #[test]
    fn malformed_and_unknown_frames_are_ignored() {
        let mut room = ChatRoom::seeded(RoomConfig::default(), 1);
        let mut a = connect(&mut room, "a");
        a.drain();

        room.handle_frame(&a.id, "not json");
        room.handle_frame(&a.id, r#"{"event":"dance","data":{}}"#);
        room.handle_frame(&a.id, r#"{"event":"login","data":{"name":"x"}}"#);
        assert!(a.drain().is_empty());
        assert_eq!(room.stats().players, 0);
    }

    #[test]
    fn second_login_is_ignored() {
        let mut room = ChatRoom::seeded(RoomConfig::default(), 1);
        let mut a = connect(&mut room, "a");
        login(&mut room, &a, "alice");
        a.drain();

        login(&mut room, &a, "mallory");
        assert!(a.drain().is_empty());
        assert!(room.players().contains("alice"));
        assert!(!room.players().contains("mallory"));
    }

    #[test]
    fn duplicate_username_is_rejected_privately() {
        let mut room = ChatRoom::seeded(RoomConfig::default(), 1);
        let mut a = connect(&mut room, "a");
        let mut b = connect(&mut room, "b");
        login(&mut room, &a, "alice");
        a.drain();
        b.drain();

        login(&mut room, &b, "  alice ");
        let err = b.next();
        assert_eq!(err["event"], "error");
        assert_eq!(err["data"]["code"], "username_taken");
        assert!(a.drain().is_empty());
        assert_eq!(room.colors().held(), 1);

        // rejected login leaves the session anonymous
        login(&mut room, &b, "bob");
        assert_eq!(b.next()["event"], "auth");
    }

    #[test]
    fn invalid_usernames_are_rejected() {
        let config = RoomConfig {
            max_username_len: 5,
            ..RoomConfig::default()
        };
        let mut room = ChatRoom::seeded(config, 1);
        let mut a = connect(&mut room, "a");
        a.drain();

        login(&mut room, &a, "   ");
        assert_eq!(a.next()["data"]["code"], "invalid_username");
        login(&mut room, &a, "abcdef");
        assert_eq!(a.next()["data"]["code"], "invalid_username");
        login(&mut room, &a, " abcde ");
        assert_eq!(a.next()["data"]["username"], "abcde");
    }

    #[test]
    fn username_is_escaped() {
        let mut room = ChatRoom::seeded(RoomConfig::default(), 1);
        let mut a = connect(&mut room, "a");
        a.drain();
        login(&mut room, &a, "<i>x</i>");
        assert_eq!(a.next()["data"]["username"], "&lt;i&gt;x&lt;/i&gt;");
        assert!(room.players().contains("&lt;i&gt;x&lt;/i&gt;"));
    }

    #[test]
    fn login_rejected_when_colors_run_out() {
        let mut room = ChatRoom::seeded(small_palette(&["#111111"]), 1);
        let mut a = connect(&mut room, "a");
        let mut b = connect(&mut room, "b");
        login(&mut room, &a, "alice");
        a.drain();
        b.drain();

        login(&mut room, &b, "bob");
        assert_eq!(b.next()["data"]["code"], "room_full");
        assert!(a.drain().is_empty());

        room.close(&a.id);
        b.drain();
        login(&mut room, &b, "bob");
        let auth = b.next();
        assert_eq!(auth["event"], "auth");
        assert_eq!(auth["data"]["color"], "#111111");
    }

    #[test]
    fn roll_is_broadcast_and_recorded() {
        let mut room = ChatRoom::seeded(RoomConfig::default(), 3);
        let mut a = connect(&mut room, "a");
        let mut b = connect(&mut room, "b");
        login(&mut room, &a, "alice");
        a.drain();
        b.drain();

        send(&mut room, &a, json!({"event": "roll", "data": {"dim": 6, "count": 3}}));
        let roll_a = a.next();
        assert_eq!(roll_a, b.next());
        assert_eq!(roll_a["event"], "roll");
        let data = &roll_a["data"];
        assert_eq!(data["event"], "roll");
        assert_eq!(data["dim"], 6);
        assert_eq!(data["count"], 3);
        assert_eq!(data["author"], "alice");
        let rolls = data["rolls"].as_array().unwrap();
        assert_eq!(rolls.len(), 3);
        assert!(rolls.iter().all(|r| (1..=6).contains(&r.as_u64().unwrap())));
        assert_eq!(room.history().len(), 1);
    }

    #[test]
    fn invalid_roll_is_rejected_privately() {
        let mut room = ChatRoom::seeded(RoomConfig::default(), 3);
        let mut a = connect(&mut room, "a");
        let mut b = connect(&mut room, "b");
        login(&mut room, &a, "alice");
        a.drain();
        b.drain();

        for (dim, count) in [(0, 1), (6, 0), (-4, 2), (6, 1_000_000)] {
            send(&mut room, &a, json!({"event": "roll", "data": {"dim": dim, "count": count}}));
            assert_eq!(a.next()["data"]["code"], "invalid_roll");
        }
        assert!(b.drain().is_empty());
        assert!(room.history().is_empty());
    }

    #[test]
    fn long_chat_is_rejected() {
        let config = RoomConfig {
            max_message_len: 4,
            ..RoomConfig::default()
        };
        let mut room = ChatRoom::seeded(config, 1);
        let mut a = connect(&mut room, "a");
        login(&mut room, &a, "alice");
        a.drain();

        send(&mut room, &a, json!({"event": "chat", "data": {"message": "hello"}}));
        assert_eq!(a.next()["data"]["code"], "message_too_long");
        send(&mut room, &a, json!({"event": "chat", "data": {"message": "hey"}}));
        assert_eq!(a.next()["data"]["message"], "hey");
    }

    #[test]
    fn history_keeps_most_recent_entries() {
        let config = RoomConfig {
            history_capacity: 3,
            ..RoomConfig::default()
        };
        let mut room = ChatRoom::seeded(config, 1);
        let a = connect(&mut room, "a");
        login(&mut room, &a, "alice");
        for i in 0..5 {
            send(&mut room, &a, json!({"event": "chat", "data": {"message": format!("m{i}")}}));
        }
        let messages: Vec<String> = room
            .history()
            .iter()
            .map(|e| match e {
                HistoryEntry::Chat(c) => c.message.clone(),
                HistoryEntry::Roll(_) => unreachable!(),
            })
            .collect();
        assert_eq!(messages, vec!["m2", "m3", "m4"]);

        let mut late = connect(&mut room, "late");
        let history = late.next();
        assert_eq!(history["data"]["messages"].as_array().unwrap().len(), 3);
        assert_eq!(history["data"]["messages"][0]["data"]["message"], "m2");
    }

    #[test]
    fn anonymous_disconnect_broadcasts_nothing() {
        let mut room = ChatRoom::seeded(RoomConfig::default(), 1);
        let mut a = connect(&mut room, "a");
        let b = connect(&mut room, "b");
        a.drain();
        room.close(&b.id);
        room.close(&b.id);
        assert!(a.drain().is_empty());
        assert_eq!(room.stats().connections, 1);
    }

    #[test]
    fn colors_are_conserved_across_churn() {
        let config = RoomConfig::default();
        let total = config.palette.len();
        let mut room = ChatRoom::seeded(config, 11);
        let mut clients = Vec::new();
        for round in 0..4 {
            for i in 0..4 {
                let c = connect(&mut room, &format!("c{round}-{i}"));
                login(&mut room, &c, &format!("user{round}-{i}"));
                clients.push(c);
            }
            let stats = room.stats();
            assert_eq!(stats.players + stats.colors_available, total);
            for c in clients.drain(..2) {
                room.close(&c.id);
            }
            let stats = room.stats();
            assert_eq!(stats.players + stats.colors_available, total);
        }

        let mut held: Vec<&str> = room.players().iter().map(|p| p.color.as_str()).collect();
        held.sort_unstable();
        held.dedup();
        assert_eq!(held.len(), room.players().len());
    }

    #[test]
    fn stats_reflect_room_state() {
        let mut room = ChatRoom::seeded(RoomConfig::default(), 1);
        assert_eq!(
            room.stats(),
            RoomStats {
                connections: 0,
                players: 0,
                history_len: 0,
                colors_available: 6,
            }
        );
        let a = connect(&mut room, "a");
        let _b = connect(&mut room, "b");
        login(&mut room, &a, "alice");
        send(&mut room, &a, json!({"event": "chat", "data": {"message": "x"}}));
        assert_eq!(
            room.stats(),
            RoomStats {
                connections: 2,
                players: 1,
                history_len: 1,
                colors_available: 5,
            }
        );
    }

    #[test]
    fn config_from_settings() {
        let mut settings = ChatSettings::default();
        settings.room.history_capacity = 12;
        settings.room.palette = vec!["#000001".into(), "#000002".into()];
        settings.room.max_roll_sides = 20;
        settings.server.max_dropped_messages = 3;
        let config = RoomConfig::from(&settings);
        assert_eq!(config.history_capacity, 12);
        assert_eq!(config.palette, vec![Color::new("#000001"), Color::new("#000002")]);
        assert_eq!(config.roll_limits.max_sides, 20);
        assert_eq!(config.max_dropped_messages, 3);
    }
}
