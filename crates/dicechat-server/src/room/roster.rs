//! Live connections in accept order, and fan-out to them.

use std::sync::Arc;

use dicechat_core::{ConnectionId, ServerEvent};
use tracing::{debug, warn};

use super::session::Session;
use crate::websocket::ClientConnection;

/// One roster slot: the transport handle and its session state.
pub struct Member {
    pub connection: Arc<ClientConnection>,
    pub session: Session,
}

/// Result of one broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    pub recipients: usize,
    pub failed: usize,
}

pub struct Roster {
    members: Vec<Member>,
    /// Close a connection once it has dropped this many messages (0 = never).
    max_dropped_messages: u64,
}

impl Roster {
    pub fn new(max_dropped_messages: u64) -> Self {
        Self {
            members: Vec::new(),
            max_dropped_messages,
        }
    }

    /// Append a connection with a fresh anonymous session. Returns `false`
    /// if its id is already present.
    pub fn register(&mut self, connection: Arc<ClientConnection>) -> bool {
        if self.get(&connection.id).is_some() {
            return false;
        }
        self.members.push(Member {
            connection,
            session: Session::new(),
        });
        true
    }

    /// Remove a connection, keeping the order of the others.
    pub fn unregister(&mut self, id: &ConnectionId) -> Option<Member> {
        let index = self.members.iter().position(|m| &m.connection.id == id)?;
        Some(self.members.remove(index))
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&Member> {
        self.members.iter().find(|m| &m.connection.id == id)
    }

    pub fn get_mut(&mut self, id: &ConnectionId) -> Option<&mut Member> {
        self.members.iter_mut().find(|m| &m.connection.id == id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn authenticated_count(&self) -> usize {
        self.members
            .iter()
            .filter(|m| m.session.is_authenticated())
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    /// Send an event to a single connection.
    pub fn send_to(&self, id: &ConnectionId, event: &ServerEvent) -> bool {
        let Some(member) = self.get(id) else {
            return false;
        };
        match encode(event) {
            Some(payload) => self.deliver(member, payload),
            None => false,
        }
    }

    /// Serialize `event` once and queue it for every member.
    ///
    /// A failed send is logged and skipped; delivery to the others goes on.
    pub fn broadcast(&self, event: &ServerEvent) -> Delivery {
        let Some(payload) = encode(event) else {
            return Delivery::default();
        };
        let mut delivery = Delivery::default();
        for member in &self.members {
            delivery.recipients += 1;
            if !self.deliver(member, Arc::clone(&payload)) {
                delivery.failed += 1;
            }
        }
        debug!(
            event = event.name(),
            recipients = delivery.recipients,
            failed = delivery.failed,
            "broadcast event"
        );
        delivery
    }

    fn deliver(&self, member: &Member, payload: Arc<str>) -> bool {
        let conn = &member.connection;
        if conn.send(payload) {
            return true;
        }
        let dropped = conn.drop_count();
        warn!(conn_id = %conn.id, dropped, "failed to queue message for client");
        if self.max_dropped_messages > 0
            && dropped >= self.max_dropped_messages
            && !conn.is_close_requested()
        {
            warn!(conn_id = %conn.id, dropped, "client keeps dropping messages, closing");
            conn.request_close();
        }
        false
    }
}

fn encode(event: &ServerEvent) -> Option<Arc<str>> {
    match event.to_json() {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            warn!(event = event.name(), error = %e, "failed to serialize event");
            None
        }
    }
}
