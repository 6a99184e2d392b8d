//! Per-connection authentication state.

use dicechat_core::{ClientEvent, Player};

/// Where a connection is in its login lifecycle. Closing consumes the
/// [`Session`], so there is no explicit closed state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Anonymous,
    Authenticated(Player),
}

#[derive(Debug, Default)]
pub struct Session {
    state: SessionState,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn player(&self) -> Option<&Player> {
        match &self.state {
            SessionState::Anonymous => None,
            SessionState::Authenticated(player) => Some(player),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.player().is_some()
    }

    /// Whether `event` is meaningful in the current state: `login` only
    /// while anonymous, `chat` and `roll` only once authenticated.
    pub fn accepts(&self, event: &ClientEvent) -> bool {
        matches!(
            (&self.state, event),
            (SessionState::Anonymous, ClientEvent::Login { .. })
                | (
                    SessionState::Authenticated(_),
                    ClientEvent::Chat { .. } | ClientEvent::Roll { .. }
                )
        )
    }

    /// Anonymous → Authenticated. The username is fixed for the rest of the
    /// session; a second call returns `false` and changes nothing.
    pub fn authenticate(&mut self, player: Player) -> bool {
        if self.is_authenticated() {
            return false;
        }
        self.state = SessionState::Authenticated(player);
        true
    }

    /// End the session, handing back the player whose resources must be
    /// released.
    pub fn close(self) -> Option<Player> {
        match self.state {
            SessionState::Anonymous => None,
            SessionState::Authenticated(player) => Some(player),
        }
    }
}
