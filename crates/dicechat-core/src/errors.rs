/// Rejected roll parameters.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DiceError {
    #[error("die must have between 1 and {max} sides, got {dim}")]
    InvalidSides { dim: i64, max: u32 },
    #[error("roll count must be between 1 and {max}, got {count}")]
    InvalidCount { count: i64, max: u32 },
}

/// Reasons the room refuses a client request.
///
/// Every variant is reported privately to the requesting session as an
/// `error` event carrying [`RoomError::code`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("invalid username: {0}")]
    InvalidUsername(String),
    #[error("username {0:?} is already in use")]
    UsernameTaken(String),
    #[error("room is full, no identity colors left")]
    RoomFull,
    #[error("invalid roll: {0}")]
    InvalidRoll(#[from] DiceError),
    #[error("message is {len} characters, limit is {max}")]
    MessageTooLong { len: usize, max: usize },
}

impl RoomError {
    /// Stable machine-readable code sent on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidUsername(_) => "invalid_username",
            Self::UsernameTaken(_) => "username_taken",
            Self::RoomFull => "room_full",
            Self::InvalidRoll(_) => "invalid_roll",
            Self::MessageTooLong { .. } => "message_too_long",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(RoomError::InvalidUsername("empty".into()).code(), "invalid_username");
        assert_eq!(RoomError::UsernameTaken("bob".into()).code(), "username_taken");
        assert_eq!(RoomError::RoomFull.code(), "room_full");
        assert_eq!(
            RoomError::MessageTooLong { len: 10, max: 5 }.code(),
            "message_too_long"
        );
    }

    #[test]
    fn dice_error_converts() {
        let err: RoomError = DiceError::InvalidSides { dim: 0, max: 100 }.into();
        assert_eq!(err.code(), "invalid_roll");
        assert_eq!(
            err.to_string(),
            "invalid roll: die must have between 1 and 100 sides, got 0"
        );
    }
}
