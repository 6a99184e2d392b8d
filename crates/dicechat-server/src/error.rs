/// Server-level failures.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The room dispatcher has stopped and no longer accepts commands.
    #[error("room dispatcher is not running")]
    RoomClosed,
}
