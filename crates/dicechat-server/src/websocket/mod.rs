//! WebSocket connection handles and the per-connection frame pump.

pub mod connection;
pub mod session;

pub use connection::ClientConnection;
pub use session::{run_ws_session, SessionTimings};
