//! Session WebSocket
//!
//! Wire protocol and per-connection handler for the real-time channel.

mod handler;
mod protocol;

pub use handler::handle_session_ws;
pub use protocol::ServerMessage;

#[cfg(test)]
pub use protocol::ClientMessage;
