//! WebSocket Protocol Types
//!
//! Message types for client-server communication over the session WebSocket.
//! Every frame is a JSON text frame tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::hub::Participant;

/// Messages sent FROM the client TO the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Join a session; the roster gets a new participant for this connection.
    Join {
        session_id: String,
        /// Falls back to `User-<prefix of connection id>` when absent or blank
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },

    /// Replace the shared document text.
    ContentChange { session_id: String, content: String },

    /// Switch the session's mode selector (editor language).
    ModeChange { session_id: String, mode: String },

    /// Leave one session without disconnecting.
    Leave { session_id: String },

    /// Keepalive
    Ping,
}

impl ClientMessage {
    /// Session the message is addressed to, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            ClientMessage::Join { session_id, .. }
            | ClientMessage::ContentChange { session_id, .. }
            | ClientMessage::ModeChange { session_id, .. }
            | ClientMessage::Leave { session_id } => Some(session_id),
            ClientMessage::Ping => None,
        }
    }
}

/// Messages sent FROM the server TO the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// First frame on every connection.
    Connected { connection_id: String },

    /// A participant joined; carries the full roster in join order.
    Joined {
        session_id: String,
        participant: Participant,
        participants: Vec<Participant>,
    },

    /// Current document state, sent privately to a connection after it joins.
    SessionState {
        session_id: String,
        content: String,
        mode: String,
    },

    /// A participant left the session.
    Left {
        session_id: String,
        connection_id: String,
    },

    ContentChanged { session_id: String, content: String },

    ModeChanged { session_id: String, mode: String },

    /// A request from this connection could not be served.
    SessionError { reason: String },

    Pong,
}
