//! Session data model
//!
//! A session is one shared document plus the roster of connections editing it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a live transport connection.
pub type ConnectionId = String;

/// Identifier of a session (also the room key on the transport).
pub type SessionId = String;

/// Number of connection-id characters used in a generated display name.
const FALLBACK_NAME_PREFIX_LEN: usize = 5;

/// One connection's membership record within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub display_name: String,
}

impl Participant {
    /// Build a participant, falling back to `User-<prefix>` when the requested
    /// name is missing or blank.
    pub fn new(connection_id: &str, requested_name: Option<&str>) -> Self {
        let display_name = requested_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| fallback_display_name(connection_id));
        Self {
            connection_id: connection_id.to_string(),
            display_name,
        }
    }
}

/// Stable generated label for a connection that did not supply a name.
pub fn fallback_display_name(connection_id: &str) -> String {
    let prefix: String = connection_id
        .chars()
        .take(FALLBACK_NAME_PREFIX_LEN)
        .collect();
    format!("User-{}", prefix)
}

/// Authoritative session record, owned by the session store.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub content: String,
    pub mode: String,
    pub created_at: DateTime<Utc>,
    /// Join order; never holds two entries for the same connection.
    pub participants: Vec<Participant>,
}

impl Session {
    pub fn new(id: SessionId, content: String, mode: String) -> Self {
        Self {
            id,
            content,
            mode,
            created_at: Utc::now(),
            participants: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn participant(&self, connection_id: &str) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.connection_id == connection_id)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            content: self.content.clone(),
            mode: self.mode.clone(),
            created_at: self.created_at,
            participants: self.participants.clone(),
        }
    }
}

/// Point-in-time copy of a session handed out to callers outside the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub content: String,
    pub mode: String,
    pub created_at: DateTime<Utc>,
    pub participants: Vec<Participant>,
}
