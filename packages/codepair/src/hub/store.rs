//! Session Store
//!
//! The single authoritative map of session id to session record. Only the hub
//! actor holds a `SessionStore`, so plain `&mut self` access is enough.

use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use super::session::{Session, SessionId, SessionSnapshot};
use crate::error::HubError;

/// Initial values given to every new session.
#[derive(Debug, Clone)]
pub struct SessionDefaults {
    pub content: String,
    pub mode: String,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            content: "// Write your code here\n".to_string(),
            mode: "javascript".to_string(),
        }
    }
}

pub struct SessionStore {
    sessions: HashMap<SessionId, Session>,
    defaults: SessionDefaults,
}

impl SessionStore {
    pub fn new(defaults: SessionDefaults) -> Self {
        Self {
            sessions: HashMap::new(),
            defaults,
        }
    }

    /// Allocate a new empty session under a freshly generated id.
    pub fn create(&mut self) -> SessionSnapshot {
        let mut id = Uuid::new_v4().to_string();
        while self.sessions.contains_key(&id) {
            id = Uuid::new_v4().to_string();
        }
        let session = Session::new(
            id.clone(),
            self.defaults.content.clone(),
            self.defaults.mode.clone(),
        );
        let snapshot = session.snapshot();
        self.sessions.insert(id, session);
        snapshot
    }

    pub fn get(&self, id: &str) -> Result<SessionSnapshot, HubError> {
        self.sessions
            .get(id)
            .map(Session::snapshot)
            .ok_or_else(|| HubError::SessionNotFound(id.to_string()))
    }

    /// Overwrite the document text. Last write wins.
    pub fn mutate_content(&mut self, id: &str, content: String) -> Result<(), HubError> {
        let session = self.session_mut(id)?;
        session.content = content;
        Ok(())
    }

    /// Overwrite the mode selector. Last write wins.
    pub fn mutate_mode(&mut self, id: &str, mode: String) -> Result<(), HubError> {
        let session = self.session_mut(id)?;
        session.mode = mode;
        Ok(())
    }

    /// Remove a session. Returns false when it was already gone.
    pub fn delete(&mut self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if !removed {
            debug!(session = %id, "delete of unknown session ignored");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.keys().cloned().collect()
    }

    pub(crate) fn session(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub(crate) fn session_mut(&mut self, id: &str) -> Result<&mut Session, HubError> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| HubError::SessionNotFound(id.to_string()))
    }

    pub(crate) fn sessions_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionDefaults::default())
    }
}
