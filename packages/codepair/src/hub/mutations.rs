//! Mutation Handlers
//!
//! Content and mode edits: validate, apply to the store, fan out. A rejected
//! edit leaves the store untouched and broadcasts nothing.

use tracing::{debug, warn};

use super::engine::SessionHub;
use super::router::Delivery;
use crate::error::HubError;

impl SessionHub {
    /// Apply a content edit from `connection_id` and relay it to the other
    /// participants.
    pub fn content_change(
        &mut self,
        connection_id: &str,
        session_id: &str,
        content: String,
    ) -> Result<Delivery, HubError> {
        if content.len() > self.limits.max_content_bytes {
            return Err(self.invalid(
                connection_id,
                format!(
                    "content of {} bytes exceeds limit of {}",
                    content.len(),
                    self.limits.max_content_bytes
                ),
            ));
        }
        self.check_member(connection_id, session_id)?;

        self.store.mutate_content(session_id, content.clone())?;
        let delivery = self
            .router
            .fan_out_content(session_id, connection_id, &content);
        debug!(
            session = %session_id,
            conn_id = %connection_id,
            "Content updated ({} bytes, {} recipients, {} dropped)",
            content.len(),
            delivery.delivered,
            delivery.failed
        );
        Ok(delivery)
    }

    /// Apply a mode switch and relay it to every participant, sender included.
    pub fn mode_change(
        &mut self,
        connection_id: &str,
        session_id: &str,
        mode: String,
    ) -> Result<Delivery, HubError> {
        let mode = mode.trim().to_string();
        if mode.is_empty() {
            return Err(self.invalid(connection_id, "mode must not be empty".to_string()));
        }
        if mode.chars().count() > self.limits.max_mode_len {
            return Err(self.invalid(
                connection_id,
                format!("mode longer than {} characters", self.limits.max_mode_len),
            ));
        }
        self.check_member(connection_id, session_id)?;

        self.store.mutate_mode(session_id, mode.clone())?;
        let delivery = self.router.fan_out_mode(session_id, &mode);
        debug!(
            session = %session_id,
            conn_id = %connection_id,
            "Mode switched to {} ({} recipients, {} dropped)",
            mode,
            delivery.delivered,
            delivery.failed
        );
        Ok(delivery)
    }

    /// Edits are only accepted from connections on the session's roster.
    /// A missing session is dropped quietly; it may have just been reclaimed.
    fn check_member(&self, connection_id: &str, session_id: &str) -> Result<(), HubError> {
        let Some(session) = self.store.session(session_id) else {
            self.metrics.not_found_error();
            debug!(session = %session_id, conn_id = %connection_id, "Edit for unknown session dropped");
            return Err(HubError::SessionNotFound(session_id.to_string()));
        };
        if session.participant(connection_id).is_none() {
            return Err(self.invalid(
                connection_id,
                format!("connection is not a participant of session {}", session_id),
            ));
        }
        Ok(())
    }

    fn invalid(&self, connection_id: &str, reason: String) -> HubError {
        self.metrics.validation_error();
        warn!(conn_id = %connection_id, "Dropping message: {}", reason);
        HubError::Validation(reason)
    }
}
