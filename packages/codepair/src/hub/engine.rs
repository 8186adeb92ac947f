//! Session hub core
//!
//! `SessionHub` ties the store, membership, routing and deferred cleanup
//! together. Every method is synchronous and takes `&mut self`; the hub actor
//! is the only owner, which serializes all access.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::cleanup::CleanupQueue;
use super::membership::{Departure, JoinOutcome};
use super::router::{BroadcastRouter, ChannelTransport, Outbox, RoomTransport};
use super::session::{SessionId, SessionSnapshot};
use super::store::{SessionDefaults, SessionStore};
use crate::error::HubError;
use crate::metrics::ServerMetrics;
use crate::ws::ServerMessage;

/// Bounds applied to incoming mutations.
#[derive(Debug, Clone)]
pub struct HubLimits {
    pub max_content_bytes: usize,
    pub max_mode_len: usize,
}

impl Default for HubLimits {
    fn default() -> Self {
        Self {
            max_content_bytes: 1024 * 1024,
            max_mode_len: 64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub defaults: SessionDefaults,
    /// How long an empty session survives before it is reclaimed
    pub grace_period: Duration,
    pub limits: HubLimits,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            defaults: SessionDefaults::default(),
            grace_period: Duration::from_secs(3600),
            limits: HubLimits::default(),
        }
    }
}

/// Point-in-time counters for health reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub sessions: usize,
    pub connections: usize,
    pub pending_cleanup: usize,
}

pub struct SessionHub {
    pub(super) store: SessionStore,
    pub(super) cleanup: CleanupQueue,
    pub(super) router: BroadcastRouter<ChannelTransport>,
    pub(super) limits: HubLimits,
    pub(super) metrics: Arc<ServerMetrics>,
}

impl SessionHub {
    pub fn new(config: HubConfig, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            store: SessionStore::new(config.defaults),
            cleanup: CleanupQueue::new(config.grace_period),
            router: BroadcastRouter::new(ChannelTransport::new(Some(metrics.clone()))),
            limits: config.limits,
            metrics,
        }
    }

    pub fn create_session(&mut self) -> SessionSnapshot {
        let snapshot = self.store.create();
        self.metrics.session_created();
        info!(session = %snapshot.id, "Session created");
        snapshot
    }

    pub fn get_session(&self, session_id: &str) -> Result<SessionSnapshot, HubError> {
        self.store.get(session_id)
    }

    /// Register a connection's outbox and greet it with its id.
    pub fn connect(&mut self, connection_id: &str, outbox: Outbox) {
        let transport = self.router.transport_mut();
        transport.register(connection_id, outbox);
        transport.send_to(
            connection_id,
            ServerMessage::Connected {
                connection_id: connection_id.to_string(),
            },
        );
        debug!(conn_id = %connection_id, "Connection registered");
    }

    pub fn join(
        &mut self,
        connection_id: &str,
        session_id: &str,
        display_name: Option<&str>,
    ) -> Result<JoinOutcome, HubError> {
        let outcome = match self.store.join(session_id, connection_id, display_name) {
            Ok(outcome) => outcome,
            Err(e) => {
                if matches!(e, HubError::SessionNotFound(_)) {
                    self.metrics.not_found_error();
                }
                debug!(conn_id = %connection_id, session = %session_id, "Join rejected: {}", e);
                self.router.reject(connection_id, e.to_string());
                return Err(e);
            }
        };

        if outcome.rejoined {
            self.router.resend_join(connection_id, &outcome);
        } else {
            self.router.announce_join(connection_id, &outcome);
        }
        Ok(outcome)
    }

    /// Explicitly leave one session.
    pub fn leave_session(
        &mut self,
        connection_id: &str,
        session_id: &str,
        now: Instant,
    ) -> Option<Departure> {
        let departure = self.store.leave_session(session_id, connection_id)?;
        self.after_departure(&departure, now);
        Some(departure)
    }

    /// Transport-level disconnect: leave every session, then forget the outbox.
    pub fn disconnect(&mut self, connection_id: &str, now: Instant) -> Vec<Departure> {
        let departures = self.store.leave(connection_id);
        for departure in &departures {
            self.after_departure(departure, now);
        }
        self.router.transport_mut().unregister(connection_id);
        debug!(
            conn_id = %connection_id,
            "Connection removed from {} session(s)",
            departures.len()
        );
        departures
    }

    fn after_departure(&mut self, departure: &Departure, now: Instant) {
        self.router.announce_leave(departure);
        if departure.now_empty && self.cleanup.schedule(&departure.session_id, now).is_some() {
            debug!(
                session = %departure.session_id,
                "Session empty, cleanup check in {:?}",
                self.cleanup.grace()
            );
        }
    }

    /// Reclaim every session whose grace window has passed and that is still
    /// empty right now. Returns the ids actually deleted.
    pub fn reap_due(&mut self, now: Instant) -> Vec<SessionId> {
        let mut reaped = Vec::new();
        for session_id in self.cleanup.pop_due(now) {
            let still_empty = self
                .store
                .session(&session_id)
                .map(|s| s.is_empty())
                .unwrap_or(false);
            if still_empty && self.store.delete(&session_id) {
                self.metrics.session_reaped();
                info!(session = %session_id, "Session removed due to inactivity");
                reaped.push(session_id);
            } else {
                debug!(session = %session_id, "Cleanup skipped, session rejoined or gone");
            }
        }
        reaped
    }

    pub fn next_cleanup(&self) -> Option<Instant> {
        self.cleanup.next_deadline()
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            sessions: self.store.len(),
            connections: self.router.transport().connection_count(),
            pending_cleanup: self.cleanup.pending(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.store.is_empty()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.store.ids()
    }
}
