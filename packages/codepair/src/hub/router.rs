//! Broadcast Router
//!
//! Decides which connections of a session's room receive an event. Delivery
//! itself goes through a [`RoomTransport`], so the routing rules do not depend
//! on WebSockets or on any particular channel type.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::membership::{Departure, JoinOutcome};
use super::session::ConnectionId;
use crate::metrics::ServerMetrics;
use crate::ws::ServerMessage;

/// Outcome of a fan-out to one room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

/// Group-messaging capability the hub needs from the real-time transport.
pub trait RoomTransport {
    fn join_room(&mut self, room: &str, connection_id: &str);

    fn leave_room(&mut self, room: &str, connection_id: &str);

    /// Deliver to a single connection. Returns false if it could not be queued.
    fn send_to(&mut self, connection_id: &str, msg: ServerMessage) -> bool;

    /// Deliver to every member of `room`, skipping `except` when given.
    /// A failed recipient never stops delivery to the others.
    fn broadcast(&mut self, room: &str, msg: &ServerMessage, except: Option<&str>) -> Delivery;
}

/// Sending half of a connection's outbox.
pub type Outbox = mpsc::Sender<ServerMessage>;

/// [`RoomTransport`] over per-connection bounded mpsc outboxes.
///
/// Sends use `try_send`: a full or closed outbox drops that message for that
/// connection only.
#[derive(Default)]
pub struct ChannelTransport {
    outboxes: HashMap<ConnectionId, Outbox>,
    /// Room members in the order they joined.
    rooms: HashMap<String, Vec<ConnectionId>>,
    metrics: Option<Arc<ServerMetrics>>,
}

impl ChannelTransport {
    pub fn new(metrics: Option<Arc<ServerMetrics>>) -> Self {
        Self {
            outboxes: HashMap::new(),
            rooms: HashMap::new(),
            metrics,
        }
    }

    pub fn register(&mut self, connection_id: &str, outbox: Outbox) {
        self.outboxes.insert(connection_id.to_string(), outbox);
    }

    /// Forget a connection's outbox and drop it from every room.
    pub fn unregister(&mut self, connection_id: &str) {
        self.outboxes.remove(connection_id);
        self.rooms.retain(|_, members| {
            members.retain(|m| m != connection_id);
            !members.is_empty()
        });
    }

    pub fn connection_count(&self) -> usize {
        self.outboxes.len()
    }

    pub fn room_members(&self, room: &str) -> &[ConnectionId] {
        self.rooms.get(room).map(Vec::as_slice).unwrap_or_default()
    }

    fn deliver(&self, connection_id: &str, msg: ServerMessage) -> bool {
        let Some(outbox) = self.outboxes.get(connection_id) else {
            debug!(conn_id = %connection_id, "no outbox registered, dropping message");
            if let Some(m) = &self.metrics {
                m.message_dropped();
            }
            return false;
        };
        match outbox.try_send(msg) {
            Ok(()) => {
                if let Some(m) = &self.metrics {
                    m.message_sent();
                }
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(conn_id = %connection_id, "outbox full, dropping message");
                if let Some(m) = &self.metrics {
                    m.message_dropped();
                }
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(conn_id = %connection_id, "outbox closed, dropping message");
                if let Some(m) = &self.metrics {
                    m.message_dropped();
                }
                false
            }
        }
    }
}

impl RoomTransport for ChannelTransport {
    fn join_room(&mut self, room: &str, connection_id: &str) {
        let members = self.rooms.entry(room.to_string()).or_default();
        if !members.iter().any(|m| m == connection_id) {
            members.push(connection_id.to_string());
        }
    }

    fn leave_room(&mut self, room: &str, connection_id: &str) {
        if let Some(members) = self.rooms.get_mut(room) {
            members.retain(|m| m != connection_id);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }

    fn send_to(&mut self, connection_id: &str, msg: ServerMessage) -> bool {
        self.deliver(connection_id, msg)
    }

    fn broadcast(&mut self, room: &str, msg: &ServerMessage, except: Option<&str>) -> Delivery {
        let mut delivery = Delivery::default();
        for member in self.room_members(room) {
            if Some(member.as_str()) == except {
                continue;
            }
            if self.deliver(member, msg.clone()) {
                delivery.delivered += 1;
            } else {
                delivery.failed += 1;
            }
        }
        delivery
    }
}

/// Routing rules for session events.
pub struct BroadcastRouter<T: RoomTransport> {
    transport: T,
}

impl<T: RoomTransport> BroadcastRouter<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Put the joiner in the room, announce the roster to everyone (joiner
    /// included) and send the current document to the joiner only.
    pub fn announce_join(&mut self, connection_id: &str, outcome: &JoinOutcome) -> Delivery {
        self.transport.join_room(&outcome.session_id, connection_id);
        let delivery = self.transport.broadcast(
            &outcome.session_id,
            &ServerMessage::Joined {
                session_id: outcome.session_id.clone(),
                participant: outcome.participant.clone(),
                participants: outcome.participants.clone(),
            },
            None,
        );
        self.transport.send_to(
            connection_id,
            ServerMessage::SessionState {
                session_id: outcome.session_id.clone(),
                content: outcome.content.clone(),
                mode: outcome.mode.clone(),
            },
        );
        delivery
    }

    /// Re-sync a connection that joined a session it was already part of.
    pub fn resend_join(&mut self, connection_id: &str, outcome: &JoinOutcome) {
        self.transport.join_room(&outcome.session_id, connection_id);
        self.transport.send_to(
            connection_id,
            ServerMessage::Joined {
                session_id: outcome.session_id.clone(),
                participant: outcome.participant.clone(),
                participants: outcome.participants.clone(),
            },
        );
        self.transport.send_to(
            connection_id,
            ServerMessage::SessionState {
                session_id: outcome.session_id.clone(),
                content: outcome.content.clone(),
                mode: outcome.mode.clone(),
            },
        );
    }

    /// Take the departing connection out of the room and tell the rest.
    pub fn announce_leave(&mut self, departure: &Departure) -> Delivery {
        let connection_id = &departure.participant.connection_id;
        self.transport
            .leave_room(&departure.session_id, connection_id);
        self.transport.broadcast(
            &departure.session_id,
            &ServerMessage::Left {
                session_id: departure.session_id.clone(),
                connection_id: connection_id.clone(),
            },
            None,
        )
    }

    /// Content edits skip the sender, who already holds the new text.
    pub fn fan_out_content(&mut self, session_id: &str, sender: &str, content: &str) -> Delivery {
        self.transport.broadcast(
            session_id,
            &ServerMessage::ContentChanged {
                session_id: session_id.to_string(),
                content: content.to_string(),
            },
            Some(sender),
        )
    }

    /// Mode changes go to every member, sender included.
    pub fn fan_out_mode(&mut self, session_id: &str, mode: &str) -> Delivery {
        self.transport.broadcast(
            session_id,
            &ServerMessage::ModeChanged {
                session_id: session_id.to_string(),
                mode: mode.to_string(),
            },
            None,
        )
    }

    pub fn reject(&mut self, connection_id: &str, reason: String) {
        self.transport
            .send_to(connection_id, ServerMessage::SessionError { reason });
    }
}
