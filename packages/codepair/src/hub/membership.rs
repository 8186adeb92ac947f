//! Membership Manager
//!
//! Join and leave bookkeeping on top of the session store. A connection may
//! belong to several sessions at once but appears at most once per roster.

use tracing::info;

use super::session::{Participant, SessionId};
use super::store::SessionStore;
use crate::error::HubError;

/// Result of a successful join: everything the joining connection needs to
/// render the session once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub session_id: SessionId,
    pub participant: Participant,
    pub participants: Vec<Participant>,
    pub content: String,
    pub mode: String,
    /// The connection was already on the roster; nothing was appended.
    pub rejoined: bool,
}

/// One roster removal caused by a leave or disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub session_id: SessionId,
    pub participant: Participant,
    /// The roster is empty after this removal.
    pub now_empty: bool,
}

impl SessionStore {
    pub fn join(
        &mut self,
        session_id: &str,
        connection_id: &str,
        requested_name: Option<&str>,
    ) -> Result<JoinOutcome, HubError> {
        let session = self.session_mut(session_id)?;

        let (participant, rejoined) = match session.participant(connection_id).cloned() {
            Some(existing) => (existing, true),
            None => {
                let participant = Participant::new(connection_id, requested_name);
                session.participants.push(participant.clone());
                info!(
                    session = %session_id,
                    "{} joined ({} present)",
                    participant.display_name,
                    session.participants.len()
                );
                (participant, false)
            }
        };

        Ok(JoinOutcome {
            session_id: session.id.clone(),
            participant,
            participants: session.participants.clone(),
            content: session.content.clone(),
            mode: session.mode.clone(),
            rejoined,
        })
    }

    /// Remove a connection from every session it belongs to.
    pub fn leave(&mut self, connection_id: &str) -> Vec<Departure> {
        let mut departures = Vec::new();
        for session in self.sessions_mut() {
            if let Some(idx) = session
                .participants
                .iter()
                .position(|p| p.connection_id == connection_id)
            {
                let participant = session.participants.remove(idx);
                info!(
                    session = %session.id,
                    "{} left ({} remaining)",
                    participant.display_name,
                    session.participants.len()
                );
                departures.push(Departure {
                    session_id: session.id.clone(),
                    participant,
                    now_empty: session.participants.is_empty(),
                });
            }
        }
        departures
    }

    /// Remove a connection from one session only.
    pub fn leave_session(&mut self, session_id: &str, connection_id: &str) -> Option<Departure> {
        let session = self.session_mut(session_id).ok()?;
        let idx = session
            .participants
            .iter()
            .position(|p| p.connection_id == connection_id)?;
        let participant = session.participants.remove(idx);
        info!(
            session = %session_id,
            "{} left ({} remaining)",
            participant.display_name,
            session.participants.len()
        );
        Some(Departure {
            session_id: session.id.clone(),
            participant,
            now_empty: session.participants.is_empty(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn names(outcome: &JoinOutcome) -> Vec<&str> {
        outcome
            .participants
            .iter()
            .map(|p| p.display_name.as_str())
            .collect()
    }

    #[test]
    fn test_join_appends_in_order() {
        let mut store = SessionStore::default();
        let id = store.create().id;

        store.join(&id, "conn-a", Some("Alice")).unwrap();
        let outcome = store.join(&id, "conn-b", Some("Bob")).unwrap();

        assert_eq!(names(&outcome), vec!["Alice", "Bob"]);
        assert_eq!(outcome.participant.display_name, "Bob");
        assert!(!outcome.rejoined);
    }

    #[test]
    fn test_join_returns_current_state() {
        let mut store = SessionStore::default();
        let id = store.create().id;
        store.mutate_content(&id, "x = 1".into()).unwrap();
        store.mutate_mode(&id, "python".into()).unwrap();

        let outcome = store.join(&id, "conn-a", None).unwrap();
        assert_eq!(outcome.content, "x = 1");
        assert_eq!(outcome.mode, "python");
        assert_eq!(outcome.participant.display_name, "User-conn-");
    }

    #[test]
    fn test_join_missing_session_has_no_side_effect() {
        let mut store = SessionStore::default();
        let result = store.join("missing", "conn-a", Some("Alice"));
        assert_eq!(result, Err(HubError::SessionNotFound("missing".into())));
        assert!(store.is_empty());
    }

    #[test]
    fn test_rejoin_does_not_duplicate() {
        let mut store = SessionStore::default();
        let id = store.create().id;

        store.join(&id, "conn-a", Some("Alice")).unwrap();
        let outcome = store.join(&id, "conn-a", Some("Renamed")).unwrap();

        assert!(outcome.rejoined);
        assert_eq!(outcome.participants.len(), 1);
        // Display name is fixed for the lifetime of the join.
        assert_eq!(outcome.participant.display_name, "Alice");
    }

    #[test]
    fn test_leave_removes_from_all_sessions() {
        let mut store = SessionStore::default();
        let s1 = store.create().id;
        let s2 = store.create().id;
        let s3 = store.create().id;

        store.join(&s1, "conn-a", Some("Alice")).unwrap();
        store.join(&s2, "conn-a", Some("Alice")).unwrap();
        store.join(&s2, "conn-b", Some("Bob")).unwrap();
        store.join(&s3, "conn-b", Some("Bob")).unwrap();

        let departures = store.leave("conn-a");
        assert_eq!(departures.len(), 2);

        let affected: HashSet<_> = departures.iter().map(|d| d.session_id.clone()).collect();
        assert_eq!(affected, HashSet::from([s1.clone(), s2.clone()]));

        for d in &departures {
            assert_eq!(d.participant.connection_id, "conn-a");
            if d.session_id == s1 {
                assert!(d.now_empty);
            } else {
                assert!(!d.now_empty);
            }
        }
        assert_eq!(store.get(&s2).unwrap().participants.len(), 1);
        assert_eq!(store.get(&s3).unwrap().participants.len(), 1);
    }

    #[test]
    fn test_leave_unknown_connection_is_noop() {
        let mut store = SessionStore::default();
        let id = store.create().id;
        store.join(&id, "conn-a", Some("Alice")).unwrap();

        assert!(store.leave("conn-zzz").is_empty());
        assert_eq!(store.get(&id).unwrap().participants.len(), 1);
    }

    #[test]
    fn test_leave_twice_is_idempotent() {
        let mut store = SessionStore::default();
        let id = store.create().id;
        store.join(&id, "conn-a", Some("Alice")).unwrap();

        assert_eq!(store.leave("conn-a").len(), 1);
        assert!(store.leave("conn-a").is_empty());
    }

    #[test]
    fn test_leave_session_only_touches_one_session() {
        let mut store = SessionStore::default();
        let s1 = store.create().id;
        let s2 = store.create().id;
        store.join(&s1, "conn-a", Some("Alice")).unwrap();
        store.join(&s2, "conn-a", Some("Alice")).unwrap();

        let departure = store.leave_session(&s1, "conn-a").unwrap();
        assert!(departure.now_empty);
        assert!(store.get(&s1).unwrap().participants.is_empty());
        assert_eq!(store.get(&s2).unwrap().participants.len(), 1);

        assert!(store.leave_session(&s1, "conn-a").is_none());
        assert!(store.leave_session("missing", "conn-a").is_none());
    }

    #[test]
    fn test_roster_never_holds_duplicates() {
        let mut store = SessionStore::default();
        let id = store.create().id;
        let ops: [(&str, bool); 8] = [
            ("a", true),
            ("b", true),
            ("a", true),
            ("a", false),
            ("a", true),
            ("b", true),
            ("c", true),
            ("b", false),
        ];
        for (conn, join) in ops {
            if join {
                store.join(&id, conn, None).unwrap();
            } else {
                store.leave(conn);
            }
            let roster = store.get(&id).unwrap().participants;
            let unique: HashSet<_> = roster.iter().map(|p| &p.connection_id).collect();
            assert_eq!(unique.len(), roster.len());
        }
    }
}
