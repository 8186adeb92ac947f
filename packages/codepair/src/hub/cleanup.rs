//! Deferred session cleanup
//!
//! A scheduled-task queue keyed by session id. The queue only remembers
//! deadlines; whether a session is actually reclaimed is decided against the
//! store at fire time, so a rejoin during the grace window needs no explicit
//! cancellation.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use super::session::SessionId;

#[derive(Debug)]
pub struct CleanupQueue {
    grace: Duration,
    deadlines: HashMap<SessionId, Instant>,
    /// Ordered view of `deadlines` for cheap access to the earliest entry.
    order: BTreeSet<(Instant, SessionId)>,
}

impl CleanupQueue {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            deadlines: HashMap::new(),
            order: BTreeSet::new(),
        }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Schedule a check for `session_id` one grace window after `now`.
    /// Scheduling an id that is already queued moves its deadline.
    ///
    /// Returns `None` when the grace window reaches past what the clock can
    /// represent; such a session is kept until shutdown.
    pub fn schedule(&mut self, session_id: &str, now: Instant) -> Option<Instant> {
        if let Some(previous) = self.deadlines.remove(session_id) {
            self.order.remove(&(previous, session_id.to_string()));
        }
        let Some(deadline) = now.checked_add(self.grace) else {
            warn!(
                session = %session_id,
                "Grace period of {:?} overflows the clock, session will not be reclaimed",
                self.grace
            );
            return None;
        };
        self.deadlines.insert(session_id.to_string(), deadline);
        self.order.insert((deadline, session_id.to_string()));
        Some(deadline)
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.order.first().map(|(deadline, _)| *deadline)
    }

    /// Remove and return every entry whose deadline is at or before `now`,
    /// earliest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<SessionId> {
        let mut due = Vec::new();
        while let Some((deadline, _)) = self.order.first() {
            if *deadline > now {
                break;
            }
            if let Some((_, session_id)) = self.order.pop_first() {
                self.deadlines.remove(&session_id);
                due.push(session_id);
            }
        }
        due
    }

    /// Number of sessions waiting for a fire-time check.
    pub fn pending(&self) -> usize {
        self.deadlines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_schedule_sets_deadline_after_grace() {
        let mut queue = CleanupQueue::new(HOUR);
        let now = Instant::now();
        let deadline = queue.schedule("s-1", now);
        assert_eq!(deadline, Some(now + HOUR));
        assert_eq!(queue.next_deadline(), Some(now + HOUR));
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn test_nothing_due_before_deadline() {
        let mut queue = CleanupQueue::new(HOUR);
        let now = Instant::now();
        queue.schedule("s-1", now);

        assert!(queue.pop_due(now + HOUR - Duration::from_secs(1)).is_empty());
        assert_eq!(queue.pending(), 1);
    }

    #[test]
    fn test_pop_due_returns_in_deadline_order() {
        let mut queue = CleanupQueue::new(HOUR);
        let now = Instant::now();
        queue.schedule("late", now + Duration::from_secs(10));
        queue.schedule("early", now);

        let due = queue.pop_due(now + HOUR + Duration::from_secs(10));
        assert_eq!(due, vec!["early".to_string(), "late".to_string()]);
        assert_eq!(queue.pending(), 0);
        assert!(queue.next_deadline().is_none());
    }

    #[test]
    fn test_reschedule_replaces_deadline() {
        let mut queue = CleanupQueue::new(HOUR);
        let now = Instant::now();
        queue.schedule("s-1", now);
        queue.schedule("s-1", now + Duration::from_secs(60));

        assert_eq!(queue.pending(), 1);
        assert!(queue.pop_due(now + HOUR).is_empty());
        assert_eq!(
            queue.pop_due(now + HOUR + Duration::from_secs(60)),
            vec!["s-1".to_string()]
        );
    }

    #[test]
    fn test_unrepresentable_grace_is_never_due() {
        let mut queue = CleanupQueue::new(Duration::from_secs(u64::MAX));
        let now = Instant::now();

        assert_eq!(queue.schedule("s-1", now), None);
        assert_eq!(queue.pending(), 0);
        assert!(queue.next_deadline().is_none());
        assert!(queue.pop_due(now + HOUR).is_empty());
    }
}
