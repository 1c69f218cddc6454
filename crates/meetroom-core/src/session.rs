//! The multi-step booking wizard.
//!
//! Each requester walks a linear flow -- date, then start time, then
//! duration -- with the collected fields riding in the state enum. The
//! registry holds at most one live session per requester; starting a new
//! booking overwrites any session in progress (last write wins), and a
//! step input arriving with no matching session is a no-op so stale
//! interactions can never mutate a finished wizard.
//!
//! Sessions are process-transient: a restart discards every wizard and
//! the requester simply begins again.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{NaiveDate, NaiveTime};

/// Where a requester currently is in the wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingDate,
    AwaitingStartTime { date: NaiveDate },
    AwaitingDuration { date: NaiveDate, start: NaiveTime },
}

/// One requester's in-progress booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingSession {
    pub requester_id: i64,
    pub state: SessionState,
}

/// Process-wide map of live booking sessions, keyed by requester id.
///
/// Constructor-injected wherever it is needed; per-key atomicity comes
/// from the inner mutex and nothing more is guaranteed -- two rapid-fire
/// inputs from the same requester resolve last-write-wins.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<i64, BookingSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) a wizard for the requester, discarding any
    /// session already in progress.
    pub fn begin(&self, requester_id: i64) {
        let mut sessions = self.lock();
        sessions.insert(
            requester_id,
            BookingSession {
                requester_id,
                state: SessionState::AwaitingDate,
            },
        );
    }

    /// Current state of the requester's session, if any.
    pub fn state_of(&self, requester_id: i64) -> Option<SessionState> {
        self.lock().get(&requester_id).map(|s| s.state)
    }

    /// Replace the state of an existing session. No-op when the
    /// requester has none.
    pub fn advance(&self, requester_id: i64, state: SessionState) {
        if let Some(session) = self.lock().get_mut(&requester_id) {
            session.state = state;
        }
    }

    /// Destroy the requester's session, returning it if one existed.
    pub fn remove(&self, requester_id: i64) -> Option<BookingSession> {
        self.lock().remove(&requester_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, BookingSession>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 15).unwrap()
    }

    #[test]
    fn begin_resets_an_existing_session() {
        let registry = SessionRegistry::new();
        registry.begin(1);
        registry.advance(1, SessionState::AwaitingStartTime { date: date() });

        registry.begin(1);
        assert_eq!(registry.state_of(1), Some(SessionState::AwaitingDate));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn advance_without_a_session_is_a_no_op() {
        let registry = SessionRegistry::new();
        registry.advance(1, SessionState::AwaitingStartTime { date: date() });
        assert_eq!(registry.state_of(1), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn sessions_are_per_requester() {
        let registry = SessionRegistry::new();
        registry.begin(1);
        registry.begin(2);
        registry.advance(2, SessionState::AwaitingStartTime { date: date() });

        assert_eq!(registry.state_of(1), Some(SessionState::AwaitingDate));
        assert!(matches!(
            registry.state_of(2),
            Some(SessionState::AwaitingStartTime { .. })
        ));

        let removed = registry.remove(2).unwrap();
        assert_eq!(removed.requester_id, 2);
        assert_eq!(registry.state_of(2), None);
        assert_eq!(registry.len(), 1);
    }
}
