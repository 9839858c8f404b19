use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::ids::{FieldName, SessionId, UserId};

/// Traffic-light session status as reported and displayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Red,
    Blue,
    Green,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Red => "red",
            SessionStatus::Blue => "blue",
            SessionStatus::Green => "green",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `session_start` announcement held until the user explicitly accepts it.
///
/// Accepting switches the context to the new session; declining discards the
/// prompt. Content and tree state are untouched while the prompt is pending
/// so the stream never yanks the display away from what is being read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSession {
    pub user_id: UserId,
    pub field: FieldName,
    pub session_id: SessionId,
}

/// The session lifecycle machine: status light × intro flag × daily flag.
///
/// Runs for the lifetime of an active learning field; there is no terminal
/// state, ending a field simply stops feeding it events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleState {
    pub status: SessionStatus,
    pub intro_active: bool,
    pub daily_active: bool,
}

impl LifecycleState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A session of either kind is currently running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.intro_active || self.daily_active
    }

    /// The daily session ended (stream `session_stop`).
    pub fn on_daily_stop(&mut self) {
        self.daily_active = false;
        self.status = SessionStatus::Red;
    }

    /// The intro session ended (stream `intro_session_stop`). The light stays
    /// green only if a daily session is still running.
    pub fn on_intro_stop(&mut self) {
        self.intro_active = false;
        self.status = if self.daily_active {
            SessionStatus::Green
        } else {
            SessionStatus::Red
        };
    }

    /// Authoritative overwrite from the reconciliation channel
    /// (`session_status_update`).
    pub fn apply_status_update(
        &mut self,
        status: SessionStatus,
        intro_active: bool,
        daily_active: bool,
    ) {
        self.status = status;
        self.intro_active = intro_active;
        self.daily_active = daily_active;
    }

    /// The user accepted a newly announced session.
    pub fn on_session_accepted(&mut self) {
        self.daily_active = true;
        self.status = SessionStatus::Green;
    }

    /// The user explicitly ended the session from the client.
    pub fn on_end_requested(&mut self) {
        self.intro_active = false;
        self.daily_active = false;
        self.status = SessionStatus::Red;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_idle_red() {
        let state = LifecycleState::new();
        assert_eq!(state.status, SessionStatus::Red);
        assert!(!state.is_active());
    }

    #[test]
    fn daily_stop_goes_red() {
        let mut state = LifecycleState {
            status: SessionStatus::Green,
            intro_active: false,
            daily_active: true,
        };
        state.on_daily_stop();
        assert_eq!(state.status, SessionStatus::Red);
        assert!(!state.daily_active);
    }

    #[test]
    fn intro_stop_keeps_green_while_daily_runs() {
        let mut state = LifecycleState {
            status: SessionStatus::Blue,
            intro_active: true,
            daily_active: true,
        };
        state.on_intro_stop();
        assert_eq!(state.status, SessionStatus::Green);
        assert!(state.is_active());

        let mut state = LifecycleState {
            status: SessionStatus::Blue,
            intro_active: true,
            daily_active: false,
        };
        state.on_intro_stop();
        assert_eq!(state.status, SessionStatus::Red);
        assert!(!state.is_active());
    }

    #[test]
    fn status_update_is_a_full_overwrite() {
        let mut state = LifecycleState::new();
        state.apply_status_update(SessionStatus::Blue, true, false);
        assert_eq!(state.status, SessionStatus::Blue);
        assert!(state.intro_active);
        assert!(!state.daily_active);
    }

    #[test]
    fn status_serde_uses_lowercase() {
        let json = serde_json::to_string(&SessionStatus::Green).unwrap();
        assert_eq!(json, "\"green\"");
        let back: SessionStatus = serde_json::from_str("\"blue\"").unwrap();
        assert_eq!(back, SessionStatus::Blue);
    }
}
