//! Escalation State — durable session records and their lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::SessionId;

/// Lifecycle status of an exam session.
///
/// `Completed` and `Terminated` are terminal; nothing leads back to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    /// Submitted normally
    Completed,
    /// Ended by the warning threshold
    Terminated,
}

impl SessionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Whether a transition to `next` is allowed
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Completed) | (Self::Active, Self::Terminated)
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Durable exam session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamSession {
    pub id: SessionId,
    pub status: SessionStatus,
    /// Always equals the number of warning records for this session
    pub warnings_count: u32,
    /// Set only on the threshold termination
    pub cheating_flag: bool,
    pub start_time: DateTime<Utc>,
    /// Set exactly once, at the Completed/Terminated transition
    pub end_time: Option<DateTime<Utc>>,
}

impl ExamSession {
    /// A freshly started, active session
    pub fn start(id: SessionId, start_time: DateTime<Utc>) -> Self {
        Self {
            id,
            status: SessionStatus::Active,
            warnings_count: 0,
            cheating_flag: false,
            start_time,
            end_time: None,
        }
    }
}

/// One accepted violation, append-only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningRecord {
    pub session_id: SessionId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_have_no_exits() {
        for terminal in [SessionStatus::Completed, SessionStatus::Terminated] {
            for next in [
                SessionStatus::Active,
                SessionStatus::Completed,
                SessionStatus::Terminated,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_active_transitions() {
        assert!(SessionStatus::Active.can_transition_to(SessionStatus::Completed));
        assert!(SessionStatus::Active.can_transition_to(SessionStatus::Terminated));
        assert!(!SessionStatus::Active.can_transition_to(SessionStatus::Active));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&SessionStatus::Terminated).unwrap();
        assert_eq!(json, "\"terminated\"");
    }
}
