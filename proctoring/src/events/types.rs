//! Outbound notification types

use serde::{Deserialize, Serialize};

use crate::session::SessionId;

/// Notification pushed to a monitored client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// One accepted, non-terminal violation
    WarningAlert {
        session_id: SessionId,
        message: String,
        count: u32,
    },

    /// Sent exactly once, when the warning threshold is reached
    ExamTerminated {
        session_id: SessionId,
        reason: String,
        redirect: String,
    },
}

impl Notification {
    /// Session this notification is addressed to
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::WarningAlert { session_id, .. } | Self::ExamTerminated { session_id, .. } => {
                *session_id
            }
        }
    }

    /// Event type name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::WarningAlert { .. } => "warning_alert",
            Self::ExamTerminated { .. } => "exam_terminated",
        }
    }
}
