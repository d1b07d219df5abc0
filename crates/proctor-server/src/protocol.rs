//! Wire protocol between monitored clients and the server
//!
//! One JSON object per line, tagged by `"type"`.
//!
//! ```text
//! client → server   attach | frame | tab_change | submit | status
//! server → client   attached | warning_alert | exam_terminated | submitted | status | error
//! ```

use proctoring::{parse_audio_level, Notification, SessionId, SessionStatus, Tick};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Longest accepted line. Frames are base64 images, so this is generous.
pub const MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(#[from] LinesCodecError),
}

/// Messages sent by a monitored client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this connection to a session
    Attach { session_id: SessionId },
    /// One analysis cycle
    Frame {
        #[serde(default)]
        image: Option<String>,
        /// Number or numeric string; anything else is treated as absent
        #[serde(default)]
        audio_level: Option<Value>,
        #[serde(default)]
        violation_type: Option<String>,
    },
    /// The exam tab lost focus or the window was minimized
    TabChange,
    Submit,
    Status,
}

impl ClientMessage {
    /// Build the tick for a `frame` message
    pub fn into_tick(self) -> Option<Tick> {
        match self {
            Self::Frame {
                image,
                audio_level,
                violation_type,
            } => Some(Tick {
                image,
                audio_level: audio_level.as_ref().and_then(parse_audio_level),
                client_event: violation_type,
            }),
            _ => None,
        }
    }
}

/// Messages sent to a monitored client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Attached {
        session_id: SessionId,
    },
    WarningAlert {
        message: String,
        count: u32,
    },
    ExamTerminated {
        reason: String,
        redirect: String,
    },
    Submitted {
        completed: bool,
    },
    Status {
        status: SessionStatus,
        warnings_count: u32,
        cheating_flag: bool,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

impl From<Notification> for ServerMessage {
    fn from(notification: Notification) -> Self {
        match notification {
            Notification::WarningAlert { message, count, .. } => {
                Self::WarningAlert { message, count }
            }
            Notification::ExamTerminated {
                reason, redirect, ..
            } => Self::ExamTerminated { reason, redirect },
        }
    }
}

/// Parse one inbound line
pub fn decode_client(line: &str) -> Result<ClientMessage, ProtocolError> {
    Ok(serde_json::from_str(line)?)
}

/// Serialize one outbound message (without the trailing newline)
pub fn encode_server(message: &ServerMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_frame_with_string_level() {
        let msg = decode_client(
            r#"{"type":"frame","image":"data:image/jpeg;base64,AAAA","audio_level":"0.5","violation_type":null}"#,
        )
        .unwrap();
        let tick = msg.into_tick().unwrap();
        assert_eq!(tick.audio_level, Some(0.5));
        assert_eq!(tick.image.as_deref(), Some("data:image/jpeg;base64,AAAA"));
        assert_eq!(tick.client_event, None);
    }

    #[test]
    fn test_non_numeric_level_is_absent() {
        let msg = decode_client(r#"{"type":"frame","audio_level":"loud"}"#).unwrap();
        assert_eq!(msg.into_tick().unwrap().audio_level, None);
    }

    #[test]
    fn test_unit_messages() {
        assert_eq!(
            decode_client(r#"{"type":"tab_change"}"#).unwrap(),
            ClientMessage::TabChange
        );
        assert_eq!(
            decode_client(r#"{"type":"attach","session_id":12}"#).unwrap(),
            ClientMessage::Attach {
                session_id: SessionId(12)
            }
        );
        assert!(decode_client(r#"{"type":"teleport"}"#).is_err());
        assert!(decode_client("not json").is_err());
    }

    #[test]
    fn test_notification_mapping() {
        let msg: ServerMessage = Notification::WarningAlert {
            session_id: SessionId(3),
            message: "Looking Up".to_string(),
            count: 2,
        }
        .into();
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "warning_alert", "message": "Looking Up", "count": 2})
        );
    }

    #[test]
    fn test_status_encoding() {
        let line = encode_server(&ServerMessage::Status {
            status: SessionStatus::Terminated,
            warnings_count: 6,
            cheating_flag: true,
        })
        .unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&line).unwrap(),
            json!({"type": "status", "status": "terminated", "warnings_count": 6, "cheating_flag": true})
        );
    }
}
