//! Escalation Engine — warning accumulation and session termination
//!
//! Consumes accepted violations and submissions for one session, drives the
//! durable record through the [`SessionStore`] contract, and pushes the
//! matching notification. The caller holds the session's slot lock for the
//! duration of each call, so the read-append-check sequence is never
//! interleaved with another event for the same session.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EscalationConfig;
use crate::error::ProctorResult;
use crate::events::{Notification, Notifier};
use crate::session::{SessionId, SessionSlot, SharedSessionStore, StoreError};

/// Result of feeding one accepted violation to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EscalationOutcome {
    /// Warning recorded, session still active
    Warned { count: u32 },
    /// Warning recorded and the threshold reached
    Terminated { count: u32 },
    /// Session unknown or already ended; nothing recorded
    Ignored,
}

/// Result of an explicit submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Completed,
    /// Session unknown or already ended
    Ignored,
}

/// A store error that only means the session ended under us
fn is_ended(err: &StoreError) -> bool {
    matches!(err, StoreError::NotFound(_) | StoreError::NotActive { .. })
}

/// The escalation state machine
pub struct EscalationEngine {
    store: SharedSessionStore,
    notifier: Arc<dyn Notifier>,
    config: EscalationConfig,
}

impl EscalationEngine {
    pub fn new(
        store: SharedSessionStore,
        notifier: Arc<dyn Notifier>,
        config: EscalationConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    /// Record an accepted violation.
    ///
    /// Appends a warning; at `max_warnings` terminates the session, closes
    /// `slot` and sends the termination notice, otherwise sends a warning
    /// alert. Unknown or ended sessions are a no-op.
    pub async fn record_violation(
        &self,
        slot: &mut SessionSlot,
        id: SessionId,
        message: &str,
        now: DateTime<Utc>,
    ) -> ProctorResult<EscalationOutcome> {
        if slot.is_closed() {
            return Ok(EscalationOutcome::Ignored);
        }

        match self.store.get(id).await? {
            Some(snapshot) if snapshot.status.is_active() => {}
            other => {
                debug!(session_id = %id, status = ?other.map(|s| s.status), "Violation for inactive session ignored");
                slot.close();
                return Ok(EscalationOutcome::Ignored);
            }
        }

        let count = match self.store.append_warning(id, message, now).await {
            Ok(count) => count,
            Err(e) if is_ended(&e) => {
                slot.close();
                return Ok(EscalationOutcome::Ignored);
            }
            Err(e) => return Err(e.into()),
        };

        if count >= self.config.max_warnings {
            if let Err(e) = self.store.terminate(id, now).await {
                if is_ended(&e) {
                    slot.close();
                    return Ok(EscalationOutcome::Ignored);
                }
                return Err(e.into());
            }
            slot.close();

            info!(
                session_id = %id,
                count,
                max = self.config.max_warnings,
                last_violation = message,
                "Warning threshold reached, session terminated"
            );
            self.send(Notification::ExamTerminated {
                session_id: id,
                reason: self.config.termination_reason.clone(),
                redirect: self.config.redirect.clone(),
            })
            .await;
            return Ok(EscalationOutcome::Terminated { count });
        }

        info!(session_id = %id, count, violation = message, "Warning recorded");
        self.send(Notification::WarningAlert {
            session_id: id,
            message: message.to_string(),
            count,
        })
        .await;
        Ok(EscalationOutcome::Warned { count })
    }

    /// Handle an explicit submission: Active → Completed, no alert.
    pub async fn submit(
        &self,
        slot: &mut SessionSlot,
        id: SessionId,
        now: DateTime<Utc>,
    ) -> ProctorResult<SubmissionOutcome> {
        let outcome = match self.store.get(id).await? {
            Some(snapshot) if snapshot.status.is_active() => {
                match self.store.complete(id, now).await {
                    Ok(()) => {
                        info!(session_id = %id, warnings = snapshot.warnings_count, "Session completed");
                        SubmissionOutcome::Completed
                    }
                    Err(e) if is_ended(&e) => SubmissionOutcome::Ignored,
                    Err(e) => return Err(e.into()),
                }
            }
            _ => {
                debug!(session_id = %id, "Submission for inactive session ignored");
                SubmissionOutcome::Ignored
            }
        };
        slot.close();
        Ok(outcome)
    }

    /// Deliver a notification. The durable record is already written, so a
    /// delivery failure is logged and otherwise ignored.
    async fn send(&self, notification: Notification) {
        let event_type = notification.event_type();
        let session_id = notification.session_id();
        if let Err(e) = self.notifier.notify(notification).await {
            warn!(event_type, %session_id, "Failed to notify client: {}", e);
        }
    }
}
