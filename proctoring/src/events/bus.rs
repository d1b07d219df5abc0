//! Notification bus for monitored clients
//!
//! Pub/sub over Tokio broadcast channels. Every session has its own channel,
//! so a burst of notifications for one session can never push another
//! session's termination notice out of a lagging receiver. A separate
//! all-sessions channel serves observers that watch everything.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::Notification;
use crate::session::SessionId;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Error type for notification delivery
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Channel closed")]
    ChannelClosed,
}

/// Outbound notification channel consumed by the escalation engine
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Shared reference to NotificationBus
pub type SharedNotificationBus = Arc<NotificationBus>;

/// Broadcast-backed notifier
pub struct NotificationBus {
    all: broadcast::Sender<Notification>,
    sessions: Mutex<HashMap<SessionId, broadcast::Sender<Notification>>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        let (all, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            all,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Create a shared reference to this bus
    pub fn shared(self) -> SharedNotificationBus {
        Arc::new(self)
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, broadcast::Sender<Notification>>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publish to the session's subscribers and to all-sessions observers.
    /// Having no subscribers is not an error.
    pub fn publish(&self, notification: Notification) {
        let event_type = notification.event_type();
        let session_id = notification.session_id();

        let delivered = {
            let mut sessions = self.sessions();
            match sessions.get(&session_id) {
                Some(sender) => match sender.send(notification.clone()) {
                    Ok(count) => count,
                    Err(_) => {
                        sessions.remove(&session_id);
                        0
                    }
                },
                None => 0,
            }
        };
        let observers = self.all.send(notification).unwrap_or(0);
        debug!(
            event_type,
            %session_id,
            receivers = delivered,
            observers,
            "Notification published"
        );
    }

    /// Subscribe to every notification
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.all.subscribe()
    }

    /// Subscribe to notifications for one session
    pub fn subscribe_session(&self, session_id: SessionId) -> SessionReceiver {
        let mut sessions = self.sessions();
        sessions.retain(|_, sender| sender.receiver_count() > 0);
        let receiver = sessions
            .entry(session_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        SessionReceiver::new(receiver, session_id)
    }

    /// Live receivers across the all-sessions channel and every session channel
    pub fn subscriber_count(&self) -> usize {
        let per_session: usize = self
            .sessions()
            .values()
            .map(broadcast::Sender::receiver_count)
            .sum();
        self.all.receiver_count() + per_session
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for NotificationBus {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.publish(notification);
        Ok(())
    }
}

/// Receiver for one session's notifications
pub struct SessionReceiver {
    receiver: broadcast::Receiver<Notification>,
    session_id: SessionId,
}

impl SessionReceiver {
    pub fn new(receiver: broadcast::Receiver<Notification>, session_id: SessionId) -> Self {
        Self {
            receiver,
            session_id,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Receive the next notification for this session
    pub async fn recv(&mut self) -> Result<Notification, broadcast::error::RecvError> {
        loop {
            let notification = self.receiver.recv().await?;
            if notification.session_id() == self.session_id {
                return Ok(notification);
            }
        }
    }

    /// Next already-queued notification for this session, without waiting
    pub fn try_recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.try_recv() {
                Ok(n) if n.session_id() == self.session_id => return Some(n),
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(session: u64, count: u32) -> Notification {
        Notification::WarningAlert {
            session_id: SessionId(session),
            message: "Looking Up".to_string(),
            count,
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = NotificationBus::new();
        let mut receiver = bus.subscribe();

        bus.notify(alert(1, 1)).await.unwrap();
        assert_eq!(receiver.recv().await.unwrap(), alert(1, 1));
    }

    #[tokio::test]
    async fn test_session_receiver_filters_other_sessions() {
        let bus = NotificationBus::new();
        let mut receiver = bus.subscribe_session(SessionId(2));

        bus.publish(alert(1, 1));
        bus.publish(alert(2, 5));
        assert_eq!(receiver.recv().await.unwrap(), alert(2, 5));
        assert!(receiver.try_recv().is_none());
    }

    /// Test: another session's flood never evicts this session's notice
    #[tokio::test]
    async fn test_termination_survives_other_sessions_flood() {
        let bus = NotificationBus::new();
        let mut receiver = bus.subscribe_session(SessionId(1));
        let _busy = bus.subscribe_session(SessionId(2));

        bus.publish(Notification::ExamTerminated {
            session_id: SessionId(1),
            reason: "Max warnings exceeded. Exam Terminated.".to_string(),
            redirect: "/student_dashboard".to_string(),
        });
        for n in 0..(CHANNEL_CAPACITY as u32 + 50) {
            bus.publish(alert(2 + u64::from(n % 3), n));
        }

        assert!(matches!(
            receiver.recv().await.unwrap(),
            Notification::ExamTerminated { session_id: SessionId(1), .. }
        ));
        assert!(receiver.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_dropped_receivers_are_pruned() {
        let bus = NotificationBus::new();
        drop(bus.subscribe_session(SessionId(1)));
        bus.publish(alert(1, 1));
        assert_eq!(bus.subscriber_count(), 0);

        let _live = bus.subscribe_session(SessionId(2));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = NotificationBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.notify(alert(1, 1)).await.is_ok());
    }
}
