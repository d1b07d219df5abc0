//! Outbound notifications to monitored clients
//!
//! - **Types** (`types.rs`): the warning alert and termination notice.
//! - **Bus** (`bus.rs`): the `Notifier` contract used by the escalation
//!   engine and a Tokio broadcast implementation with per-session receivers.

pub mod bus;
pub mod types;

pub use bus::{NotificationBus, Notifier, NotifyError, SessionReceiver, SharedNotificationBus};
pub use types::Notification;
