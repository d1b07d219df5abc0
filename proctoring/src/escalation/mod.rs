//! Escalation — deterministic state machine for exam sessions
//!
//! ```text
//!            accepted violation (count < max)
//!              ┌─────────┐
//!              │         ▼
//!          ┌───┴──────────────┐   count ≥ max    ┌────────────┐
//!  start ─▶│      Active      │─────────────────▶│ Terminated │
//!          └────────┬─────────┘                  └────────────┘
//!                   │ submit
//!                   ▼
//!            ┌────────────┐
//!            │ Completed  │
//!            └────────────┘
//! ```
//!
//! Both end states are terminal. Events for a session that is unknown or no
//! longer active are no-ops.

pub mod engine;
pub mod state;

pub use engine::{EscalationEngine, EscalationOutcome, SubmissionOutcome};
pub use state::{ExamSession, SessionStatus, WarningRecord};
