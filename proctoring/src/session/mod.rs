//! Session-scoped state
//!
//! Two kinds of state live here:
//!
//! - **Ephemeral state** (`registry.rs`): per-session debouncing scratch
//!   space (cooldown timestamps, noise and look-away streaks). Held in process
//!   memory behind one async lock per session, created on the first tick and
//!   torn down with the Completed/Terminated transition.
//!
//! - **Durable session records** (`store.rs`): the `SessionStore` contract
//!   through which the escalation engine reads status and appends warnings,
//!   plus an in-memory implementation.

pub mod registry;
pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use registry::{EphemeralState, SessionRegistry, SessionSlot, SlotHandle};
pub use store::{
    InMemorySessionStore, SessionSnapshot, SessionStore, SharedSessionStore, StoreError,
    StoreResult,
};

/// Identifier of an exam session, as issued by the session store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}
