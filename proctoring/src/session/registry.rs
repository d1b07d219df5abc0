//! Session registry — ephemeral per-session state behind per-session locks
//!
//! The registry map itself is only held for the instant it takes to look up
//! or insert a slot. All work on one session happens while holding that
//! session's async mutex, so a frame tick and an out-of-band focus-loss event
//! for the same session are serialized, while different sessions never wait
//! on each other.
//!
//! A slot that has been closed stays closed: a task that grabbed the handle
//! just before the session ended observes `is_closed()` after acquiring the
//! lock and does nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use super::SessionId;
use crate::cooldown::ViolationCategory;

/// Debouncing scratch space for one active session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EphemeralState {
    /// Last accepted violation per cooldown category
    pub last_fired_at: HashMap<ViolationCategory, DateTime<Utc>>,
    /// Consecutive over-threshold audio samples
    pub noise_streak: u32,
    /// Consecutive off-center frames
    pub look_away_streak: u32,
}

impl EphemeralState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Lock-protected slot for one session
#[derive(Debug, Default)]
pub struct SessionSlot {
    state: Option<EphemeralState>,
    closed: bool,
}

impl SessionSlot {
    /// Whether the session ended while this slot was live
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether ephemeral state has been created
    pub fn has_state(&self) -> bool {
        self.state.is_some()
    }

    /// Ephemeral state, created lazily. `None` once the slot is closed.
    pub fn state_mut(&mut self) -> Option<&mut EphemeralState> {
        if self.closed {
            return None;
        }
        Some(self.state.get_or_insert_with(EphemeralState::new))
    }

    /// Drop the ephemeral state and refuse any further use
    pub fn close(&mut self) {
        self.state = None;
        self.closed = true;
    }
}

/// Shared handle to a session slot
pub type SlotHandle = Arc<tokio::sync::Mutex<SessionSlot>>;

/// Process-wide table of session slots keyed by session id
#[derive(Debug, Default)]
pub struct SessionRegistry {
    slots: Mutex<HashMap<SessionId, SlotHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, SlotHandle>> {
        // The map holds only Arcs; a panic elsewhere cannot leave it half-written.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get the slot for a session, inserting an empty one if absent
    pub fn slot(&self, id: SessionId) -> SlotHandle {
        self.slots().entry(id).or_default().clone()
    }

    /// Get the slot for a session without creating one
    pub fn get(&self, id: SessionId) -> Option<SlotHandle> {
        self.slots().get(&id).cloned()
    }

    /// Remove a session's slot, but only if it is still `handle`.
    ///
    /// A newer slot inserted after `handle` was closed is left alone.
    pub fn evict(&self, id: SessionId, handle: &SlotHandle) {
        let mut slots = self.slots();
        if slots.get(&id).is_some_and(|current| Arc::ptr_eq(current, handle)) {
            slots.remove(&id);
        }
    }

    /// Number of sessions currently tracked
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }

    /// Whether a session currently holds ephemeral state
    pub async fn has_state(&self, id: SessionId) -> bool {
        match self.get(id) {
            Some(handle) => handle.lock().await.has_state(),
            None => false,
        }
    }
}
