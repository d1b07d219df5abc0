//! Cooldown Gate — per-category minimum spacing between accepted violations
//!
//! A candidate violation is accepted only if at least `min_gap` has elapsed
//! since the last accepted violation of the same category in the same
//! session. The timestamp is written on acceptance, before anything
//! downstream can fail, so a burst of identical candidates yields exactly one
//! accepted violation per window.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CooldownConfig;
use crate::session::EphemeralState;

/// Independent cooldown keys. A video violation never suppresses an audio one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCategory {
    /// Client-reported event (focus loss, restricted key, ...)
    ClientEvent,
    NoFace,
    MultipleFaces,
    /// Sustained off-center face (centering heuristic)
    LookingAway,
    /// Head turned sideways (pose estimator)
    LookingAside,
    LookingDown,
    LookingUp,
    MouthOpen,
    Audio,
}

impl fmt::Display for ViolationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientEvent => write!(f, "client_event"),
            Self::NoFace => write!(f, "no_face"),
            Self::MultipleFaces => write!(f, "multiple_faces"),
            Self::LookingAway => write!(f, "looking_away"),
            Self::LookingAside => write!(f, "looking_aside"),
            Self::LookingDown => write!(f, "looking_down"),
            Self::LookingUp => write!(f, "looking_up"),
            Self::MouthOpen => write!(f, "mouth_open"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// Enforces the minimum gap between accepted violations of one category
#[derive(Debug, Clone, Copy)]
pub struct CooldownGate {
    min_gap: Duration,
}

impl CooldownGate {
    pub fn new(min_gap: Duration) -> Self {
        Self { min_gap }
    }

    pub fn from_config(config: &CooldownConfig) -> Self {
        Self::new(config.min_gap())
    }

    pub fn min_gap(&self) -> Duration {
        self.min_gap
    }

    /// Accept or suppress a candidate. On acceptance `last_fired_at` is
    /// updated to `now` immediately.
    pub fn try_accept(
        &self,
        state: &mut EphemeralState,
        category: ViolationCategory,
        now: DateTime<Utc>,
    ) -> bool {
        if let Some(last) = state.last_fired_at.get(&category) {
            let elapsed = now - *last;
            if elapsed < self.min_gap {
                debug!(
                    %category,
                    elapsed_ms = elapsed.num_milliseconds(),
                    "Candidate suppressed by cooldown"
                );
                return false;
            }
        }
        state.last_fired_at.insert(category, now);
        true
    }
}

impl Default for CooldownGate {
    fn default() -> Self {
        Self::from_config(&CooldownConfig::default())
    }
}
