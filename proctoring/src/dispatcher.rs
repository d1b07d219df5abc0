//! Violation Dispatcher — per-tick signal fusion
//!
//! Evaluates one tick's signals in strict priority order and stops at the
//! first candidate the cooldown gate accepts:
//!
//! 1. client-reported event (`ClientEvent` category)
//! 2. vision analyzer result (its own category)
//! 3. audio analyzer result (`Audio` category)
//!
//! A candidate suppressed by the gate does not stop evaluation, so a
//! throttled client event cannot mask a fresh vision or audio violation.
//!
//! Decode and analysis failures are mapped to "no violation" in
//! [`settle`] and nowhere else.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::AudioAnalyzer;
use crate::cooldown::{CooldownGate, ViolationCategory};
use crate::session::EphemeralState;
use crate::vision::{AnalysisFailure, Observation, VisionAnalyzer};

/// A classified but not yet accepted violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub category: ViolationCategory,
    pub message: String,
}

impl Candidate {
    pub fn new(category: ViolationCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

/// Signals delivered by the client for one analysis cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Encoded webcam frame, optionally prefixed with a data-URL header
    #[serde(default)]
    pub image: Option<String>,
    /// Normalized loudness in `[0, 1]`
    #[serde(default)]
    pub audio_level: Option<f64>,
    /// Free-form violation reported by the client itself
    #[serde(default)]
    pub client_event: Option<String>,
}

impl Tick {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_audio_level(mut self, level: f64) -> Self {
        self.audio_level = Some(level);
        self
    }

    pub fn with_client_event(mut self, event: impl Into<String>) -> Self {
        self.client_event = Some(event.into());
        self
    }
}

/// Result of analyzing one tick: at most one accepted violation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub violation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ViolationCategory>,
}

impl Analysis {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn accepted(candidate: Candidate) -> Self {
        Self {
            violation: true,
            message: Some(candidate.message),
            category: Some(candidate.category),
        }
    }
}

/// Map an analysis result to an observation. Failures become "nothing seen".
fn settle(result: Result<Observation, AnalysisFailure>) -> Observation {
    match result {
        Ok(observation) => observation,
        Err(failure) => {
            debug!(%failure, "Frame analysis failed, treating as no violation");
            Observation::Skipped
        }
    }
}

/// Fuses client, vision and audio signals into at most one violation per tick
#[derive(Debug, Clone)]
pub struct ViolationDispatcher {
    vision: Arc<VisionAnalyzer>,
    audio: AudioAnalyzer,
    gate: CooldownGate,
}

impl ViolationDispatcher {
    pub fn new(vision: Arc<VisionAnalyzer>, audio: AudioAnalyzer, gate: CooldownGate) -> Self {
        Self {
            vision,
            audio,
            gate,
        }
    }

    pub fn vision(&self) -> &VisionAnalyzer {
        &self.vision
    }

    /// Decode and classify a frame off the async executor
    async fn observe(&self, image: String) -> Observation {
        let vision = Arc::clone(&self.vision);
        let result = tokio::task::spawn_blocking(move || vision.observe(&image))
            .await
            .unwrap_or_else(|e| Err(AnalysisFailure::Task(e.to_string())));
        settle(result)
    }

    /// Analyze one tick against the session's ephemeral state
    pub async fn analyze(
        &self,
        tick: Tick,
        state: &mut EphemeralState,
        now: DateTime<Utc>,
    ) -> Analysis {
        if let Some(event) = tick.client_event.filter(|e| !e.trim().is_empty()) {
            let candidate = Candidate::new(ViolationCategory::ClientEvent, event);
            if self.gate.try_accept(state, candidate.category, now) {
                return Analysis::accepted(candidate);
            }
        }

        if let Some(image) = tick.image {
            let observation = self.observe(image).await;
            if let Some(candidate) = self.vision.judge(observation, state) {
                if self.gate.try_accept(state, candidate.category, now) {
                    return Analysis::accepted(candidate);
                }
            }
        }

        if let Some(candidate) = self.audio.analyze(state, tick.audio_level) {
            if self.gate.try_accept(state, candidate.category, now) {
                return Analysis::accepted(candidate);
            }
        }

        Analysis::clean()
    }
}
