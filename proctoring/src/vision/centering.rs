//! Face presence and centering heuristic
//!
//! Runs on bare face bounding boxes. A single face whose center leaves the
//! centering window for `grace` consecutive frames counts as looking away.

use std::sync::Arc;

use tracing::debug;

use super::{AnalysisFailure, FaceDetector, Observation};
use crate::config::CenteringWindow;
use crate::cooldown::ViolationCategory;
use crate::dispatcher::Candidate;
use crate::session::EphemeralState;
use crate::signal::Frame;

pub const LOOKING_AWAY_MESSAGE: &str = "Looking Away Frequently";

pub struct CenteringStrategy {
    detector: Arc<dyn FaceDetector>,
    window: CenteringWindow,
    grace: u32,
}

impl CenteringStrategy {
    pub fn new(detector: Arc<dyn FaceDetector>, window: CenteringWindow, grace: u32) -> Self {
        Self {
            detector,
            window,
            grace: grace.max(1),
        }
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    pub fn observe(&self, frame: &Frame) -> Result<Observation, AnalysisFailure> {
        let faces = self.detector.detect(frame)?;
        Ok(match faces.as_slice() {
            [] => Observation::NoFace,
            [face] => {
                let (cx, cy) =
                    face.normalized_center(f64::from(frame.width()), f64::from(frame.height()));
                Observation::Placement { cx, cy }
            }
            many => Observation::MultipleFaces(many.len()),
        })
    }

    /// Update the look-away streak for one single-face frame
    pub fn judge(&self, cx: f64, cy: f64, state: &mut EphemeralState) -> Option<Candidate> {
        if self.window.contains(cx, cy) {
            state.look_away_streak = 0;
            return None;
        }

        state.look_away_streak += 1;
        if state.look_away_streak < self.grace {
            debug!(streak = state.look_away_streak, cx, cy, "Face off-center");
            return None;
        }

        state.look_away_streak = 0;
        Some(Candidate::new(
            ViolationCategory::LookingAway,
            LOOKING_AWAY_MESSAGE,
        ))
    }
}
