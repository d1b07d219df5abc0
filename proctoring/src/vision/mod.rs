//! Vision Analyzer — webcam frame classification
//!
//! Two interchangeable strategies sit behind one analyzer, chosen once at
//! startup from the capabilities that are available:
//!
//! ```text
//! LandmarkEstimator available ─▶ Full      (head pose + mouth state)
//! FaceDetector available ──────▶ Fallback  (face presence + centering)
//! neither ─────────────────────▶ Disabled  (never a violation)
//! ```
//!
//! Analysis is split in two phases so the expensive part can run off the
//! async executor:
//!
//! 1. [`VisionAnalyzer::observe`] decodes the frame and runs detection. It is
//!    pure and `Send`, and returns an [`Observation`] or an
//!    [`AnalysisFailure`].
//! 2. [`VisionAnalyzer::judge`] turns an observation into at most one
//!    candidate violation, updating the session's look-away streak.

pub mod centering;
pub mod head_pose;
pub mod pnp;
pub mod skin;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::VisionConfig;
use crate::cooldown::ViolationCategory;
use crate::dispatcher::Candidate;
use crate::session::EphemeralState;
use crate::signal::{decode_frame, DecodeFailure, Frame};

pub use centering::CenteringStrategy;
pub use head_pose::{HeadPose, HeadPoseStrategy};
pub use pnp::PnpError;
pub use skin::SkinToneDetector;

pub const NO_FACE_MESSAGE: &str = "No Face Detected";
pub const MULTIPLE_FACES_MESSAGE: &str = "Multiple Faces Detected";

/// Why a frame could not be classified
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisFailure {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeFailure),

    #[error("detector failed: {0}")]
    Detector(String),

    #[error("pose estimation failed: {0}")]
    Pose(#[from] PnpError),

    #[error("analysis task failed: {0}")]
    Task(String),
}

/// Face bounding box in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl FaceBox {
    /// Box center normalized to the frame size
    pub fn normalized_center(&self, frame_width: f64, frame_height: f64) -> (f64, f64) {
        (
            (self.x + self.width / 2.0) / frame_width,
            (self.y + self.height / 2.0) / frame_height,
        )
    }
}

/// A landmark position normalized to `[0, 1]` of the frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Facial landmarks used by the pose strategy.
///
/// "Left" and "right" refer to the image, not to the subject.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceLandmarks {
    pub nose_tip: Point2,
    pub chin: Point2,
    pub left_eye_outer: Point2,
    pub right_eye_outer: Point2,
    pub mouth_left: Point2,
    pub mouth_right: Point2,
    pub upper_lip: Point2,
    pub lower_lip: Point2,
    pub forehead: Point2,
}

/// Face detection capability (bounding boxes only)
pub trait FaceDetector: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(&self, frame: &Frame) -> Result<Vec<FaceBox>, AnalysisFailure>;
}

/// Facial landmark estimation capability
pub trait LandmarkEstimator: Send + Sync {
    fn name(&self) -> &'static str;

    /// One entry per detected face
    fn estimate(&self, frame: &Frame) -> Result<Vec<FaceLandmarks>, AnalysisFailure>;
}

/// Vision capabilities available to this process
#[derive(Clone, Default)]
pub struct VisionCapabilities {
    pub landmarks: Option<Arc<dyn LandmarkEstimator>>,
    pub faces: Option<Arc<dyn FaceDetector>>,
}

impl VisionCapabilities {
    /// No vision capability at all
    pub fn none() -> Self {
        Self::default()
    }

    /// The built-in skin-tone face detector
    pub fn builtin() -> Self {
        Self::none().with_faces(Arc::new(SkinToneDetector::default()))
    }

    pub fn with_faces(mut self, detector: Arc<dyn FaceDetector>) -> Self {
        self.faces = Some(detector);
        self
    }

    pub fn with_landmarks(mut self, estimator: Arc<dyn LandmarkEstimator>) -> Self {
        self.landmarks = Some(estimator);
        self
    }
}

/// Which strategy an analyzer runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionMode {
    Full,
    Fallback,
    Disabled,
}

impl fmt::Display for VisionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Fallback => write!(f, "fallback"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// What one frame showed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    NoFace,
    MultipleFaces(usize),
    /// Single face, normalized bounding box center
    Placement { cx: f64, cy: f64 },
    /// Single face, estimated head pose
    Pose(HeadPose),
    /// Vision disabled or no frame to look at
    Skipped,
}

/// Frame classifier, fixed to one strategy for its lifetime
pub enum VisionAnalyzer {
    Full(HeadPoseStrategy),
    Fallback(CenteringStrategy),
    Disabled,
}

impl VisionAnalyzer {
    /// Pick the strongest strategy the capabilities allow
    pub fn select(capabilities: VisionCapabilities, config: &VisionConfig) -> Self {
        if let Some(estimator) = capabilities.landmarks {
            info!(estimator = estimator.name(), "Vision: head pose strategy");
            Self::Full(HeadPoseStrategy::new(estimator, config.pose))
        } else if let Some(detector) = capabilities.faces {
            info!(detector = detector.name(), "Vision: centering strategy");
            Self::Fallback(CenteringStrategy::new(
                detector,
                config.centering,
                config.look_away_grace,
            ))
        } else {
            info!("Vision: no capability available, frames will not be analyzed");
            Self::Disabled
        }
    }

    pub fn mode(&self) -> VisionMode {
        match self {
            Self::Full(_) => VisionMode::Full,
            Self::Fallback(_) => VisionMode::Fallback,
            Self::Disabled => VisionMode::Disabled,
        }
    }

    /// Decode and inspect one encoded frame
    pub fn observe(&self, payload: &str) -> Result<Observation, AnalysisFailure> {
        if matches!(self, Self::Disabled) {
            return Ok(Observation::Skipped);
        }
        let frame = decode_frame(payload)?;
        self.observe_frame(&frame)
    }

    /// Inspect an already decoded frame
    pub fn observe_frame(&self, frame: &Frame) -> Result<Observation, AnalysisFailure> {
        match self {
            Self::Full(strategy) => strategy.observe(frame),
            Self::Fallback(strategy) => strategy.observe(frame),
            Self::Disabled => Ok(Observation::Skipped),
        }
    }

    /// Turn an observation into at most one candidate violation
    pub fn judge(&self, observation: Observation, state: &mut EphemeralState) -> Option<Candidate> {
        match (self, observation) {
            (_, Observation::NoFace) => {
                Some(Candidate::new(ViolationCategory::NoFace, NO_FACE_MESSAGE))
            }
            (_, Observation::MultipleFaces(_)) => Some(Candidate::new(
                ViolationCategory::MultipleFaces,
                MULTIPLE_FACES_MESSAGE,
            )),
            (Self::Fallback(strategy), Observation::Placement { cx, cy }) => {
                strategy.judge(cx, cy, state)
            }
            (Self::Full(strategy), Observation::Pose(pose)) => strategy.judge(&pose),
            _ => None,
        }
    }
}

impl fmt::Debug for VisionAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VisionAnalyzer").field(&self.mode()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoFaces;

    impl FaceDetector for NoFaces {
        fn name(&self) -> &'static str {
            "no-faces"
        }

        fn detect(&self, _frame: &Frame) -> Result<Vec<FaceBox>, AnalysisFailure> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_select_prefers_strongest_capability() {
        let config = VisionConfig::default();
        assert_eq!(
            VisionAnalyzer::select(VisionCapabilities::none(), &config).mode(),
            VisionMode::Disabled
        );
        assert_eq!(
            VisionAnalyzer::select(VisionCapabilities::builtin(), &config).mode(),
            VisionMode::Fallback
        );
    }

    #[test]
    fn test_disabled_never_decodes() {
        let analyzer = VisionAnalyzer::Disabled;
        assert_eq!(analyzer.observe("garbage"), Ok(Observation::Skipped));
    }

    #[test]
    fn test_undecodable_frame_is_failure() {
        let caps = VisionCapabilities::none().with_faces(Arc::new(NoFaces));
        let analyzer = VisionAnalyzer::select(caps, &VisionConfig::default());
        assert!(matches!(
            analyzer.observe("data:image/jpeg;base64,!!!"),
            Err(AnalysisFailure::Decode(_))
        ));
    }

    #[test]
    fn test_face_count_candidates() {
        let analyzer = VisionAnalyzer::Disabled;
        let mut state = EphemeralState::new();

        let none = analyzer.judge(Observation::NoFace, &mut state).unwrap();
        assert_eq!(none.message, NO_FACE_MESSAGE);
        let many = analyzer
            .judge(Observation::MultipleFaces(3), &mut state)
            .unwrap();
        assert_eq!(many.category, ViolationCategory::MultipleFaces);
        assert!(analyzer.judge(Observation::Skipped, &mut state).is_none());
    }

    #[test]
    fn test_normalized_center() {
        let face = FaceBox {
            x: 140.0,
            y: 100.0,
            width: 40.0,
            height: 40.0,
        };
        assert_eq!(face.normalized_center(320.0, 240.0), (0.5, 0.5));
    }
}
