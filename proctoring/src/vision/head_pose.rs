//! Head pose and mouth state from facial landmarks
//!
//! Six landmarks (nose tip, chin, eye outer corners, mouth corners) are
//! matched against [`FACE_MODEL`] to recover head rotation; lip separation
//! relative to face height gives the mouth state.

use std::sync::Arc;

use tracing::debug;

use super::pnp::{solve_pnp, CameraIntrinsics, FACE_MODEL};
use super::{AnalysisFailure, FaceLandmarks, LandmarkEstimator, Observation, Point2};
use crate::config::PoseThresholds;
use crate::cooldown::ViolationCategory;
use crate::dispatcher::Candidate;
use crate::signal::Frame;

pub const LOOKING_RIGHT_MESSAGE: &str = "Looking away (Right)";
pub const LOOKING_LEFT_MESSAGE: &str = "Looking away (Left)";
pub const LOOKING_DOWN_MESSAGE: &str = "Looking Down (Suspicious - Phone?)";
pub const LOOKING_UP_MESSAGE: &str = "Looking Up";
pub const MOUTH_OPEN_MESSAGE: &str = "Mouth Open / Talking detected";

/// Estimated head orientation for one face, in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadPose {
    /// Positive looks down
    pub pitch: f64,
    /// Positive turns toward the subject's right
    pub yaw: f64,
    pub roll: f64,
    /// Lip separation over face height; `None` if face height is degenerate
    pub mouth_ratio: Option<f64>,
}

/// Lip separation normalized by forehead-to-chin height
pub fn mouth_ratio(landmarks: &FaceLandmarks) -> Option<f64> {
    let face_height = landmarks.chin.y - landmarks.forehead.y;
    if face_height <= 0.0 || !face_height.is_finite() {
        return None;
    }
    let ratio = (landmarks.lower_lip.y - landmarks.upper_lip.y) / face_height;
    ratio.is_finite().then_some(ratio)
}

pub struct HeadPoseStrategy {
    estimator: Arc<dyn LandmarkEstimator>,
    thresholds: PoseThresholds,
}

impl HeadPoseStrategy {
    pub fn new(estimator: Arc<dyn LandmarkEstimator>, thresholds: PoseThresholds) -> Self {
        Self {
            estimator,
            thresholds,
        }
    }

    pub fn estimator_name(&self) -> &'static str {
        self.estimator.name()
    }

    pub fn observe(&self, frame: &Frame) -> Result<Observation, AnalysisFailure> {
        let faces = self.estimator.estimate(frame)?;
        match faces.as_slice() {
            [] => Ok(Observation::NoFace),
            [landmarks] => {
                let pose = estimate_pose(
                    landmarks,
                    f64::from(frame.width()),
                    f64::from(frame.height()),
                )?;
                Ok(Observation::Pose(pose))
            }
            many => Ok(Observation::MultipleFaces(many.len())),
        }
    }

    /// First matching pose check wins; mouth is only checked for a neutral pose.
    pub fn judge(&self, pose: &HeadPose) -> Option<Candidate> {
        let t = &self.thresholds;
        if pose.yaw.abs() > t.max_abs_yaw {
            let message = if pose.yaw > 0.0 {
                LOOKING_RIGHT_MESSAGE
            } else {
                LOOKING_LEFT_MESSAGE
            };
            return Some(Candidate::new(ViolationCategory::LookingAside, message));
        }
        if pose.pitch > t.max_pitch_down {
            return Some(Candidate::new(
                ViolationCategory::LookingDown,
                LOOKING_DOWN_MESSAGE,
            ));
        }
        if pose.pitch < t.min_pitch_up {
            return Some(Candidate::new(
                ViolationCategory::LookingUp,
                LOOKING_UP_MESSAGE,
            ));
        }
        match pose.mouth_ratio {
            Some(ratio) if ratio > t.mouth_open_ratio => Some(Candidate::new(
                ViolationCategory::MouthOpen,
                MOUTH_OPEN_MESSAGE,
            )),
            _ => None,
        }
    }
}

/// Solve the head pose of one face in a `width` x `height` frame
pub fn estimate_pose(
    landmarks: &FaceLandmarks,
    width: f64,
    height: f64,
) -> Result<HeadPose, AnalysisFailure> {
    let to_pixels = |p: Point2| [p.x * width, p.y * height];
    let image = [
        to_pixels(landmarks.nose_tip),
        to_pixels(landmarks.chin),
        to_pixels(landmarks.left_eye_outer),
        to_pixels(landmarks.right_eye_outer),
        to_pixels(landmarks.mouth_left),
        to_pixels(landmarks.mouth_right),
    ];
    let pose = solve_pnp(&FACE_MODEL, &image, &CameraIntrinsics::approximate(width, height))?;
    let (pitch, yaw, roll) = pose.euler_degrees();
    let mouth_ratio = mouth_ratio(landmarks);
    debug!(pitch, yaw, roll, ?mouth_ratio, "Head pose estimated");
    Ok(HeadPose {
        pitch,
        yaw,
        roll,
        mouth_ratio,
    })
}
