//! Proctoring configuration
//!
//! All thresholds are fixed constants by default and can be overridden from a
//! TOML document, from `PROCTOR_*` environment variables, or both (file first,
//! environment on top).
//!
//! ```toml
//! [audio]
//! threshold = 0.4
//!
//! [cooldown]
//! min_gap_secs = 3.0
//!
//! [escalation]
//! max_warnings = 5
//! ```

use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration loading and validation
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Audio analyzer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Normalized loudness at or above which a sample counts as noisy
    pub threshold: f64,
    /// Consecutive noisy samples required before a violation
    pub required_streak: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            threshold: 0.35,
            required_streak: 2,
        }
    }
}

/// Region of the frame, in normalized coordinates, where a face center counts
/// as "centered".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CenteringWindow {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl CenteringWindow {
    /// Inclusive containment check
    pub fn contains(&self, cx: f64, cy: f64) -> bool {
        (self.min_x..=self.max_x).contains(&cx) && (self.min_y..=self.max_y).contains(&cy)
    }
}

impl Default for CenteringWindow {
    fn default() -> Self {
        Self {
            min_x: 0.25,
            max_x: 0.75,
            min_y: 0.20,
            max_y: 0.80,
        }
    }
}

/// Head pose and mouth thresholds for the landmark strategy (degrees / ratio)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseThresholds {
    /// `|yaw|` above this is looking away sideways
    pub max_abs_yaw: f64,
    /// Pitch above this is looking down
    pub max_pitch_down: f64,
    /// Pitch below this (negative) is looking up
    pub min_pitch_up: f64,
    /// Lip separation / face height above this is an open mouth
    pub mouth_open_ratio: f64,
}

impl Default for PoseThresholds {
    fn default() -> Self {
        Self {
            max_abs_yaw: 25.0,
            max_pitch_down: 20.0,
            min_pitch_up: -25.0,
            mouth_open_ratio: 0.08,
        }
    }
}

/// Vision analyzer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Consecutive off-center frames before "Looking Away Frequently"
    pub look_away_grace: u32,
    pub centering: CenteringWindow,
    pub pose: PoseThresholds,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            look_away_grace: 4,
            centering: CenteringWindow::default(),
            pose: PoseThresholds::default(),
        }
    }
}

/// Cooldown gate settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    /// Minimum seconds between two accepted violations of one category
    pub min_gap_secs: f64,
}

impl CooldownConfig {
    /// The minimum gap as a chrono duration (millisecond resolution)
    pub fn min_gap(&self) -> Duration {
        Duration::milliseconds((self.min_gap_secs * 1000.0).round() as i64)
    }
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self { min_gap_secs: 2.5 }
    }
}

/// Escalation state machine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Warnings at which the session is terminated
    pub max_warnings: u32,
    /// Reason carried by the termination notice
    pub termination_reason: String,
    /// Where the client is sent after termination
    pub redirect: String,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            max_warnings: 6,
            termination_reason: "Max warnings exceeded. Exam Terminated.".to_string(),
            redirect: "/student_dashboard".to_string(),
        }
    }
}

/// Top-level proctoring configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProctorConfig {
    pub audio: AudioConfig,
    pub vision: VisionConfig,
    pub cooldown: CooldownConfig,
    pub escalation: EscalationConfig,
}

impl ProctorConfig {
    /// Parse a (possibly partial) TOML document over the defaults
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Defaults with `PROCTOR_*` environment overrides applied
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply `PROCTOR_*` environment overrides on top of this config
    pub fn with_env(self) -> Self {
        self.with_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup. Unparsable values are ignored.
    pub fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(n) = lookup("PROCTOR_AUDIO_THRESHOLD").and_then(|v| v.parse().ok()) {
            self.audio.threshold = n;
        }
        if let Some(n) = lookup("PROCTOR_AUDIO_STREAK").and_then(|v| v.parse().ok()) {
            self.audio.required_streak = n;
        }
        if let Some(n) = lookup("PROCTOR_COOLDOWN_SECS").and_then(|v| v.parse().ok()) {
            self.cooldown.min_gap_secs = n;
        }
        if let Some(n) = lookup("PROCTOR_LOOK_AWAY_GRACE").and_then(|v| v.parse().ok()) {
            self.vision.look_away_grace = n;
        }
        if let Some(n) = lookup("PROCTOR_MAX_WARNINGS").and_then(|v| v.parse().ok()) {
            self.escalation.max_warnings = n;
        }
        if let Some(redirect) = lookup("PROCTOR_REDIRECT") {
            self.escalation.redirect = redirect;
        }
        self
    }

    /// Reject values the analyzers cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.audio.threshold > 0.0 && self.audio.threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "audio.threshold must be in (0, 1], got {}",
                self.audio.threshold
            )));
        }
        if self.audio.required_streak == 0 {
            return Err(ConfigError::Invalid(
                "audio.required_streak must be at least 1".to_string(),
            ));
        }
        if self.vision.look_away_grace == 0 {
            return Err(ConfigError::Invalid(
                "vision.look_away_grace must be at least 1".to_string(),
            ));
        }
        let window = &self.vision.centering;
        if window.min_x > window.max_x || window.min_y > window.max_y {
            return Err(ConfigError::Invalid(
                "vision.centering bounds are inverted".to_string(),
            ));
        }
        if !self.cooldown.min_gap_secs.is_finite() || self.cooldown.min_gap_secs < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "cooldown.min_gap_secs must be non-negative, got {}",
                self.cooldown.min_gap_secs
            )));
        }
        if self.escalation.max_warnings == 0 {
            return Err(ConfigError::Invalid(
                "escalation.max_warnings must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
