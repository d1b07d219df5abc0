//! Audio Analyzer — threshold plus consecutive-sample debouncing
//!
//! The client reports a normalized loudness scalar in `[0, 1]` per tick. A
//! single loud sample is ignored; `required_streak` consecutive samples at or
//! above the threshold produce one candidate and restart the streak.

use serde_json::Value;
use tracing::debug;

use crate::config::AudioConfig;
use crate::cooldown::ViolationCategory;
use crate::dispatcher::Candidate;
use crate::session::EphemeralState;

pub const NOISE_MESSAGE: &str = "Background Noise / Talking detected";

/// Debounced loudness classifier
#[derive(Debug, Clone)]
pub struct AudioAnalyzer {
    threshold: f64,
    required_streak: u32,
}

impl AudioAnalyzer {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            threshold: config.threshold,
            required_streak: config.required_streak.max(1),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Classify one loudness sample.
    ///
    /// Missing or non-finite samples leave `noise_streak` untouched.
    pub fn analyze(&self, state: &mut EphemeralState, level: Option<f64>) -> Option<Candidate> {
        let level = level.filter(|l| l.is_finite())?;

        if level < self.threshold {
            state.noise_streak = 0;
            return None;
        }

        state.noise_streak += 1;
        if state.noise_streak < self.required_streak {
            debug!(
                streak = state.noise_streak,
                level, "Loud sample, waiting for streak"
            );
            return None;
        }

        state.noise_streak = 0;
        Some(Candidate::new(ViolationCategory::Audio, NOISE_MESSAGE))
    }
}

impl Default for AudioAnalyzer {
    fn default() -> Self {
        Self::new(&AudioConfig::default())
    }
}

/// Interpret a client-supplied audio level.
///
/// Accepts JSON numbers and numeric strings; anything else is non-numeric.
pub fn parse_audio_level(value: &Value) -> Option<f64> {
    let level = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    level.is_finite().then_some(level)
}

/// Normalized loudness from byte frequency magnitudes (as produced by a
/// browser `AnalyserNode`): the mean bin value divided by 255.
pub fn level_from_spectrum(bins: &[u8]) -> f64 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u64 = bins.iter().map(|&b| u64::from(b)).sum();
    (sum as f64 / bins.len() as f64) / 255.0
}
