//! Engine configuration — initial session values and tuning constants.
//!
//! Every field has a default, so a config document only needs the keys it
//! wants to override:
//!
//! ```json
//! { "masterGain": 0.7, "releaseSeconds": 0.8 }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Master bus gain [0, 1].
    pub master_gain: f64,
    /// Per-strike release time in seconds.
    pub release_seconds: f64,
    /// Low-pass cutoff the damping sweep settles on, in Hz.
    pub damping_cutoff_hz: f64,
    /// Length of each prerendered tone in seconds.
    pub tone_duration_seconds: f64,
    /// Decay time of the live fallback tone in seconds.
    pub fallback_decay_seconds: f64,
    /// Extra time a voice stays alive after its envelope completes.
    pub stop_margin_seconds: f64,
    pub limiter: LimiterConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            master_gain: 0.9,
            release_seconds: 1.2,
            damping_cutoff_hz: 3000.0,
            tone_duration_seconds: 2.0,
            fallback_decay_seconds: 0.6,
            stop_margin_seconds: 0.05,
            limiter: LimiterConfig::default(),
        }
    }
}

/// Master bus limiter settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LimiterConfig {
    /// Threshold in dB.
    pub threshold_db: f64,
    /// Knee width in dB (0 = hard knee).
    pub knee_db: f64,
    pub ratio: f64,
    /// Attack time in seconds.
    pub attack: f64,
    /// Release time in seconds.
    pub release: f64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        LimiterConfig {
            threshold_db: -3.0,
            knee_db: 0.0,
            ratio: 20.0,
            attack: 0.001,
            release: 0.1,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config document and validate it.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&self.master_gain) {
            return Err(EngineError::Config(format!(
                "masterGain {} outside [0, 1]",
                self.master_gain
            )));
        }
        let positive = [
            ("releaseSeconds", self.release_seconds),
            ("dampingCutoffHz", self.damping_cutoff_hz),
            ("toneDurationSeconds", self.tone_duration_seconds),
            ("fallbackDecaySeconds", self.fallback_decay_seconds),
            ("limiter.ratio", self.limiter.ratio),
            ("limiter.attack", self.limiter.attack),
            ("limiter.release", self.limiter.release),
        ];
        for (key, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(EngineError::Config(format!("{key} must be positive, got {value}")));
            }
        }
        if !(self.stop_margin_seconds.is_finite() && self.stop_margin_seconds >= 0.0) {
            return Err(EngineError::Config(format!(
                "stopMarginSeconds must not be negative, got {}",
                self.stop_margin_seconds
            )));
        }
        Ok(())
    }
}
