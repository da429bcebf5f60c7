//! Engine configuration
//!
//! All detection constants are supplied externally, never computed. Defaults
//! target a phone carried in a trouser pocket sampling at roughly 50 Hz.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Cap on the wall-clock delta between consecutive samples (milliseconds).
///
/// Prevents large spurious integration jumps across sensor delivery gaps.
pub const MAX_SAMPLE_DT_MS: u64 = 100;

/// Stand-up phase detection constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandUpConfig {
    /// Gravity-removed acceleration magnitude that counts as the stand-up
    /// effort spike (m/s²).
    pub accel_threshold: f64,
    /// Tilt relative to the rest orientation that counts as "rising" (deg).
    pub tilt_threshold_deg: f64,
    /// How long tilt must stay continuously above the threshold (ms).
    pub tilt_hold_ms: u64,
    /// Minimum phase duration before the transition may fire (ms).
    pub min_duration_ms: u64,
    /// Safety timeout: forced transition after this long (ms).
    pub max_duration_ms: u64,
}

impl Default for StandUpConfig {
    fn default() -> Self {
        Self {
            accel_threshold: 1.2,    // gentle rise still clears this
            tilt_threshold_deg: 20.0,
            tilt_hold_ms: 400,
            min_duration_ms: 500,
            max_duration_ms: 10_000,
        }
    }
}

/// Walking phase constants. Walking phases are bounded by distance, not time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    /// Distance that completes each walking leg (meters). The clinical TUG
    /// course is 3 m each way.
    pub target_distance_m: f64,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            target_distance_m: 3.0,
        }
    }
}

/// Turn phase detection constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Cumulative rotation magnitude required before the turn may complete (deg).
    pub min_turn_angle_deg: f64,
    /// Floor for the adaptive exit threshold (deg/s RMS).
    pub exit_threshold_floor: f64,
    /// Scale applied to the walking-phase 75th-percentile |yaw| to derive the
    /// adaptive exit threshold.
    pub exit_threshold_scale: f64,
    /// Window length of the yaw-rate RMS estimator (samples).
    pub rms_window: usize,
    /// How long rotational activity must stay below the exit threshold (ms).
    pub settle_duration_ms: u64,
    /// Safety timeout: forced transition after this long (ms).
    pub max_duration_ms: u64,
    /// Ring-buffer capacity for yaw-rate statistics collected while walking
    /// out (samples).
    pub yaw_stats_capacity: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            min_turn_angle_deg: 120.0, // a 180° turn with generous slack
            exit_threshold_floor: 12.0,
            exit_threshold_scale: 0.6,
            rms_window: 25, // ~500ms at 50Hz
            settle_duration_ms: 300,
            max_duration_ms: 8_000,
            yaw_stats_capacity: 256,
        }
    }
}

/// Sit-down phase detection constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SitDownConfig {
    /// Gravity-removed acceleration magnitude of the seat impact (m/s²).
    pub spike_threshold: f64,
    /// Magnitude below which the device counts as still (m/s²).
    pub rest_threshold: f64,
    /// How long stillness must persist after the spike to confirm (ms).
    pub rest_duration_ms: u64,
    /// Safety timeout: forced completion after this long (ms).
    pub max_duration_ms: u64,
}

impl Default for SitDownConfig {
    fn default() -> Self {
        Self {
            spike_threshold: 2.5,
            rest_threshold: 0.5,
            rest_duration_ms: 800,
            max_duration_ms: 10_000,
        }
    }
}

/// Step detector constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepDetectorConfig {
    /// Moving-average window over vertical acceleration (samples).
    pub smoothing_window: usize,
    /// Initial peak-valley swing threshold (m/s²); restored by `reset()`.
    pub initial_threshold: f64,
    /// Exponential update rate for the adaptive threshold (0-1].
    pub adaptation_rate: f64,
    /// Minimum interval between accepted steps (ms).
    pub min_step_interval_ms: u64,
    /// Maximum valley-to-peak span; longer swings are slow drifts, not steps (ms).
    pub max_peak_to_valley_ms: u64,
    /// Weinberg stride-model constant K.
    pub stride_k: f64,
}

impl Default for StepDetectorConfig {
    fn default() -> Self {
        Self {
            smoothing_window: 5,
            initial_threshold: 1.0,
            adaptation_rate: 0.125,
            min_step_interval_ms: 300, // max ~3.3 steps/sec
            max_peak_to_valley_ms: 400,
            stride_k: 0.45,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-axis exponential smoothing factor of the gravity estimate (0-1].
    pub gravity_alpha: f64,
    /// Smoothing factor for the UI-facing yaw-rate display (0-1]. Separate
    /// from the turn bias/threshold calibration.
    pub yaw_smoothing_alpha: f64,
    /// Minimum interval between `on_state_update` emissions (ms).
    pub ui_update_interval_ms: u64,
    pub stand_up: StandUpConfig,
    pub walk: WalkConfig,
    pub turn: TurnConfig,
    pub sit_down: SitDownConfig,
    pub step: StepDetectorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gravity_alpha: 0.05, // ~400ms time constant at 50Hz
            yaw_smoothing_alpha: 0.3,
            ui_update_interval_ms: 100,
            stand_up: StandUpConfig::default(),
            walk: WalkConfig::default(),
            turn: TurnConfig::default(),
            sit_down: SitDownConfig::default(),
            step: StepDetectorConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every constant for a sane range.
    pub fn validate(&self) -> Result<(), EngineError> {
        fn alpha(name: &str, v: f64) -> Result<(), EngineError> {
            if v > 0.0 && v <= 1.0 {
                Ok(())
            } else {
                Err(EngineError::InvalidConfig(format!(
                    "{name} must be in (0, 1], got {v}"
                )))
            }
        }
        fn positive(name: &str, v: f64) -> Result<(), EngineError> {
            if v > 0.0 {
                Ok(())
            } else {
                Err(EngineError::InvalidConfig(format!(
                    "{name} must be positive, got {v}"
                )))
            }
        }

        alpha("gravity_alpha", self.gravity_alpha)?;
        alpha("yaw_smoothing_alpha", self.yaw_smoothing_alpha)?;
        alpha("step.adaptation_rate", self.step.adaptation_rate)?;

        positive("stand_up.accel_threshold", self.stand_up.accel_threshold)?;
        positive("stand_up.tilt_threshold_deg", self.stand_up.tilt_threshold_deg)?;
        positive("stand_up.max_duration_ms", self.stand_up.max_duration_ms as f64)?;
        positive("walk.target_distance_m", self.walk.target_distance_m)?;
        positive("turn.min_turn_angle_deg", self.turn.min_turn_angle_deg)?;
        positive("turn.exit_threshold_floor", self.turn.exit_threshold_floor)?;
        positive("turn.exit_threshold_scale", self.turn.exit_threshold_scale)?;
        positive("turn.max_duration_ms", self.turn.max_duration_ms as f64)?;
        positive("sit_down.spike_threshold", self.sit_down.spike_threshold)?;
        positive("sit_down.rest_threshold", self.sit_down.rest_threshold)?;
        positive("sit_down.max_duration_ms", self.sit_down.max_duration_ms as f64)?;
        positive("step.initial_threshold", self.step.initial_threshold)?;
        positive("step.stride_k", self.step.stride_k)?;

        if self.step.smoothing_window == 0 {
            return Err(EngineError::InvalidConfig(
                "step.smoothing_window must be at least 1".to_string(),
            ));
        }
        if self.turn.rms_window == 0 {
            return Err(EngineError::InvalidConfig(
                "turn.rms_window must be at least 1".to_string(),
            ));
        }
        if self.turn.yaw_stats_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "turn.yaw_stats_capacity must be at least 1".to_string(),
            ));
        }
        if self.sit_down.rest_threshold >= self.sit_down.spike_threshold {
            return Err(EngineError::InvalidConfig(
                "sit_down.rest_threshold must be below sit_down.spike_threshold".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_alpha() {
        let mut config = EngineConfig::default();
        config.gravity_alpha = 0.0;
        assert!(config.validate().is_err());
        config.gravity_alpha = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_windows() {
        let mut config = EngineConfig::default();
        config.step.smoothing_window = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.turn.rms_window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_rest_above_spike() {
        let mut config = EngineConfig::default();
        config.sit_down.rest_threshold = config.sit_down.spike_threshold + 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_partial_override() {
        let config = EngineConfig::from_json(
            r#"{"walk": {"target_distance_m": 4.0}, "gravity_alpha": 0.1}"#,
        )
        .unwrap();
        assert!((config.walk.target_distance_m - 4.0).abs() < 1e-12);
        assert!((config.gravity_alpha - 0.1).abs() < 1e-12);
        // Untouched sections keep their defaults
        assert_eq!(config.step, StepDetectorConfig::default());
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        assert!(EngineConfig::from_json("not json").is_err());
        assert!(EngineConfig::from_json(r#"{"gravity_alpha": -1.0}"#).is_err());
    }
}
