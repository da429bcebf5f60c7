//! Error types for TUG Sense

use thiserror::Error;

/// Errors that can occur at the engine's entry points.
///
/// Sample processing itself never fails; all arithmetic on sensor data is
/// total. These errors cover configuration, calibration, and lifecycle misuse.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid gravity calibration: {0}")]
    InvalidCalibration(String),

    #[error("Engine is not calibrated; call calibrate() before start()")]
    NotCalibrated,

    #[error("Test already started; create a new engine per attempt")]
    AlreadyStarted,

    #[error("Report is not ready; the test has not completed")]
    ReportNotReady,
}
