//! # TUG Sense
//!
//! On-device sensor-fusion engine for the Timed Up & Go (TUG) mobility test.
//!
//! The engine consumes a serial stream of accelerometer + gyroscope samples
//! from a phone carried in a trouser pocket and detects and times the phases
//! of one TUG attempt: standing up from a chair, walking out, turning,
//! walking back, and sitting down. Total time is the primary clinical
//! output; per-phase durations, step counts, distance, and turn angles are
//! the secondary ones.
//!
//! ## Usage
//!
//! ```no_run
//! use tug_sense::config::EngineConfig;
//! use tug_sense::engine::{NullCallbacks, TugEngine};
//! use tug_sense::types::{MotionSample, SessionInfo, Vec3};
//!
//! # fn main() -> Result<(), tug_sense::error::EngineError> {
//! let mut engine = TugEngine::new(
//!     EngineConfig::default(),
//!     SessionInfo::default(),
//!     NullCallbacks,
//! )?;
//! engine.calibrate(Vec3::new(0.1, 0.2, 9.78))?;
//! engine.start()?;
//!
//! // Feed sensor samples as they arrive (typically 50-100 Hz).
//! engine.handle_motion_event(MotionSample::new(
//!     0,
//!     Vec3::new(0.1, 0.2, 9.80),
//!     Vec3::new(0.0, 0.0, 1.5),
//! ));
//!
//! if engine.is_complete() {
//!     println!("{}", engine.report()?.to_json()?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The engine is single-threaded and clock-free: each call to
//! [`engine::TugEngine::handle_motion_event`] runs to completion, and all
//! timing derives from sample timestamps.

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod signal;
pub mod step_detection;
pub mod types;

#[cfg(feature = "ffi")]
pub mod ffi;

pub use config::EngineConfig;
pub use engine::{NullCallbacks, TugCallbacks, TugEngine};
pub use error::EngineError;
pub use metrics::TugReport;
pub use types::{
    DetectedStep, EngineState, MotionSample, Phase, PhaseTransition, SessionInfo,
    TransitionTrigger, Vec3,
};

/// Engine version, stamped into every report.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name, stamped into every report.
pub const PRODUCER_NAME: &str = "tug-sense";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_matches_manifest() {
        assert_eq!(ENGINE_VERSION, env!("CARGO_PKG_VERSION"));
        assert!(!ENGINE_VERSION.is_empty());
    }

    #[test]
    fn test_producer_name() {
        assert_eq!(PRODUCER_NAME, "tug-sense");
    }
}
