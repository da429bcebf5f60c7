//! Core types for the TUG Sense engine
//!
//! This module defines the data that flows through the engine: raw motion
//! samples, detected steps, phases and phase transitions, per-phase
//! accumulators, and the live state snapshot handed to the host.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A 3D sample: acceleration in m/s² or rotation rate in deg/s.
///
/// Immutable value type. Components are plain f64; non-finite values coming
/// from the host sensor layer are sanitized to 0 at the engine boundary so
/// that all downstream arithmetic stays total.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Returns a copy with every non-finite component replaced by 0.
    pub fn sanitized(self) -> Self {
        fn clean(v: f64) -> f64 {
            if v.is_finite() {
                v
            } else {
                0.0
            }
        }
        Self {
            x: clean(self.x),
            y: clean(self.y),
            z: clean(self.z),
        }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit vector in the same direction. A near-zero vector normalizes to
    /// the zero vector rather than erroring, keeping downstream math total.
    pub fn normalized(&self) -> Vec3 {
        let mag = self.magnitude();
        if mag < 1e-9 {
            Vec3::ZERO
        } else {
            Vec3::new(self.x / mag, self.y / mag, self.z / mag)
        }
    }

    pub fn dot(&self, other: &Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn sub(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn scale(&self, factor: f64) -> Vec3 {
        Vec3::new(self.x * factor, self.y * factor, self.z * factor)
    }
}

/// One raw motion sample delivered by the host sensor subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    /// Delivery timestamp (wall clock, milliseconds).
    pub timestamp_ms: u64,
    /// Acceleration including gravity (m/s², device frame).
    pub accel: Vec3,
    /// Rotation rate (deg/s, device frame).
    pub rotation: Vec3,
}

impl MotionSample {
    pub fn new(timestamp_ms: u64, accel: Vec3, rotation: Vec3) -> Self {
        Self {
            timestamp_ms,
            accel,
            rotation,
        }
    }
}

/// Phase of the Timed Up & Go test.
///
/// `TurningSit` is declared but never targeted by any transition rule;
/// `WalkingBack` goes straight to `SittingDown`. It is kept as a reserved
/// label so its slot in reports reads 0 rather than disappearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    StandingUp,
    WalkingOut,
    TurningOut,
    WalkingBack,
    TurningSit,
    SittingDown,
    Complete,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::StandingUp => "standing_up",
            Phase::WalkingOut => "walking_out",
            Phase::TurningOut => "turning_out",
            Phase::WalkingBack => "walking_back",
            Phase::TurningSit => "turning_sit",
            Phase::SittingDown => "sitting_down",
            Phase::Complete => "complete",
        }
    }

    /// Terminal phase: no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete)
    }

    /// Phases during which gait data (steps, distance, yaw) is accumulated.
    pub fn is_gait(&self) -> bool {
        matches!(
            self,
            Phase::WalkingOut | Phase::TurningOut | Phase::WalkingBack | Phase::TurningSit
        )
    }
}

/// What caused a phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTrigger {
    TestStart,
    StandupDetected,
    StandupTimeout,
    WalkOutComplete,
    TurnComplete,
    TurnTimeout,
    WalkBackComplete,
    SittingDetected,
    SitdownTimeout,
}

impl TransitionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionTrigger::TestStart => "test_start",
            TransitionTrigger::StandupDetected => "standup_detected",
            TransitionTrigger::StandupTimeout => "standup_timeout",
            TransitionTrigger::WalkOutComplete => "walk_out_complete",
            TransitionTrigger::TurnComplete => "turn_complete",
            TransitionTrigger::TurnTimeout => "turn_timeout",
            TransitionTrigger::WalkBackComplete => "walk_back_complete",
            TransitionTrigger::SittingDetected => "sitting_detected",
            TransitionTrigger::SitdownTimeout => "sitdown_timeout",
        }
    }

    /// Forced transitions fired by a safety timeout rather than detection.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            TransitionTrigger::StandupTimeout
                | TransitionTrigger::TurnTimeout
                | TransitionTrigger::SitdownTimeout
        )
    }
}

/// One immutable entry in the phase transition log.
///
/// The ordered sequence of these entries is the authoritative record of what
/// happened during a test and when.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    /// Elapsed milliseconds since test start.
    pub t_ms: u64,
    pub trigger: TransitionTrigger,
}

/// One detected step event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedStep {
    /// Elapsed milliseconds since test start (timestamp of the peak).
    pub t_ms: u64,
    /// Smoothed vertical acceleration at the peak (m/s²).
    pub peak_accel: f64,
    /// Smoothed vertical acceleration at the preceding valley (m/s²).
    pub valley_accel: f64,
    /// Weinberg stride length estimate (meters).
    pub stride_length_m: f64,
}

/// Per-phase mutable gait counters, reset whenever the phase starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseAccumulator {
    pub steps: u32,
    pub distance_m: f64,
    pub stride_lengths: Vec<f64>,
    pub cumulative_yaw_deg: f64,
}

impl PhaseAccumulator {
    pub fn reset(&mut self) {
        self.steps = 0;
        self.distance_m = 0.0;
        self.stride_lengths.clear();
        self.cumulative_yaw_deg = 0.0;
    }

    pub fn record_step(&mut self, step: &DetectedStep) {
        self.steps += 1;
        self.distance_m += step.stride_length_m;
        self.stride_lengths.push(step.stride_length_m);
    }
}

/// Accumulators for every gait phase of one test attempt.
///
/// `standing_up`/`sitting_down` accumulate no gait data and have no slot.
#[derive(Debug, Clone, Default)]
pub struct GaitAccumulators {
    pub walking_out: PhaseAccumulator,
    pub turning_out: PhaseAccumulator,
    pub walking_back: PhaseAccumulator,
    pub turning_sit: PhaseAccumulator,
}

impl GaitAccumulators {
    pub fn for_phase(&self, phase: Phase) -> Option<&PhaseAccumulator> {
        match phase {
            Phase::WalkingOut => Some(&self.walking_out),
            Phase::TurningOut => Some(&self.turning_out),
            Phase::WalkingBack => Some(&self.walking_back),
            Phase::TurningSit => Some(&self.turning_sit),
            _ => None,
        }
    }

    pub fn for_phase_mut(&mut self, phase: Phase) -> Option<&mut PhaseAccumulator> {
        match phase {
            Phase::WalkingOut => Some(&mut self.walking_out),
            Phase::TurningOut => Some(&mut self.turning_out),
            Phase::WalkingBack => Some(&mut self.walking_back),
            Phase::TurningSit => Some(&mut self.turning_sit),
            _ => None,
        }
    }
}

/// Read-only snapshot of the running test, throttled for live UI display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub phase: Phase,
    /// Elapsed milliseconds since test start.
    pub elapsed_ms: u64,
    /// Total steps across both walking phases so far.
    pub steps: u32,
    /// Total distance across both walking phases so far (meters).
    pub distance_m: f64,
    /// Signed cumulative yaw of the outbound turn (degrees).
    pub cumulative_yaw_deg: f64,
    /// Display-smoothed yaw rate (deg/s).
    pub yaw_rate_dps: f64,
    /// Latest tilt relative to the rest orientation (degrees).
    pub tilt_deg: f64,
    /// Latest gravity-removed acceleration magnitude (m/s²).
    pub accel_magnitude: f64,
}

/// Which pocket the phone is carried in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PocketSide {
    Left,
    Right,
    Unspecified,
}

/// Walking aid used during the attempt, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkingAid {
    None,
    Cane,
    Walker,
    Other,
}

/// Session setup captured by the host before the test starts.
///
/// Passed into the engine explicitly rather than read from ambient state;
/// echoed back verbatim in the final report for provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Unique id for this test attempt.
    pub attempt_id: Uuid,
    /// Host device identifier.
    pub device_id: String,
    pub pocket_side: PocketSide,
    pub walking_aid: WalkingAid,
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            device_id: "unknown".to_string(),
            pocket_side: PocketSide::Unspecified,
            walking_aid: WalkingAid::None,
        }
    }
}
