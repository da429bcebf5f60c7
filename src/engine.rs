//! TUG phase engine
//!
//! The orchestrator of one Timed Up & Go attempt: owns calibration state,
//! per-phase detection logic, the transition log, and the safety timeouts.
//! Constructed once per attempt, calibrated, started, and then driven
//! exclusively by a serial stream of motion samples; it terminates exactly
//! once, via detection or timeout.
//!
//! Processing of one sample runs to completion before the next is accepted;
//! there is no internal threading, locking, or clock. Elapsed time is
//! anchored at the first sample processed after `start()`, and safety
//! timeouts are evaluated against sample timestamps.

use std::collections::VecDeque;

use log::{debug, warn};

use crate::config::{EngineConfig, MAX_SAMPLE_DT_MS};
use crate::error::EngineError;
use crate::metrics::{self, TugReport};
use crate::signal::{self, SlidingWindowRms};
use crate::step_detection::StepDetector;
use crate::types::{
    DetectedStep, EngineState, GaitAccumulators, MotionSample, Phase, PhaseTransition,
    SessionInfo, TransitionTrigger, Vec3,
};

/// Side effects the host wires to the engine.
///
/// All methods are invoked synchronously from within sample processing and
/// default to no-ops; the engine itself carries no UI or I/O concern.
pub trait TugCallbacks {
    /// Live state snapshot, throttled to the configured UI interval.
    fn on_state_update(&mut self, _state: &EngineState) {}

    /// Fired once per phase transition.
    fn on_phase_change(&mut self, _from: Phase, _to: Phase) {}

    /// Fired once per accepted step.
    fn on_step_detected(&mut self, _step: &DetectedStep) {}

    /// Fired exactly once, when the outbound walk first reaches the target
    /// distance (the host plays the turn audio/haptic cue).
    fn on_turn_cue(&mut self) {}

    /// Fired exactly once per test. `final_elapsed_ms` may be backdated to
    /// the sit-down impact spike.
    fn on_complete(&mut self, _final_elapsed_ms: u64) {}
}

/// Callback sink for hosts that only poll `state()` and `report()`.
pub struct NullCallbacks;

impl TugCallbacks for NullCallbacks {}

/// Sensor-fusion engine for one TUG attempt.
pub struct TugEngine<C: TugCallbacks> {
    config: EngineConfig,
    session: SessionInfo,
    callbacks: C,

    phase: Phase,
    calibrated: bool,
    gravity: Vec3,
    rest_gravity: Vec3,

    // Clock anchoring
    t0_ms: Option<u64>,
    last_sample_ms: Option<u64>,
    last_elapsed_ms: u64,
    phase_started_at_ms: u64,

    transitions: Vec<PhaseTransition>,
    accumulators: GaitAccumulators,
    step_detector: StepDetector,

    // Stand-up phase
    standup_spike_seen: bool,
    tilt_above_since: Option<u64>,

    // Walking out
    turn_cue_fired: bool,
    yaw_stats: VecDeque<f64>,

    // Turning
    yaw_bias: f64,
    turn_exit_threshold: f64,
    turn_rms: SlidingWindowRms,
    turn_settled_since: Option<u64>,

    // Sitting down
    sit_spike_at: Option<u64>,
    sit_still_since: Option<u64>,

    // Display-only signals
    smoothed_yaw: f64,
    last_tilt_deg: f64,
    last_accel_magnitude: f64,
    last_ui_emit: Option<u64>,

    final_elapsed_ms: Option<u64>,
}

impl<C: TugCallbacks> TugEngine<C> {
    /// Build an engine for one attempt. Rejects invalid configuration.
    pub fn new(
        config: EngineConfig,
        session: SessionInfo,
        callbacks: C,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let step_detector = StepDetector::new(config.step.clone());
        let turn_rms = SlidingWindowRms::new(config.turn.rms_window);
        let exit_floor = config.turn.exit_threshold_floor;
        Ok(Self {
            config,
            session,
            callbacks,
            phase: Phase::Idle,
            calibrated: false,
            gravity: Vec3::ZERO,
            rest_gravity: Vec3::ZERO,
            t0_ms: None,
            last_sample_ms: None,
            last_elapsed_ms: 0,
            phase_started_at_ms: 0,
            transitions: Vec::new(),
            accumulators: GaitAccumulators::default(),
            step_detector,
            standup_spike_seen: false,
            tilt_above_since: None,
            turn_cue_fired: false,
            yaw_stats: VecDeque::new(),
            yaw_bias: 0.0,
            turn_exit_threshold: exit_floor,
            turn_rms,
            turn_settled_since: None,
            sit_spike_at: None,
            sit_still_since: None,
            smoothed_yaw: 0.0,
            last_tilt_deg: 0.0,
            last_accel_magnitude: 0.0,
            last_ui_emit: None,
            final_elapsed_ms: None,
        })
    }

    /// One-time pre-test gravity calibration.
    ///
    /// The estimate seeds the running gravity filter and is frozen as the
    /// rest orientation that tilt is measured against.
    pub fn calibrate(&mut self, gravity_estimate: Vec3) -> Result<(), EngineError> {
        if self.phase != Phase::Idle {
            return Err(EngineError::AlreadyStarted);
        }
        let estimate = gravity_estimate.sanitized();
        if estimate.magnitude() < 1e-6 {
            return Err(EngineError::InvalidCalibration(
                "gravity estimate is zero or non-finite".to_string(),
            ));
        }
        self.gravity = estimate;
        self.rest_gravity = estimate;
        self.calibrated = true;
        Ok(())
    }

    /// Begin the test: `idle -> standing_up`.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if !self.calibrated {
            return Err(EngineError::NotCalibrated);
        }
        if self.phase != Phase::Idle {
            return Err(EngineError::AlreadyStarted);
        }
        self.transition_to(Phase::StandingUp, TransitionTrigger::TestStart, 0);
        Ok(())
    }

    /// Feed one motion sample. Never fails; samples arriving before `start()`
    /// or after completion are ignored.
    pub fn handle_motion_event(&mut self, sample: MotionSample) {
        if matches!(self.phase, Phase::Idle | Phase::Complete) {
            return;
        }

        let accel = sample.accel.sanitized();
        let rotation = sample.rotation.sanitized();
        let t0 = *self.t0_ms.get_or_insert(sample.timestamp_ms);
        let t = sample.timestamp_ms.saturating_sub(t0);

        // Fixed per-sample order: gravity -> decompose -> tilt -> yaw -> dt.
        self.gravity = signal::low_pass(accel, self.gravity, self.config.gravity_alpha);
        let motion = signal::decompose(accel, self.gravity);
        let tilt = signal::tilt_deg(self.gravity, self.rest_gravity);
        let yaw = signal::yaw_rate(rotation, self.gravity);
        let dt_ms = self
            .last_sample_ms
            .map_or(0, |prev| sample.timestamp_ms.saturating_sub(prev).min(MAX_SAMPLE_DT_MS));
        self.last_sample_ms = Some(sample.timestamp_ms);
        self.last_elapsed_ms = t;

        // Display smoothing only; the turn calibration uses raw yaw samples.
        self.smoothed_yaw += self.config.yaw_smoothing_alpha * (yaw - self.smoothed_yaw);
        self.last_tilt_deg = tilt;
        self.last_accel_magnitude = motion.magnitude;

        if self.phase == Phase::WalkingOut {
            if self.yaw_stats.len() == self.config.turn.yaw_stats_capacity {
                self.yaw_stats.pop_front();
            }
            self.yaw_stats.push_back(yaw);
        }

        if !self.check_timeout(t) {
            match self.phase {
                Phase::StandingUp => self.handle_standing_up(t, motion.magnitude, tilt),
                Phase::WalkingOut | Phase::WalkingBack => self.handle_walking(t, motion.vertical),
                Phase::TurningOut => self.handle_turning(t, yaw, dt_ms),
                Phase::SittingDown => self.handle_sitting(t, motion.magnitude),
                _ => {}
            }
        }

        let due = self
            .last_ui_emit
            .map_or(true, |last| t.saturating_sub(last) >= self.config.ui_update_interval_ms);
        if due {
            self.last_ui_emit = Some(t);
            let snapshot = self.state();
            self.callbacks.on_state_update(&snapshot);
        }
    }

    /// Live state snapshot.
    pub fn state(&self) -> EngineState {
        EngineState {
            phase: self.phase,
            elapsed_ms: self.last_elapsed_ms,
            steps: self.accumulators.walking_out.steps + self.accumulators.walking_back.steps,
            distance_m: self.accumulators.walking_out.distance_m
                + self.accumulators.walking_back.distance_m,
            cumulative_yaw_deg: self.accumulators.turning_out.cumulative_yaw_deg,
            yaw_rate_dps: self.smoothed_yaw,
            tilt_deg: self.last_tilt_deg,
            accel_magnitude: self.last_accel_magnitude,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }

    /// The ordered, immutable transition log.
    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }

    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    /// The host-side callback sink, for inspection.
    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    pub fn callbacks_mut(&mut self) -> &mut C {
        &mut self.callbacks
    }

    /// Final elapsed time in milliseconds, once complete. Backdated to the
    /// sit-down impact when completion came via `sitting_detected`.
    pub fn final_elapsed_ms(&self) -> Option<u64> {
        self.final_elapsed_ms
    }

    /// Aggregate the transition log and accumulators into the flat report.
    /// Ready only once the test has completed.
    pub fn report(&self) -> Result<TugReport, EngineError> {
        let stop_ms = self.final_elapsed_ms.ok_or(EngineError::ReportNotReady)?;
        Ok(metrics::aggregate(
            &self.session,
            &self.transitions,
            &self.accumulators,
            stop_ms,
        ))
    }

    // ------------------------------------------------------------------
    // Phase handlers
    // ------------------------------------------------------------------

    fn handle_standing_up(&mut self, t: u64, accel_magnitude: f64, tilt: f64) {
        let cfg = &self.config.stand_up;
        if accel_magnitude > cfg.accel_threshold {
            self.standup_spike_seen = true;
        }
        if tilt > cfg.tilt_threshold_deg {
            self.tilt_above_since.get_or_insert(t);
        } else {
            self.tilt_above_since = None;
        }

        let tilt_held = self
            .tilt_above_since
            .map_or(false, |since| t.saturating_sub(since) >= cfg.tilt_hold_ms);
        let min_elapsed = t.saturating_sub(self.phase_started_at_ms) >= cfg.min_duration_ms;

        if self.standup_spike_seen && tilt_held && min_elapsed {
            self.transition_to(Phase::WalkingOut, TransitionTrigger::StandupDetected, t);
        }
    }

    fn handle_walking(&mut self, t: u64, vertical_accel: f64) {
        let Some(step) = self.step_detector.process_sample(t, vertical_accel) else {
            return;
        };

        let phase = self.phase;
        if let Some(acc) = self.accumulators.for_phase_mut(phase) {
            acc.record_step(&step);
        }
        self.callbacks.on_step_detected(&step);

        let distance = self
            .accumulators
            .for_phase(phase)
            .map_or(0.0, |acc| acc.distance_m);
        if distance < self.config.walk.target_distance_m {
            return;
        }

        match phase {
            Phase::WalkingOut => {
                if !self.turn_cue_fired {
                    self.turn_cue_fired = true;
                    self.callbacks.on_turn_cue();
                }
                self.transition_to(Phase::TurningOut, TransitionTrigger::WalkOutComplete, t);
            }
            Phase::WalkingBack => {
                // Straight to sitting_down; turning_sit is never targeted.
                self.transition_to(Phase::SittingDown, TransitionTrigger::WalkBackComplete, t);
            }
            _ => {}
        }
    }

    fn handle_turning(&mut self, t: u64, yaw: f64, dt_ms: u64) {
        let cfg = &self.config.turn;
        let corrected = yaw - self.yaw_bias;

        // Signed integration: walking's left-right gyro oscillation cancels
        // while a sustained one-directional turn accumulates.
        self.accumulators.turning_out.cumulative_yaw_deg += corrected * dt_ms as f64 / 1000.0;

        let activity = self.turn_rms.update(corrected);
        if activity < self.turn_exit_threshold {
            self.turn_settled_since.get_or_insert(t);
        } else {
            self.turn_settled_since = None;
        }

        let turned =
            self.accumulators.turning_out.cumulative_yaw_deg.abs() >= cfg.min_turn_angle_deg;
        let settled = self
            .turn_settled_since
            .map_or(false, |since| t.saturating_sub(since) >= cfg.settle_duration_ms);

        if turned && settled {
            self.transition_to(Phase::WalkingBack, TransitionTrigger::TurnComplete, t);
        }
    }

    fn handle_sitting(&mut self, t: u64, accel_magnitude: f64) {
        let cfg = &self.config.sit_down;
        if accel_magnitude > cfg.spike_threshold {
            self.sit_spike_at = Some(t);
            self.sit_still_since = None;
        } else if accel_magnitude < cfg.rest_threshold {
            if self.sit_spike_at.is_some() {
                self.sit_still_since.get_or_insert(t);
            }
        } else {
            self.sit_still_since = None;
        }

        if let (Some(spike_at), Some(still_since)) = (self.sit_spike_at, self.sit_still_since) {
            if t.saturating_sub(still_since) >= cfg.rest_duration_ms {
                // The spike is the true sit-down moment; the stillness window
                // is only the evidence that confirms it.
                self.transition_to(Phase::Complete, TransitionTrigger::SittingDetected, spike_at);
            }
        }
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Safety timeouts guarantee forward progress for every phase except the
    /// distance-bounded walking legs. Forced transitions share the normal
    /// transition path.
    fn check_timeout(&mut self, t: u64) -> bool {
        let deadline = match self.phase {
            Phase::StandingUp => Some((
                self.config.stand_up.max_duration_ms,
                Phase::WalkingOut,
                TransitionTrigger::StandupTimeout,
            )),
            Phase::TurningOut => Some((
                self.config.turn.max_duration_ms,
                Phase::WalkingBack,
                TransitionTrigger::TurnTimeout,
            )),
            Phase::SittingDown => Some((
                self.config.sit_down.max_duration_ms,
                Phase::Complete,
                TransitionTrigger::SitdownTimeout,
            )),
            _ => None,
        };
        let Some((max_ms, next, trigger)) = deadline else {
            return false;
        };
        if t.saturating_sub(self.phase_started_at_ms) < max_ms {
            return false;
        }
        warn!(
            "phase {} timed out after {} ms, forcing {}",
            self.phase.as_str(),
            max_ms,
            next.as_str()
        );
        self.transition_to(next, trigger, t);
        true
    }

    fn transition_to(&mut self, to: Phase, trigger: TransitionTrigger, t: u64) {
        if self.phase.is_terminal() {
            return;
        }
        let from = self.phase;
        self.transitions.push(PhaseTransition {
            from,
            to,
            t_ms: t,
            trigger,
        });
        debug!(
            "phase {} -> {} at {} ms ({})",
            from.as_str(),
            to.as_str(),
            t,
            trigger.as_str()
        );
        self.phase = to;
        self.phase_started_at_ms = t;
        self.enter_phase(to);
        self.callbacks.on_phase_change(from, to);

        if to == Phase::Complete {
            self.final_elapsed_ms = Some(t);
            self.callbacks.on_complete(t);
        }
    }

    fn enter_phase(&mut self, phase: Phase) {
        match phase {
            Phase::StandingUp => {
                self.standup_spike_seen = false;
                self.tilt_above_since = None;
            }
            Phase::WalkingOut | Phase::WalkingBack => {
                self.step_detector.reset();
                if let Some(acc) = self.accumulators.for_phase_mut(phase) {
                    acc.reset();
                }
                if phase == Phase::WalkingOut {
                    self.yaw_stats.clear();
                    self.turn_cue_fired = false;
                }
            }
            Phase::TurningOut => {
                self.accumulators.turning_out.reset();
                self.calibrate_turn_exit();
                self.turn_rms.reset();
                self.turn_settled_since = None;
            }
            Phase::SittingDown => {
                self.sit_spike_at = None;
                self.sit_still_since = None;
            }
            _ => {}
        }
    }

    /// Derive the adaptive turn-exit threshold and drift bias from the yaw
    /// rates observed during the preceding outbound walk.
    fn calibrate_turn_exit(&mut self) {
        let cfg = &self.config.turn;
        let signed: Vec<f64> = self.yaw_stats.iter().copied().collect();
        let magnitudes: Vec<f64> = signed.iter().map(|v| v.abs()).collect();
        let p75 = signal::percentile(&magnitudes, 75.0);
        self.turn_exit_threshold = (cfg.exit_threshold_scale * p75).max(cfg.exit_threshold_floor);
        self.yaw_bias = if signed.is_empty() {
            0.0
        } else {
            signed.iter().sum::<f64>() / signed.len() as f64
        };
        debug!(
            "turn calibration: exit threshold {:.2} deg/s, drift bias {:.3} deg/s from {} samples",
            self.turn_exit_threshold,
            self.yaw_bias,
            signed.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        SitDownConfig, StandUpConfig, StepDetectorConfig, TurnConfig, WalkConfig,
    };

    const G: f64 = 9.81;
    const SAMPLE_MS: u64 = 20;

    /// Records every callback invocation for inspection.
    #[derive(Default)]
    struct Recorder {
        state_updates: usize,
        phase_changes: Vec<(Phase, Phase)>,
        steps: Vec<DetectedStep>,
        turn_cues: u32,
        completions: Vec<u64>,
    }

    impl TugCallbacks for Recorder {
        fn on_state_update(&mut self, _state: &EngineState) {
            self.state_updates += 1;
        }
        fn on_phase_change(&mut self, from: Phase, to: Phase) {
            self.phase_changes.push((from, to));
        }
        fn on_step_detected(&mut self, step: &DetectedStep) {
            self.steps.push(step.clone());
        }
        fn on_turn_cue(&mut self) {
            self.turn_cues += 1;
        }
        fn on_complete(&mut self, final_elapsed_ms: u64) {
            self.completions.push(final_elapsed_ms);
        }
    }

    /// Config tuned for the synthetic streams below: slow gravity filter so
    /// the walking waveform passes through nearly unattenuated.
    fn scenario_config() -> EngineConfig {
        EngineConfig {
            gravity_alpha: 0.01,
            yaw_smoothing_alpha: 0.3,
            ui_update_interval_ms: 100,
            stand_up: StandUpConfig {
                accel_threshold: 1.5,
                tilt_threshold_deg: 15.0,
                tilt_hold_ms: 300,
                min_duration_ms: 200,
                max_duration_ms: 20_000,
            },
            walk: WalkConfig {
                target_distance_m: 3.8,
            },
            turn: TurnConfig {
                min_turn_angle_deg: 120.0,
                exit_threshold_floor: 12.0,
                exit_threshold_scale: 0.6,
                rms_window: 10,
                settle_duration_ms: 300,
                max_duration_ms: 20_000,
                yaw_stats_capacity: 512,
            },
            sit_down: SitDownConfig {
                spike_threshold: 4.0,
                rest_threshold: 0.5,
                rest_duration_ms: 600,
                max_duration_ms: 20_000,
            },
            step: StepDetectorConfig {
                smoothing_window: 3,
                initial_threshold: 1.0,
                adaptation_rate: 0.125,
                min_step_interval_ms: 300,
                max_peak_to_valley_ms: 400,
                stride_k: 0.45,
            },
        }
    }

    fn new_engine(config: EngineConfig) -> TugEngine<Recorder> {
        let mut engine =
            TugEngine::new(config, SessionInfo::default(), Recorder::default()).unwrap();
        engine.calibrate(Vec3::new(0.0, 0.0, G)).unwrap();
        engine.start().unwrap();
        engine
    }

    /// Builds the synthetic sample stream, 50 Hz.
    struct StreamBuilder {
        t_ms: u64,
        samples: Vec<MotionSample>,
    }

    impl StreamBuilder {
        fn new() -> Self {
            Self {
                t_ms: 0,
                samples: Vec::new(),
            }
        }

        fn push(&mut self, accel: Vec3, rotation: Vec3) -> u64 {
            let t = self.t_ms;
            self.samples.push(MotionSample::new(t, accel, rotation));
            self.t_ms += SAMPLE_MS;
            t
        }

        fn hold(&mut self, duration_ms: u64, accel: Vec3, rotation: Vec3) {
            for _ in 0..(duration_ms / SAMPLE_MS) {
                self.push(accel, rotation);
            }
        }

        /// Valley-first step cycles on the vertical axis with alternating
        /// left-right yaw oscillation, as pocket walking produces.
        fn walk_cycles(&mut self, cycles: usize) {
            let samples_per_cycle = 25; // 500ms cycles
            for _ in 0..cycles {
                for i in 0..samples_per_cycle {
                    let phase = 2.0 * std::f64::consts::PI * i as f64 / samples_per_cycle as f64;
                    let vertical = -3.0 * phase.sin();
                    let yaw = if i < samples_per_cycle / 2 { 20.0 } else { -20.0 };
                    self.push(Vec3::new(0.0, 0.0, G + vertical), Vec3::new(0.0, 0.0, yaw));
                }
            }
        }
    }

    fn drive(engine: &mut TugEngine<Recorder>, samples: &[MotionSample]) {
        for sample in samples {
            engine.handle_motion_event(*sample);
        }
    }

    #[test]
    fn test_lifecycle_guards() {
        let config = EngineConfig::default();
        let mut engine =
            TugEngine::new(config, SessionInfo::default(), Recorder::default()).unwrap();

        assert!(matches!(engine.start(), Err(EngineError::NotCalibrated)));
        assert!(engine.calibrate(Vec3::ZERO).is_err());
        engine.calibrate(Vec3::new(0.0, 0.0, G)).unwrap();
        engine.start().unwrap();
        assert!(matches!(engine.start(), Err(EngineError::AlreadyStarted)));
        assert!(matches!(
            engine.calibrate(Vec3::new(0.0, 0.0, G)),
            Err(EngineError::AlreadyStarted)
        ));
        assert!(matches!(engine.report(), Err(EngineError::ReportNotReady)));
    }

    #[test]
    fn test_samples_before_start_are_ignored() {
        let mut engine =
            TugEngine::new(EngineConfig::default(), SessionInfo::default(), Recorder::default())
                .unwrap();
        engine.calibrate(Vec3::new(0.0, 0.0, G)).unwrap();
        engine.handle_motion_event(MotionSample::new(
            0,
            Vec3::new(0.0, 0.0, G),
            Vec3::ZERO,
        ));
        assert_eq!(engine.transitions().len(), 0);
        assert_eq!(engine.callbacks().state_updates, 0);
    }

    #[test]
    fn test_constant_yaw_rate_integrates_to_rate_times_duration() {
        let mut engine = new_engine(scenario_config());
        // Jump straight to the turn with neutral calibration.
        engine.phase = Phase::TurningOut;
        engine.yaw_bias = 0.0;
        engine.turn_exit_threshold = 12.0;

        let rate = 90.0; // deg/s
        let mut stream = StreamBuilder::new();
        stream.hold(2000, Vec3::new(0.0, 0.0, G), Vec3::new(0.0, 0.0, rate));
        drive(&mut engine, &stream.samples);

        let expected = rate * 2.0;
        let dt_s = SAMPLE_MS as f64 / 1000.0;
        let yaw = engine.accumulators.turning_out.cumulative_yaw_deg;
        // First sample integrates with dt = 0, hence the dt-scaled tolerance.
        assert!(
            (yaw - expected).abs() <= 2.0 * rate * dt_s,
            "cumulative yaw {yaw} not within tolerance of {expected}"
        );
        // RMS stayed at the full rate, so the turn never "settled".
        assert_eq!(engine.phase(), Phase::TurningOut);
    }

    #[test]
    fn test_dt_is_capped_across_delivery_gaps() {
        let mut engine = new_engine(scenario_config());
        engine.phase = Phase::TurningOut;
        engine.yaw_bias = 0.0;

        let rate = 90.0;
        let still = Vec3::new(0.0, 0.0, G);
        engine.handle_motion_event(MotionSample::new(0, still, Vec3::new(0.0, 0.0, rate)));
        // 5-second delivery gap: integration must use the 100ms cap, not 5s.
        engine.handle_motion_event(MotionSample::new(5000, still, Vec3::new(0.0, 0.0, rate)));

        let yaw = engine.accumulators.turning_out.cumulative_yaw_deg;
        assert!((yaw - rate * 0.1).abs() < 1e-9, "yaw was {yaw}");
    }

    #[test]
    fn test_standup_timeout_fires_at_max_duration() {
        let mut config = scenario_config();
        config.stand_up.max_duration_ms = 400;
        let mut engine = new_engine(config);

        let mut stream = StreamBuilder::new();
        stream.hold(1000, Vec3::new(0.0, 0.0, G), Vec3::ZERO);
        drive(&mut engine, &stream.samples);

        let transitions = engine.transitions();
        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[1].from, Phase::StandingUp);
        assert_eq!(transitions[1].to, Phase::WalkingOut);
        assert_eq!(transitions[1].trigger, TransitionTrigger::StandupTimeout);
        // Exact to within one sample interval.
        assert!(transitions[1].t_ms >= 400 && transitions[1].t_ms <= 400 + SAMPLE_MS);
    }

    #[test]
    fn test_sitdown_timeout_completes_exactly_once() {
        let mut config = scenario_config();
        config.sit_down.max_duration_ms = 300;
        let mut engine = new_engine(config);
        engine.phase = Phase::SittingDown;

        let mut stream = StreamBuilder::new();
        stream.hold(1000, Vec3::new(0.0, 0.0, G), Vec3::ZERO);
        drive(&mut engine, &stream.samples);

        assert!(engine.is_complete());
        assert_eq!(engine.callbacks().completions.len(), 1);
        let last = engine.transitions().last().unwrap();
        assert_eq!(last.trigger, TransitionTrigger::SitdownTimeout);
        assert!(last.t_ms >= 300 && last.t_ms <= 300 + SAMPLE_MS);

        // Post-completion samples are a cheap no-op.
        let changes_before = engine.callbacks().phase_changes.len();
        let mut extra = StreamBuilder::new();
        extra.t_ms = stream.t_ms;
        extra.hold(500, Vec3::new(0.0, 0.0, G + 5.0), Vec3::new(0.0, 0.0, 200.0));
        drive(&mut engine, &extra.samples);
        assert_eq!(engine.callbacks().completions.len(), 1);
        assert_eq!(engine.callbacks().phase_changes.len(), changes_before);
    }

    /// The full documented scenario: stand, walk out, turn, walk back, sit.
    #[test]
    fn test_end_to_end_scenario() {
        let mut engine = new_engine(scenario_config());
        let mut stream = StreamBuilder::new();

        let still = Vec3::new(0.0, 0.0, G);
        // (1) still for 200ms
        stream.hold(200, still, Vec3::ZERO);
        // (2) tilt ~30° and hold long enough for the slow gravity filter to
        // cross the 15° threshold and satisfy the hold; the filter lag also
        // produces the stand-up acceleration spike.
        let tilted = Vec3::new(G * 30.0_f64.to_radians().sin(), 0.0, G * 30.0_f64.to_radians().cos());
        stream.hold(2500, tilted, Vec3::ZERO);
        // (3) six steps out
        stream.walk_cycles(6);
        // (4) turn ~175° then settle
        stream.hold(1750, still, Vec3::new(0.0, 0.0, 100.0));
        stream.hold(800, still, Vec3::ZERO);
        // (5) six steps back
        stream.walk_cycles(6);
        // (6) settle, impact spike, then stillness
        stream.hold(300, still, Vec3::ZERO);
        let spike_t = stream.push(Vec3::new(0.0, 0.0, G + 8.0), Vec3::ZERO);
        stream.hold(900, still, Vec3::ZERO);

        drive(&mut engine, &stream.samples);

        // Transition log: exactly the documented order, never turning_sit.
        let expected: Vec<(Phase, Phase, TransitionTrigger)> = vec![
            (Phase::Idle, Phase::StandingUp, TransitionTrigger::TestStart),
            (Phase::StandingUp, Phase::WalkingOut, TransitionTrigger::StandupDetected),
            (Phase::WalkingOut, Phase::TurningOut, TransitionTrigger::WalkOutComplete),
            (Phase::TurningOut, Phase::WalkingBack, TransitionTrigger::TurnComplete),
            (Phase::WalkingBack, Phase::SittingDown, TransitionTrigger::WalkBackComplete),
            (Phase::SittingDown, Phase::Complete, TransitionTrigger::SittingDetected),
        ];
        let actual: Vec<(Phase, Phase, TransitionTrigger)> = engine
            .transitions()
            .iter()
            .map(|tr| (tr.from, tr.to, tr.trigger))
            .collect();
        assert_eq!(actual, expected);
        assert!(actual.iter().all(|(_, to, _)| *to != Phase::TurningSit));

        // Completion is backdated to the impact spike, not the confirmation.
        assert_eq!(engine.callbacks().completions, vec![spike_t]);
        assert_eq!(engine.final_elapsed_ms(), Some(spike_t));

        // Callbacks fired as contracted.
        assert_eq!(engine.callbacks().turn_cues, 1);
        assert_eq!(engine.callbacks().steps.len(), 12);
        assert!(engine.callbacks().state_updates > 0);

        // Aggregated metrics.
        let report = engine.report().unwrap();
        assert_eq!(report.total_steps, 12);
        assert!(
            (report.total_distance_m - 8.4).abs() < 0.8,
            "total distance {} not near 8.4",
            report.total_distance_m
        );
        assert!(report.average_stride_length_m > 0.6 && report.average_stride_length_m < 0.8);
        assert_eq!(report.total_duration_ms, spike_t);
        assert_eq!(report.phases_completed, 6);
        assert!(report.turn_out_angle_deg.abs() > 120.0);
        assert_eq!(report.turn_sit_angle_deg, 0.0);

        // Idempotence: further samples change nothing.
        let mut extra = StreamBuilder::new();
        extra.t_ms = stream.t_ms;
        extra.walk_cycles(2);
        let changes_before = engine.callbacks().phase_changes.len();
        let steps_before = engine.callbacks().steps.len();
        drive(&mut engine, &extra.samples);
        assert_eq!(engine.callbacks().phase_changes.len(), changes_before);
        assert_eq!(engine.callbacks().steps.len(), steps_before);
        assert_eq!(engine.callbacks().completions.len(), 1);
    }

    #[test]
    fn test_ui_updates_are_throttled() {
        let mut engine = new_engine(scenario_config());
        let mut stream = StreamBuilder::new();
        stream.hold(1000, Vec3::new(0.0, 0.0, G), Vec3::ZERO);
        drive(&mut engine, &stream.samples);

        // 50 samples over 1s at a 100ms UI interval: roughly 10 snapshots,
        // far fewer than one per sample.
        let updates = engine.callbacks().state_updates;
        assert!(updates >= 8 && updates <= 12, "got {updates} updates");
    }
}
