//! Final report aggregation
//!
//! Once a test completes, the transition log and gait accumulators are
//! folded into one flat, serializable report. Aggregation is pure: it reads
//! the engine's records and never mutates them, so it can be re-run at any
//! time after completion with identical output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::types::{
    GaitAccumulators, Phase, PhaseTransition, PocketSide, SessionInfo, WalkingAid,
};
use crate::{ENGINE_VERSION, PRODUCER_NAME};

/// Duration and gait summary for one phase of the test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseMetrics {
    pub phase: Phase,
    /// Elapsed-time at which the phase was entered (ms since test start).
    pub started_at_ms: u64,
    pub duration_ms: u64,
    pub steps: u32,
    pub distance_m: f64,
    /// Signed cumulative yaw over the phase (degrees); 0 for non-turn phases.
    pub yaw_deg: f64,
    /// True when the phase was exited by a safety timeout rather than
    /// detection, flagging its duration as an upper bound.
    pub timed_out: bool,
}

/// The complete result of one TUG attempt.
///
/// Flat and self-describing: producer and session provenance travel with the
/// numbers so a report file is interpretable on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TugReport {
    pub producer: String,
    pub producer_version: String,
    pub computed_at: DateTime<Utc>,

    pub attempt_id: Uuid,
    pub device_id: String,
    pub pocket_side: PocketSide,
    pub walking_aid: WalkingAid,

    /// Total test time in milliseconds, stand-up trigger to sit-down impact.
    pub total_duration_ms: u64,
    /// Number of recorded transitions; 6 for a fully detected test.
    pub phases_completed: u32,
    /// Triggers of the transitions that were forced by safety timeouts.
    pub timeouts: Vec<String>,

    pub total_steps: u32,
    pub total_distance_m: f64,
    pub average_stride_length_m: f64,
    /// Mean walking speed across both legs (m/s); 0 when no time was spent
    /// walking.
    pub average_walk_speed_m_s: f64,

    /// Signed cumulative yaw of the mid-test turn (degrees).
    pub turn_out_angle_deg: f64,
    /// Reserved slot for a pre-sit turn; always 0 in the current pipeline.
    pub turn_sit_angle_deg: f64,

    pub phases: Vec<PhaseMetrics>,
    pub transitions: Vec<PhaseTransition>,
}

impl TugReport {
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Fold the transition log and accumulators into a report.
///
/// `stop_ms` is the final elapsed time the engine settled on, which may be
/// backdated relative to the last transition's processing moment.
pub fn aggregate(
    session: &SessionInfo,
    transitions: &[PhaseTransition],
    accumulators: &GaitAccumulators,
    stop_ms: u64,
) -> TugReport {
    let phases = phase_metrics(transitions, accumulators);

    let mut total_steps = 0u32;
    let mut total_distance = 0.0;
    let mut stride_sum = 0.0;
    let mut stride_count = 0usize;
    let mut walking_ms = 0u64;

    for acc in [&accumulators.walking_out, &accumulators.walking_back] {
        total_steps += acc.steps;
        total_distance += acc.distance_m;
        stride_sum += acc.stride_lengths.iter().sum::<f64>();
        stride_count += acc.stride_lengths.len();
    }
    for pm in &phases {
        if matches!(pm.phase, Phase::WalkingOut | Phase::WalkingBack) {
            walking_ms += pm.duration_ms;
        }
    }

    let average_stride = if stride_count == 0 {
        0.0
    } else {
        stride_sum / stride_count as f64
    };
    let average_speed = if walking_ms == 0 {
        0.0
    } else {
        total_distance / (walking_ms as f64 / 1000.0)
    };

    let timeouts = transitions
        .iter()
        .filter(|tr| tr.trigger.is_timeout())
        .map(|tr| tr.trigger.as_str().to_string())
        .collect();

    TugReport {
        producer: PRODUCER_NAME.to_string(),
        producer_version: ENGINE_VERSION.to_string(),
        computed_at: Utc::now(),
        attempt_id: session.attempt_id,
        device_id: session.device_id.clone(),
        pocket_side: session.pocket_side,
        walking_aid: session.walking_aid,
        total_duration_ms: stop_ms,
        phases_completed: transitions.len() as u32,
        timeouts,
        total_steps,
        total_distance_m: total_distance,
        average_stride_length_m: average_stride,
        average_walk_speed_m_s: average_speed,
        turn_out_angle_deg: accumulators.turning_out.cumulative_yaw_deg,
        turn_sit_angle_deg: accumulators.turning_sit.cumulative_yaw_deg,
        phases,
        transitions: transitions.to_vec(),
    }
}

/// Per-phase slices of the transition log.
///
/// A phase's duration runs from the transition into it to the transition out
/// of it; with a backdated final transition the last slice can be shorter
/// than the wall time spent in it, which is intended.
fn phase_metrics(
    transitions: &[PhaseTransition],
    accumulators: &GaitAccumulators,
) -> Vec<PhaseMetrics> {
    let mut phases = Vec::new();
    for (i, entry) in transitions.iter().enumerate() {
        if entry.to == Phase::Complete {
            continue;
        }
        let exit = transitions.get(i + 1);
        let end_ms = exit.map_or(entry.t_ms, |next| next.t_ms);
        let timed_out = exit.map_or(false, |next| next.trigger.is_timeout());
        let acc = accumulators.for_phase(entry.to);
        phases.push(PhaseMetrics {
            phase: entry.to,
            started_at_ms: entry.t_ms,
            duration_ms: end_ms.saturating_sub(entry.t_ms),
            steps: acc.map_or(0, |a| a.steps),
            distance_m: acc.map_or(0.0, |a| a.distance_m),
            yaw_deg: acc.map_or(0.0, |a| a.cumulative_yaw_deg),
            timed_out,
        });
    }
    phases
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DetectedStep, TransitionTrigger};
    use pretty_assertions::assert_eq;

    fn step(stride: f64) -> DetectedStep {
        DetectedStep {
            t_ms: 0,
            peak_accel: 3.0,
            valley_accel: -3.0,
            stride_length_m: stride,
        }
    }

    fn sample_log() -> Vec<PhaseTransition> {
        vec![
            PhaseTransition {
                from: Phase::Idle,
                to: Phase::StandingUp,
                t_ms: 0,
                trigger: TransitionTrigger::TestStart,
            },
            PhaseTransition {
                from: Phase::StandingUp,
                to: Phase::WalkingOut,
                t_ms: 1500,
                trigger: TransitionTrigger::StandupDetected,
            },
            PhaseTransition {
                from: Phase::WalkingOut,
                to: Phase::TurningOut,
                t_ms: 4500,
                trigger: TransitionTrigger::WalkOutComplete,
            },
            PhaseTransition {
                from: Phase::TurningOut,
                to: Phase::WalkingBack,
                t_ms: 7000,
                trigger: TransitionTrigger::TurnComplete,
            },
            PhaseTransition {
                from: Phase::WalkingBack,
                to: Phase::SittingDown,
                t_ms: 10_000,
                trigger: TransitionTrigger::WalkBackComplete,
            },
            PhaseTransition {
                from: Phase::SittingDown,
                to: Phase::Complete,
                t_ms: 10_600,
                trigger: TransitionTrigger::SittingDetected,
            },
        ]
    }

    fn sample_accumulators() -> GaitAccumulators {
        let mut accs = GaitAccumulators::default();
        for _ in 0..5 {
            accs.walking_out.record_step(&step(0.7));
        }
        for _ in 0..5 {
            accs.walking_back.record_step(&step(0.6));
        }
        accs.turning_out.cumulative_yaw_deg = 171.0;
        accs
    }

    #[test]
    fn test_aggregate_totals() {
        let report = aggregate(
            &SessionInfo::default(),
            &sample_log(),
            &sample_accumulators(),
            10_600,
        );

        assert_eq!(report.producer, PRODUCER_NAME);
        assert_eq!(report.total_duration_ms, 10_600);
        assert_eq!(report.phases_completed, 6);
        assert_eq!(report.timeouts, Vec::<String>::new());
        assert_eq!(report.total_steps, 10);
        assert!((report.total_distance_m - 6.5).abs() < 1e-9);
        assert!((report.average_stride_length_m - 0.65).abs() < 1e-9);
        // 6.5 m over 6 s of walking.
        assert!((report.average_walk_speed_m_s - 6.5 / 6.0).abs() < 1e-9);
        assert_eq!(report.turn_out_angle_deg, 171.0);
        assert_eq!(report.turn_sit_angle_deg, 0.0);
    }

    #[test]
    fn test_phase_slices_cover_the_log() {
        let report = aggregate(
            &SessionInfo::default(),
            &sample_log(),
            &sample_accumulators(),
            10_600,
        );

        let phases: Vec<(Phase, u64)> = report
            .phases
            .iter()
            .map(|pm| (pm.phase, pm.duration_ms))
            .collect();
        assert_eq!(
            phases,
            vec![
                (Phase::StandingUp, 1500),
                (Phase::WalkingOut, 3000),
                (Phase::TurningOut, 2500),
                (Phase::WalkingBack, 3000),
                (Phase::SittingDown, 600),
            ]
        );
        assert!(report.phases.iter().all(|pm| !pm.timed_out));
    }

    #[test]
    fn test_timeouts_are_flagged() {
        let mut log = sample_log();
        log[1].trigger = TransitionTrigger::StandupTimeout;
        log[5].trigger = TransitionTrigger::SitdownTimeout;

        let report = aggregate(
            &SessionInfo::default(),
            &log,
            &sample_accumulators(),
            10_600,
        );
        assert_eq!(report.timeouts, vec!["standup_timeout", "sitdown_timeout"]);
        assert!(report.phases[0].timed_out); // standing_up exited by timeout
        assert!(report.phases[4].timed_out);
        assert!(!report.phases[1].timed_out);
    }

    #[test]
    fn test_backdated_completion_shortens_sit_phase() {
        let mut log = sample_log();
        // The impact spike preceded the stillness confirmation.
        log[5].t_ms = 10_150;

        let report = aggregate(
            &SessionInfo::default(),
            &log,
            &sample_accumulators(),
            10_150,
        );
        assert_eq!(report.phases[4].duration_ms, 150);
        assert_eq!(report.total_duration_ms, 10_150);
    }

    #[test]
    fn test_report_json_round_trip() {
        let report = aggregate(
            &SessionInfo::default(),
            &sample_log(),
            &sample_accumulators(),
            10_600,
        );
        let json = report.to_json().unwrap();
        let parsed = TugReport::from_json(&json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_empty_log_yields_empty_report() {
        let report = aggregate(
            &SessionInfo::default(),
            &[],
            &GaitAccumulators::default(),
            0,
        );
        assert_eq!(report.phases_completed, 0);
        assert_eq!(report.total_steps, 0);
        assert_eq!(report.average_stride_length_m, 0.0);
        assert_eq!(report.average_walk_speed_m_s, 0.0);
        assert!(report.phases.is_empty());
    }
}
