//! Step detection and stride estimation
//!
//! Consumes the smoothed vertical-acceleration scalar stream and emits
//! discrete step events with Weinberg stride lengths, using adaptive
//! peak/valley detection. The swing threshold tracks the user's gait
//! amplitude over time, so the detector follows a taller or shorter stride
//! without retuning.

use std::collections::VecDeque;

use crate::config::StepDetectorConfig;
use crate::signal::weinberg_stride;
use crate::types::DetectedStep;

/// Fraction of the accepted swing the adaptive threshold converges toward.
const THRESHOLD_TARGET_RATIO: f64 = 0.4;

/// Adaptive peak/valley step detector.
///
/// Maintains a moving average of the last W vertical-acceleration samples and
/// tracks the derivative sign of the smoothed value: a rising→falling flip
/// marks a peak, falling→rising marks a valley. A peak is accepted as a step
/// when the peak-valley swing clears the adaptive threshold, enough time has
/// passed since the last accepted step, and the valley→peak span is short
/// enough to be a real step rather than a slow drift.
#[derive(Debug, Clone)]
pub struct StepDetector {
    config: StepDetectorConfig,
    window: VecDeque<f64>,
    window_sum: f64,
    prev: Option<(u64, f64)>,
    rising: bool,
    threshold: f64,
    valley: Option<(u64, f64)>,
    last_step_t_ms: Option<u64>,
}

impl StepDetector {
    pub fn new(config: StepDetectorConfig) -> Self {
        let threshold = config.initial_threshold;
        Self {
            window: VecDeque::with_capacity(config.smoothing_window.max(1)),
            window_sum: 0.0,
            prev: None,
            rising: false,
            threshold,
            valley: None,
            last_step_t_ms: None,
            config,
        }
    }

    /// Current adaptive swing threshold (m/s²).
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Process one vertical-acceleration sample at elapsed time `t_ms`.
    pub fn process_sample(&mut self, t_ms: u64, vertical_accel: f64) -> Option<DetectedStep> {
        let smoothed = self.smooth(vertical_accel);

        let Some((prev_t, prev_value)) = self.prev else {
            self.prev = Some((t_ms, smoothed));
            return None;
        };

        let derivative = smoothed - prev_value;
        let mut step = None;

        if derivative > 0.0 {
            if !self.rising {
                // falling -> rising: the previous sample was a local valley
                self.valley = Some((prev_t, prev_value));
                self.rising = true;
            }
        } else if derivative < 0.0 {
            if self.rising {
                // rising -> falling: the previous sample was a local peak
                self.rising = false;
                step = self.evaluate_peak(prev_t, prev_value);
            }
        }
        // derivative == 0 keeps the current direction

        self.prev = Some((t_ms, smoothed));
        step
    }

    /// Clear all state, restoring the initial threshold.
    ///
    /// Called on every transition into a walking phase so a new bout starts
    /// fresh instead of inheriting a stale threshold from the previous bout.
    pub fn reset(&mut self) {
        self.window.clear();
        self.window_sum = 0.0;
        self.prev = None;
        self.rising = false;
        self.threshold = self.config.initial_threshold;
        self.valley = None;
        self.last_step_t_ms = None;
    }

    fn smooth(&mut self, value: f64) -> f64 {
        self.window.push_back(value);
        self.window_sum += value;
        while self.window.len() > self.config.smoothing_window.max(1) {
            if let Some(evicted) = self.window.pop_front() {
                self.window_sum -= evicted;
            }
        }
        self.window_sum / self.window.len() as f64
    }

    fn evaluate_peak(&mut self, peak_t: u64, peak_value: f64) -> Option<DetectedStep> {
        let (valley_t, valley_value) = self.valley?;
        let swing = peak_value - valley_value;

        if swing <= self.threshold {
            return None;
        }
        let interval_ok = self
            .last_step_t_ms
            .map_or(true, |last| peak_t.saturating_sub(last) >= self.config.min_step_interval_ms);
        if !interval_ok {
            return None;
        }
        if peak_t.saturating_sub(valley_t) > self.config.max_peak_to_valley_ms {
            // A swing this slow is posture drift, not a footfall.
            return None;
        }

        let stride = weinberg_stride(peak_value, valley_value, self.config.stride_k);
        self.last_step_t_ms = Some(peak_t);
        self.threshold +=
            self.config.adaptation_rate * (THRESHOLD_TARGET_RATIO * swing - self.threshold);
        self.valley = None;

        Some(DetectedStep {
            t_ms: peak_t,
            peak_accel: peak_value,
            valley_accel: valley_value,
            stride_length_m: stride,
        })
    }
}
