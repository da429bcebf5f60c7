//! Vector and filter primitives
//!
//! Orientation-invariant signal extraction for a phone carried in a pocket:
//! gravity tracking, gravity/user-acceleration decomposition, tilt against a
//! frozen rest orientation, yaw-rate projection, the Weinberg stride model,
//! a sliding-window RMS estimator, and a percentile utility.
//!
//! Everything here is total: degenerate inputs (zero vectors, empty slices)
//! produce zeros rather than errors.

use std::collections::VecDeque;

use crate::types::Vec3;

/// Per-axis exponential smoothing: `alpha * current + (1 - alpha) * previous`.
///
/// Used to track the gravity direction through the raw acceleration stream.
pub fn low_pass(current: Vec3, previous: Vec3, alpha: f64) -> Vec3 {
    Vec3::new(
        alpha * current.x + (1.0 - alpha) * previous.x,
        alpha * current.y + (1.0 - alpha) * previous.y,
        alpha * current.z + (1.0 - alpha) * previous.z,
    )
}

/// Gravity-removed acceleration, split along the gravity axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decomposed {
    /// Signed projection onto the gravity axis, positive away from Earth (m/s²).
    pub vertical: f64,
    /// Magnitude of the residual in the horizontal plane (m/s²).
    pub horizontal: f64,
    /// Magnitude of the full user-acceleration vector (m/s²).
    pub magnitude: f64,
}

/// Subtracts gravity from raw acceleration and splits the user acceleration
/// into vertical and horizontal components.
///
/// The vertical signal is orientation-invariant: it reads the same however
/// the phone sits in the pocket, because "up" is defined by the gravity
/// estimate itself.
pub fn decompose(accel_raw: Vec3, gravity: Vec3) -> Decomposed {
    let user = accel_raw.sub(&gravity);
    let axis = gravity.normalized();
    let vertical = user.dot(&axis);
    let horizontal = user.sub(&axis.scale(vertical)).magnitude();
    Decomposed {
        vertical,
        horizontal,
        magnitude: user.magnitude(),
    }
}

/// Angle in degrees between the current and rest gravity directions.
///
/// Always in [0, 180]; 0 means no orientation change since calibration.
pub fn tilt_deg(gravity: Vec3, rest_gravity: Vec3) -> f64 {
    let cos = gravity
        .normalized()
        .dot(&rest_gravity.normalized())
        .clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// Rotation rate about the gravity axis (deg/s).
///
/// Projecting the gyroscope vector onto the gravity direction isolates
/// rotation about the body's vertical axis independent of pocket orientation.
pub fn yaw_rate(rotation: Vec3, gravity: Vec3) -> f64 {
    rotation.dot(&gravity.normalized())
}

/// Weinberg stride length estimate: `k * (peak - valley)^0.25`.
///
/// Returns 0 when `peak <= valley`, guarding against a NaN from a negative
/// base.
pub fn weinberg_stride(peak: f64, valley: f64, k: f64) -> f64 {
    if peak <= valley {
        return 0.0;
    }
    k * (peak - valley).powf(0.25)
}

/// Root-mean-square over a sliding window of fixed length.
///
/// Keeps a running sum of squares so each update is O(1).
#[derive(Debug, Clone)]
pub struct SlidingWindowRms {
    window: VecDeque<f64>,
    sum_squares: f64,
    capacity: usize,
}

impl SlidingWindowRms {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity.max(1)),
            sum_squares: 0.0,
            capacity: capacity.max(1),
        }
    }

    /// Push a sample and return the RMS of the current window.
    pub fn update(&mut self, value: f64) -> f64 {
        let squared = value * value;
        self.window.push_back(squared);
        self.sum_squares += squared;
        while self.window.len() > self.capacity {
            if let Some(evicted) = self.window.pop_front() {
                self.sum_squares -= evicted;
            }
        }
        if self.window.is_empty() {
            return 0.0;
        }
        // Running sum can drift slightly negative from float cancellation.
        (self.sum_squares.max(0.0) / self.window.len() as f64).sqrt()
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.sum_squares = 0.0;
    }
}

/// Linear-interpolated percentile over a copy of the input, `p` in [0, 100].
///
/// Returns 0 for an empty input.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let fraction = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: f64 = 9.81;

    #[test]
    fn test_tilt_of_identical_vectors_is_zero() {
        let g = Vec3::new(0.3, -0.4, 9.7);
        assert!(tilt_deg(g, g).abs() < 1e-9);
    }

    #[test]
    fn test_tilt_of_opposite_vectors_is_180() {
        let g = Vec3::new(0.3, -0.4, 9.7);
        let opposite = g.scale(-1.0);
        assert!((tilt_deg(g, opposite) - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_tilt_right_angle() {
        let a = Vec3::new(0.0, 0.0, G);
        let b = Vec3::new(G, 0.0, 0.0);
        assert!((tilt_deg(a, b) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_decompose_at_rest_is_zero() {
        let g = Vec3::new(0.0, 0.0, G);
        let d = decompose(g, g);
        assert!(d.vertical.abs() < 1e-9);
        assert!(d.horizontal.abs() < 1e-9);
        assert!(d.magnitude.abs() < 1e-9);
    }

    #[test]
    fn test_decompose_vertical_sign_is_away_from_earth() {
        let g = Vec3::new(0.0, 0.0, G);
        // Accelerating upward adds to the reading along the gravity axis.
        let up = decompose(Vec3::new(0.0, 0.0, G + 2.0), g);
        assert!((up.vertical - 2.0).abs() < 1e-9);
        let down = decompose(Vec3::new(0.0, 0.0, G - 2.0), g);
        assert!((down.vertical + 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_decompose_is_orientation_invariant() {
        // Same physical motion with the device rotated 90°: vertical reads
        // identically because the gravity axis rotates with it.
        let g = Vec3::new(G, 0.0, 0.0);
        let d = decompose(Vec3::new(G + 2.0, 1.0, 0.0), g);
        assert!((d.vertical - 2.0).abs() < 1e-9);
        assert!((d.horizontal - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_yaw_rate_projects_onto_gravity_axis() {
        let g = Vec3::new(0.0, 0.0, G);
        assert!((yaw_rate(Vec3::new(5.0, 7.0, 90.0), g) - 90.0).abs() < 1e-9);
        // Rotation purely about a horizontal axis contributes nothing.
        assert!(yaw_rate(Vec3::new(50.0, 0.0, 0.0), g).abs() < 1e-9);
    }

    #[test]
    fn test_weinberg_zero_for_inverted_swing() {
        assert_eq!(weinberg_stride(1.0, 1.0, 0.45), 0.0);
        assert_eq!(weinberg_stride(0.5, 1.0, 0.45), 0.0);
    }

    #[test]
    fn test_weinberg_monotone_in_swing() {
        let small = weinberg_stride(2.0, 0.0, 0.45);
        let large = weinberg_stride(4.0, 0.0, 0.45);
        assert!(small > 0.0);
        assert!(large > small);
        assert!((weinberg_stride(6.0, 0.0, 0.45) - 0.45 * 6.0_f64.powf(0.25)).abs() < 1e-12);
    }

    #[test]
    fn test_rms_constant_signal() {
        let mut rms = SlidingWindowRms::new(4);
        let mut last = 0.0;
        for _ in 0..10 {
            last = rms.update(3.0);
        }
        assert!((last - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_rms_window_eviction() {
        let mut rms = SlidingWindowRms::new(2);
        rms.update(10.0);
        rms.update(0.0);
        // The 10 is evicted here; window is [0, 0].
        let value = rms.update(0.0);
        assert!(value.abs() < 1e-9);
    }

    #[test]
    fn test_rms_reset() {
        let mut rms = SlidingWindowRms::new(4);
        rms.update(5.0);
        rms.reset();
        assert!((rms.update(1.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_empty_is_zero() {
        assert_eq!(percentile(&[], 75.0), 0.0);
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert!((percentile(&values, 0.0) - 1.0).abs() < 1e-12);
        assert!((percentile(&values, 100.0) - 4.0).abs() < 1e-12);
        assert!((percentile(&values, 50.0) - 2.5).abs() < 1e-12);
        // 75th of [1,2,3,4]: rank 2.25 -> 3 + 0.25
        assert!((percentile(&values, 75.0) - 3.25).abs() < 1e-12);
    }
}
