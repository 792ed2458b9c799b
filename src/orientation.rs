//! Orientation tracking by gyroscope integration.
//!
//! The orientation is a 3×3 rotation matrix, identity at session start. Each
//! sample contributes an incremental rotation of angle `|ω|·dt` about the
//! axis `ω/|ω|`, built in closed form with Rodrigues' formula:
//!
//! ```text
//! R = I + sin θ · K + (1 − cos θ) · K²
//! ```
//!
//! where `K` is the cross-product matrix of the unit axis. Increments are
//! composed as `R_new · R_old`, so the matrix maps body-frame vectors into
//! the frame the session started in.
//!
//! Repeated products drift away from orthogonality in floating point. The
//! tracker re-orthonormalizes every `renormalize_interval` updates.

use log::trace;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::EstimatorError;

/// Parameters for orientation tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationConfig {
    /// Number of applied rotations between re-orthonormalizations.
    /// Zero disables it.
    pub renormalize_interval: u32,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self {
            renormalize_interval: 100,
        }
    }
}

/// Builds the rotation of `angle` radians about `axis` (any length > 0).
///
/// Fails with `DegenerateRotationAxis` for a zero-length axis.
pub fn rodrigues(axis: &Vector3<f64>, angle: f64) -> Result<Matrix3<f64>, EstimatorError> {
    let norm = axis.norm();
    if norm == 0.0 {
        return Err(EstimatorError::DegenerateRotationAxis);
    }
    let k = axis / norm;

    let (s, c) = angle.sin_cos();
    let v = 1.0 - c;

    Ok(Matrix3::new(
        k.x * k.x * v + c,
        k.x * k.y * v - k.z * s,
        k.x * k.z * v + k.y * s,
        k.y * k.x * v + k.z * s,
        k.y * k.y * v + c,
        k.y * k.z * v - k.x * s,
        k.z * k.x * v - k.y * s,
        k.z * k.y * v + k.x * s,
        k.z * k.z * v + c,
    ))
}

/// Gram-Schmidt on the columns; the third column is rebuilt as a cross
/// product so the result is a proper rotation.
fn orthonormalize(m: &Matrix3<f64>) -> Matrix3<f64> {
    let c0 = m.column(0).normalize();
    let c1 = m.column(1).into_owned();
    let c1 = (c1 - c0 * c0.dot(&c1)).normalize();
    let c2 = c0.cross(&c1);
    Matrix3::from_columns(&[c0, c1, c2])
}

/// Running orientation estimate.
#[derive(Debug, Clone)]
pub struct OrientationTracker {
    config: OrientationConfig,
    rotation: Matrix3<f64>,
    updates_since_renormalize: u32,
    applied_count: u64,
    skipped_count: u64,
}

impl OrientationTracker {
    pub fn new(config: OrientationConfig) -> Self {
        Self {
            config,
            rotation: Matrix3::identity(),
            updates_since_renormalize: 0,
            applied_count: 0,
            skipped_count: 0,
        }
    }

    /// Integrates one angular-rate reading (rad/s) over `dt` seconds.
    ///
    /// A zero rate or zero interval leaves the orientation unchanged.
    pub fn update(&mut self, gyro: &Vector3<f64>, dt: f64) {
        if dt <= 0.0 {
            return;
        }

        match rodrigues(gyro, gyro.norm() * dt) {
            Ok(increment) => {
                self.rotation = increment * self.rotation;
                self.applied_count += 1;
                self.maybe_renormalize();
            }
            Err(err) => {
                trace!("orientation update skipped: {err}");
                self.skipped_count += 1;
            }
        }
    }

    fn maybe_renormalize(&mut self) {
        if self.config.renormalize_interval == 0 {
            return;
        }
        self.updates_since_renormalize += 1;
        if self.updates_since_renormalize >= self.config.renormalize_interval {
            self.rotation = orthonormalize(&self.rotation);
            self.updates_since_renormalize = 0;
        }
    }

    /// Current rotation matrix.
    pub fn rotation(&self) -> &Matrix3<f64> {
        &self.rotation
    }

    /// Heading about the session z axis, radians in (-π, π].
    pub fn yaw(&self) -> f64 {
        self.rotation[(1, 0)].atan2(self.rotation[(0, 0)])
    }

    /// Number of rotations applied since construction or reset.
    pub fn applied_count(&self) -> u64 {
        self.applied_count
    }

    /// Number of updates skipped for a zero angular rate.
    pub fn skipped_count(&self) -> u64 {
        self.skipped_count
    }

    /// Reset to identity.
    pub fn reset(&mut self) {
        self.rotation = Matrix3::identity();
        self.updates_since_renormalize = 0;
        self.applied_count = 0;
        self.skipped_count = 0;
    }
}

impl Default for OrientationTracker {
    fn default() -> Self {
        Self::new(OrientationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use std::f64::consts::{FRAC_PI_2, PI};

    fn assert_orthogonal(m: &Matrix3<f64>, epsilon: f64) {
        assert_abs_diff_eq!(m.transpose() * m, Matrix3::identity(), epsilon = epsilon);
        assert_abs_diff_eq!(m.determinant(), 1.0, epsilon = epsilon);
    }

    #[test]
    fn test_starts_at_identity() {
        let tracker = OrientationTracker::default();
        assert_eq!(*tracker.rotation(), Matrix3::identity());
        assert_eq!(tracker.yaw(), 0.0);
    }

    #[test]
    fn test_rodrigues_zero_axis_is_degenerate() {
        assert_eq!(
            rodrigues(&Vector3::zeros(), 1.0),
            Err(EstimatorError::DegenerateRotationAxis)
        );
    }

    #[test]
    fn test_rodrigues_quarter_turn_about_x() {
        let r = rodrigues(&Vector3::new(2.0, 0.0, 0.0), FRAC_PI_2).unwrap();
        let v = r * Vector3::new(0.0, 1.0, 0.0);
        assert_abs_diff_eq!(v, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn test_half_turn_about_z_flips_x() {
        let mut tracker = OrientationTracker::default();
        tracker.update(&Vector3::new(0.0, 0.0, PI), 1.0);

        let v = tracker.rotation() * Vector3::new(1.0, 0.0, 0.0);
        assert_abs_diff_eq!(v, Vector3::new(-1.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(tracker.yaw().abs(), PI, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_rate_is_skipped() {
        let mut tracker = OrientationTracker::default();
        tracker.update(&Vector3::zeros(), 0.1);
        tracker.update(&Vector3::new(1.0, 0.0, 0.0), 0.0);

        assert_eq!(*tracker.rotation(), Matrix3::identity());
        assert_eq!(tracker.applied_count(), 0);
        assert_eq!(tracker.skipped_count(), 1);
    }

    #[test]
    fn test_composition_is_new_times_old() {
        let mut tracker = OrientationTracker::default();
        let rate_x = Vector3::new(FRAC_PI_2, 0.0, 0.0);
        let rate_z = Vector3::new(0.0, 0.0, FRAC_PI_2);
        tracker.update(&rate_x, 1.0);
        tracker.update(&rate_z, 1.0);

        let expected = rodrigues(&rate_z, FRAC_PI_2).unwrap() * rodrigues(&rate_x, FRAC_PI_2).unwrap();
        assert_abs_diff_eq!(*tracker.rotation(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_rotation_stays_orthogonal() {
        let mut tracker = OrientationTracker::default();
        let rate = Vector3::new(0.0, 0.0, 0.7);

        for step in 0..20_000 {
            tracker.update(&rate, 0.01);
            if step % 997 == 0 {
                assert_orthogonal(tracker.rotation(), 1e-9);
            }
        }
        assert_orthogonal(tracker.rotation(), 1e-9);
    }

    #[test]
    fn test_tumbling_rotation_stays_orthogonal_with_renormalization() {
        let mut tracker = OrientationTracker::default();
        let rate = Vector3::new(0.3, -1.1, 0.8);

        for _ in 0..50_000 {
            tracker.update(&rate, 0.02);
        }
        assert_orthogonal(tracker.rotation(), 1e-9);
    }

    #[test]
    fn test_orthonormalize_repairs_skew() {
        let skewed = Matrix3::new(1.0, 1e-4, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0001);
        assert_orthogonal(&orthonormalize(&skewed), 1e-12);
    }

    #[test]
    fn test_reset() {
        let mut tracker = OrientationTracker::default();
        tracker.update(&Vector3::new(0.1, 0.2, 0.3), 0.5);
        tracker.reset();
        assert_eq!(*tracker.rotation(), Matrix3::identity());
        assert_eq!(tracker.applied_count(), 0);
    }
}
