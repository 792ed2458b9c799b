//! Global-frame acceleration: gravity removal and noise suppression.
//!
//! Body-frame acceleration is rotated into the session frame, the static
//! gravity vector is subtracted, and any component whose magnitude falls
//! under the noise floor is zeroed. Everything is O(1) per sample with no
//! state beyond the configuration.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::EstimatorError;

/// Parameters for gravity compensation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Gravity in the session frame, m/s².
    pub gravity: [f64; 3],

    /// Per-component magnitude below which global acceleration is treated
    /// as zero. Typical: 0.1 m/s².
    pub noise_floor: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, 0.0, 9.81],
            noise_floor: 0.1,
        }
    }
}

impl SignalConfig {
    pub(crate) fn validate(&self) -> Result<(), EstimatorError> {
        if !(self.noise_floor >= 0.0) {
            return Err(EstimatorError::InvalidConfig(format!(
                "noise_floor must be non-negative, got {}",
                self.noise_floor
            )));
        }
        Ok(())
    }
}

/// Stateless transform from body-frame to gravity-free global acceleration.
#[derive(Debug, Clone)]
pub struct GravityCompensator {
    gravity: Vector3<f64>,
    noise_floor: f64,
}

impl GravityCompensator {
    pub fn new(config: &SignalConfig) -> Self {
        Self {
            gravity: Vector3::from(config.gravity),
            noise_floor: config.noise_floor,
        }
    }

    /// Rotates `accel` into the session frame and subtracts gravity.
    pub fn residual(&self, rotation: &Matrix3<f64>, accel: &Vector3<f64>) -> Vector3<f64> {
        rotation * accel - self.gravity
    }

    /// Zeroes components under the noise floor. NaN components pass through.
    pub fn suppress_noise(&self, accel: &Vector3<f64>) -> Vector3<f64> {
        accel.map(|c| if c.abs() < self.noise_floor { 0.0 } else { c })
    }

    /// Full transform: rotate, remove gravity, suppress noise.
    pub fn linear_acceleration(
        &self,
        rotation: &Matrix3<f64>,
        accel: &Vector3<f64>,
    ) -> Vector3<f64> {
        self.suppress_noise(&self.residual(rotation, accel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::Rotation3;
    use std::f64::consts::FRAC_PI_2;

    fn compensator() -> GravityCompensator {
        GravityCompensator::new(&SignalConfig::default())
    }

    #[test]
    fn test_level_sensor_at_rest_is_zero() {
        let accel = compensator().linear_acceleration(
            &Matrix3::identity(),
            &Vector3::new(0.02, -0.05, 9.85),
        );
        assert_eq!(accel, Vector3::zeros());
    }

    #[test]
    fn test_gravity_removed_after_rotation() {
        // Sensor pitched 90° about y: gravity shows up on body -x.
        let rotation = Rotation3::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2).into_inner();
        let body = Vector3::new(-9.81, 0.0, 0.0);

        let accel = compensator().linear_acceleration(&rotation, &body);
        assert_abs_diff_eq!(accel, Vector3::zeros(), epsilon = 1e-9);
    }

    #[test]
    fn test_noise_floor_is_per_component() {
        let accel = compensator().suppress_noise(&Vector3::new(0.09, -0.5, -0.099));
        assert_eq!(accel, Vector3::new(0.0, -0.5, 0.0));
    }

    #[test]
    fn test_values_at_floor_are_kept() {
        let accel = compensator().suppress_noise(&Vector3::new(0.1, 0.0, 0.0));
        assert_eq!(accel.x, 0.1);
    }

    #[test]
    fn test_residual_keeps_small_components() {
        let residual = compensator().residual(&Matrix3::identity(), &Vector3::new(0.05, 0.0, 9.81));
        assert_abs_diff_eq!(residual, Vector3::new(0.05, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_nan_propagates() {
        let accel = compensator().suppress_noise(&Vector3::new(f64::NAN, 0.0, 1.0));
        assert!(accel.x.is_nan());
        assert_eq!(accel.z, 1.0);
    }

    #[test]
    fn test_validate() {
        assert!(SignalConfig::default().validate().is_ok());
        let config = SignalConfig {
            noise_floor: -1.0,
            ..SignalConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
