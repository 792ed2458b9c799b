//! Dead-reckoning position integration.
//!
//! Two integrators share one position state:
//! - Direction-locked: a motion burst moves at constant speed along the
//!   direction chosen when it started.
//! - Inertial: trapezoidal velocity integration of global acceleration with
//!   a per-step velocity decay, followed by a second-order position step.
//!
//! The decay bounds the velocity drift that residual bias would otherwise
//! accumulate. A zero-velocity update (ZUPT) at the start of each rest
//! period removes what is left.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::EstimatorError;

/// Configuration for position integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryConfig {
    /// Speed of a direction-locked burst, units/s.
    pub movement_speed: f64,
    /// Velocity multiplier applied after every inertial step. Range: (0, 1].
    pub velocity_decay: f64,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            movement_speed: 50.0,
            velocity_decay: 0.95,
        }
    }
}

impl TrajectoryConfig {
    pub(crate) fn validate(&self) -> Result<(), EstimatorError> {
        if !(self.velocity_decay > 0.0 && self.velocity_decay <= 1.0) {
            return Err(EstimatorError::InvalidConfig(format!(
                "velocity_decay must be within (0, 1], got {}",
                self.velocity_decay
            )));
        }
        if !(self.movement_speed >= 0.0) {
            return Err(EstimatorError::InvalidConfig(format!(
                "movement_speed must be non-negative, got {}",
                self.movement_speed
            )));
        }
        Ok(())
    }
}

/// Position and velocity integrator.
#[derive(Debug, Clone)]
pub struct DeadReckoner {
    config: TrajectoryConfig,

    position: Vector3<f64>,
    velocity: Vector3<f64>,
    previous_accel: Vector3<f64>,

    // Statistics
    total_distance: f64,
    zupt_count: u64,
}

impl DeadReckoner {
    pub fn new(config: TrajectoryConfig) -> Self {
        Self {
            config,
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            previous_accel: Vector3::zeros(),
            total_distance: 0.0,
            zupt_count: 0,
        }
    }

    /// Moves along a locked unit direction at the configured speed.
    pub fn advance_locked(&mut self, direction: &Vector3<f64>, dt: f64) {
        let step = direction * (self.config.movement_speed * dt);
        self.position += step;
        self.total_distance += step.norm();
    }

    /// One inertial step from gravity-free global acceleration.
    ///
    /// ```text
    /// v ← (v + ½(a + a_prev)·dt) · decay
    /// p ← p + v·dt + ½·a·dt²
    /// ```
    pub fn integrate(&mut self, accel: &Vector3<f64>, dt: f64) {
        self.velocity += (accel + self.previous_accel) * (0.5 * dt);
        self.velocity *= self.config.velocity_decay;

        let step = self.velocity * dt + accel * (0.5 * dt * dt);
        self.position += step;
        self.total_distance += step.norm();

        self.previous_accel = *accel;
    }

    /// Zero-velocity update: clears velocity and the stored acceleration.
    pub fn zero_velocity(&mut self) {
        self.velocity = Vector3::zeros();
        self.previous_accel = Vector3::zeros();
        self.zupt_count += 1;
    }

    pub fn position(&self) -> Vector3<f64> {
        self.position
    }

    pub fn velocity(&self) -> Vector3<f64> {
        self.velocity
    }

    /// Current speed (velocity magnitude).
    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }

    /// Path length travelled since construction or reset.
    pub fn total_distance(&self) -> f64 {
        self.total_distance
    }

    /// Number of zero-velocity updates applied.
    pub fn zupt_count(&self) -> u64 {
        self.zupt_count
    }

    pub fn reset(&mut self) {
        self.position = Vector3::zeros();
        self.velocity = Vector3::zeros();
        self.previous_accel = Vector3::zeros();
        self.total_distance = 0.0;
        self.zupt_count = 0;
    }
}

impl Default for DeadReckoner {
    fn default() -> Self {
        Self::new(TrajectoryConfig::default())
    }
}
