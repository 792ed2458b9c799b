//! Core data types for the motion estimator.
//!
//! This module defines the values that cross the estimator boundary: the raw
//! sensor sample going in and the position update coming out, plus the small
//! state enums both sides need to agree on.
//!
//! Design principle: if a concept exists, it gets a type. Pen state and motion
//! state are enums, never a magic z-coordinate.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A single raw inertial measurement.
///
/// Acceleration is in raw sensor units (or m/s² for SI deployments), angular
/// rate in rad/s. The estimator never rescales either; calibration constants
/// must be expressed in the same units as the samples.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorSample {
    /// Timestamp in milliseconds. Must be non-decreasing within a session.
    pub timestamp_ms: u64,

    /// Linear acceleration [x, y, z].
    pub accel: [f64; 3],

    /// Angular rate [x, y, z] in rad/s. Absent means no rotation.
    pub gyro: Option<[f64; 3]>,
}

impl SensorSample {
    /// Creates an accelerometer-only sample.
    pub fn new(timestamp_ms: u64, accel: [f64; 3]) -> Self {
        Self {
            timestamp_ms,
            accel,
            gyro: None,
        }
    }

    /// Creates a sample carrying both accelerometer and gyroscope readings.
    pub fn with_gyro(timestamp_ms: u64, accel: [f64; 3], gyro: [f64; 3]) -> Self {
        Self {
            timestamp_ms,
            accel,
            gyro: Some(gyro),
        }
    }

    /// Acceleration as a vector.
    pub fn accel_vector(&self) -> Vector3<f64> {
        Vector3::from(self.accel)
    }

    /// Angular rate as a vector, if the sample carries one.
    pub fn gyro_reading(&self) -> Option<Vector3<f64>> {
        self.gyro.map(Vector3::from)
    }
}

/// Sensor axis used by the movement-start rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Component index of this axis in a 3-vector.
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Whether the sensor is believed to be still or in a motion burst.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MotionState {
    /// No movement detected. Initial state.
    #[default]
    AtRest,
    /// A motion burst is in progress.
    ///
    /// `direction` is the unit vector locked in when the burst started. It
    /// does not change until the next rest detection.
    Moving { direction: Vector3<f64> },
}

impl MotionState {
    /// Returns true for `Moving`.
    pub fn is_moving(&self) -> bool {
        matches!(self, MotionState::Moving { .. })
    }

    /// The locked direction, or zero while at rest.
    pub fn direction(&self) -> Vector3<f64> {
        match self {
            MotionState::AtRest => Vector3::zeros(),
            MotionState::Moving { direction } => *direction,
        }
    }
}

/// Whether an estimated point belongs to a drawn stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PenState {
    /// Point is part of a stroke.
    PenDown,
    /// Point is travel between strokes.
    PenUp,
}

impl PenState {
    pub fn is_down(self) -> bool {
        self == PenState::PenDown
    }
}

/// Output of one estimator step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionUpdate {
    /// Timestamp of the sample that produced this update.
    pub timestamp_ms: u64,
    /// Estimated position [x, y, z] relative to the session origin.
    pub position: Vector3<f64>,
    /// Pen classification for this point.
    pub pen_state: PenState,
    /// Motion state after this sample.
    pub motion_state: MotionState,
}

impl PositionUpdate {
    /// 2-D projection used for plotting.
    pub fn plot_coordinates(&self) -> (f64, f64, PenState) {
        (self.position.x, self.position.y, self.pen_state)
    }
}
