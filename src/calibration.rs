//! Accelerometer calibration: fixed bias and adaptive movement thresholds.
//!
//! The bias is a deployment constant subtracted from every raw reading. The
//! two movement-start thresholds (x and y) adapt while the sensor rests: the
//! most recent at-rest readings are kept in a bounded history and each
//! threshold becomes `gain × stddev`, clamped into its axis-specific bounds.
//!
//! Thresholds only move during rest. The history is cleared when a motion
//! burst ends; the thresholds keep their values until the new rest period
//! has filled `min_history` slots.

use log::trace;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::EstimatorError;
use crate::ring_buffer::RingBuffer;

/// Inclusive clamp range for an adaptive threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBounds {
    pub min: f64,
    pub max: f64,
}

impl ThresholdBounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Clamps `value` into the range. NaN maps to `min`.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }
}

/// Calibration constants supplied at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Accelerometer reading at zero true acceleration, in sample units.
    pub accel_bias: [f64; 3],

    /// Gyroscope reading at zero rotation (rad/s).
    pub gyro_bias: [f64; 3],

    /// Starting movement threshold for the x axis.
    pub initial_threshold_x: f64,

    /// Starting movement threshold for the y axis.
    pub initial_threshold_y: f64,

    /// Clamp range for the adapted x threshold.
    pub bounds_x: ThresholdBounds,

    /// Clamp range for the adapted y threshold.
    pub bounds_y: ThresholdBounds,

    /// Multiplier applied to the at-rest standard deviation.
    pub threshold_gain: f64,

    /// Number of at-rest samples required before thresholds adapt.
    pub min_history: usize,

    /// Capacity of the at-rest history window.
    pub history_capacity: usize,
}

impl CalibrationConfig {
    /// Bias measured on the primary board, sensor flat and still.
    pub const PRIMARY_BIAS: [f64; 3] = [-1950.0, 100.0, 17600.0];

    /// Bias measured on the second deployment board.
    pub const ALTERNATE_BIAS: [f64; 3] = [203.0, -300.0, 17690.0];

    /// Default raw-unit calibration with a different accelerometer bias.
    pub fn with_bias(accel_bias: [f64; 3]) -> Self {
        Self {
            accel_bias,
            ..Self::default()
        }
    }

    /// Calibration for SI samples (m/s²) from a sensor with no known offset.
    pub fn si() -> Self {
        Self {
            accel_bias: [0.0; 3],
            gyro_bias: [0.0; 3],
            initial_threshold_x: 0.6,
            initial_threshold_y: 1.0,
            bounds_x: ThresholdBounds::new(0.4, 1.2),
            bounds_y: ThresholdBounds::new(0.8, 2.0),
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<(), EstimatorError> {
        for (name, bounds) in [("bounds_x", &self.bounds_x), ("bounds_y", &self.bounds_y)] {
            if bounds.min > bounds.max {
                return Err(EstimatorError::InvalidConfig(format!(
                    "{name}: min {} exceeds max {}",
                    bounds.min, bounds.max
                )));
            }
        }
        if self.history_capacity == 0 {
            return Err(EstimatorError::InvalidConfig(
                "history_capacity must be at least 1".into(),
            ));
        }
        if self.min_history == 0 || self.min_history > self.history_capacity {
            return Err(EstimatorError::InvalidConfig(format!(
                "min_history {} must be within 1..={}",
                self.min_history, self.history_capacity
            )));
        }
        Ok(())
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            accel_bias: Self::PRIMARY_BIAS,
            gyro_bias: [0.0; 3],
            initial_threshold_x: 250.0,
            initial_threshold_y: 650.0,
            bounds_x: ThresholdBounds::new(250.0, 500.0),
            bounds_y: ThresholdBounds::new(500.0, 800.0),
            threshold_gain: 3.0,
            min_history: 10,
            history_capacity: 20,
        }
    }
}

/// Live calibration state: bias removal plus the adaptive thresholds.
#[derive(Debug, Clone)]
pub struct CalibrationState {
    config: CalibrationConfig,
    accel_bias: Vector3<f64>,
    gyro_bias: Vector3<f64>,
    threshold_x: f64,
    threshold_y: f64,
    history_x: RingBuffer<f64>,
    history_y: RingBuffer<f64>,
    update_count: u64,
}

impl CalibrationState {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            accel_bias: Vector3::from(config.accel_bias),
            gyro_bias: Vector3::from(config.gyro_bias),
            threshold_x: config.initial_threshold_x,
            threshold_y: config.initial_threshold_y,
            history_x: RingBuffer::new(config.history_capacity),
            history_y: RingBuffer::new(config.history_capacity),
            update_count: 0,
            config,
        }
    }

    /// Raw acceleration minus the accelerometer bias.
    pub fn correct_accel(&self, raw: &Vector3<f64>) -> Vector3<f64> {
        raw - self.accel_bias
    }

    /// Raw angular rate minus the gyroscope bias.
    pub fn correct_gyro(&self, raw: &Vector3<f64>) -> Vector3<f64> {
        raw - self.gyro_bias
    }

    /// Records one bias-corrected at-rest reading and refreshes the thresholds
    /// once enough history exists.
    pub fn observe_rest(&mut self, accel: &Vector3<f64>) {
        self.history_x.push(accel.x);
        self.history_y.push(accel.y);

        if self.history_x.len() < self.config.min_history {
            return;
        }

        // Both histories are pushed together, so both are non-empty here.
        let (Some(std_x), Some(std_y)) = (self.history_x.std_dev(), self.history_y.std_dev())
        else {
            return;
        };

        self.threshold_x = self.config.bounds_x.clamp(std_x * self.config.threshold_gain);
        self.threshold_y = self.config.bounds_y.clamp(std_y * self.config.threshold_gain);
        self.update_count += 1;

        trace!(
            "thresholds updated: x={:.1} y={:.1} (from {} rest samples)",
            self.threshold_x,
            self.threshold_y,
            self.history_x.len()
        );
    }

    /// Drops the at-rest history. Thresholds keep their current values.
    pub fn clear_history(&mut self) {
        self.history_x.clear();
        self.history_y.clear();
    }

    pub fn threshold_x(&self) -> f64 {
        self.threshold_x
    }

    pub fn threshold_y(&self) -> f64 {
        self.threshold_y
    }

    /// Number of at-rest readings currently held.
    pub fn history_len(&self) -> usize {
        self.history_x.len()
    }

    /// How many times the thresholds have been recomputed.
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Restore construction-time thresholds and empty the history.
    pub fn reset(&mut self) {
        self.threshold_x = self.config.initial_threshold_x;
        self.threshold_y = self.config.initial_threshold_y;
        self.clear_history();
        self.update_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn rest_reading(x: f64, y: f64) -> Vector3<f64> {
        Vector3::new(x, y, 0.0)
    }

    #[test]
    fn test_bias_correction() {
        let state = CalibrationState::new(CalibrationConfig::default());
        let corrected = state.correct_accel(&Vector3::new(-1950.0, 1100.0, 17600.0));
        assert_eq!(corrected, Vector3::new(0.0, 1000.0, 0.0));
    }

    #[test]
    fn test_alternate_bias() {
        let state = CalibrationState::new(CalibrationConfig::with_bias(
            CalibrationConfig::ALTERNATE_BIAS,
        ));
        let corrected = state.correct_accel(&Vector3::new(203.0, -300.0, 17690.0));
        assert_eq!(corrected, Vector3::zeros());
    }

    #[test]
    fn test_thresholds_wait_for_min_history() {
        let mut state = CalibrationState::new(CalibrationConfig::default());

        for i in 0..9 {
            let v = if i % 2 == 0 { 1000.0 } else { -1000.0 };
            state.observe_rest(&rest_reading(v, v));
        }

        assert_eq!(state.threshold_x(), 250.0);
        assert_eq!(state.threshold_y(), 650.0);
        assert_eq!(state.update_count(), 0);
    }

    #[test]
    fn test_quiet_rest_clamps_to_lower_bounds() {
        let mut state = CalibrationState::new(CalibrationConfig::default());

        for _ in 0..10 {
            state.observe_rest(&rest_reading(3.0, -4.0));
        }

        // Zero deviation: both thresholds fall to their minimums.
        assert_eq!(state.threshold_x(), 250.0);
        assert_eq!(state.threshold_y(), 500.0);
        assert_eq!(state.update_count(), 1);
    }

    #[test]
    fn test_noisy_rest_clamps_to_upper_bounds() {
        let mut state = CalibrationState::new(CalibrationConfig::default());

        for i in 0..10 {
            let v = if i % 2 == 0 { 1000.0 } else { -1000.0 };
            state.observe_rest(&rest_reading(v, v));
        }

        assert_eq!(state.threshold_x(), 500.0);
        assert_eq!(state.threshold_y(), 800.0);
    }

    #[test]
    fn test_threshold_is_gain_times_std_dev_within_bounds() {
        let mut state = CalibrationState::new(CalibrationConfig::default());

        // Alternating ±100 gives a population stddev of exactly 100.
        for i in 0..10 {
            let v = if i % 2 == 0 { 100.0 } else { -100.0 };
            state.observe_rest(&rest_reading(v, 2.0 * v));
        }

        assert_abs_diff_eq!(state.threshold_x(), 300.0, epsilon = 1e-9);
        assert_abs_diff_eq!(state.threshold_y(), 600.0, epsilon = 1e-9);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = CalibrationState::new(CalibrationConfig::default());
        for _ in 0..50 {
            state.observe_rest(&rest_reading(0.0, 0.0));
        }
        assert_eq!(state.history_len(), 20);
    }

    #[test]
    fn test_clear_history_keeps_thresholds() {
        let mut state = CalibrationState::new(CalibrationConfig::default());
        for i in 0..10 {
            let v = if i % 2 == 0 { 100.0 } else { -100.0 };
            state.observe_rest(&rest_reading(v, v));
        }
        let x = state.threshold_x();

        state.clear_history();

        assert_eq!(state.history_len(), 0);
        assert_eq!(state.threshold_x(), x);
    }

    #[test]
    fn test_reset_restores_initial_thresholds() {
        let mut state = CalibrationState::new(CalibrationConfig::default());
        for _ in 0..10 {
            state.observe_rest(&rest_reading(0.0, 0.0));
        }
        assert_eq!(state.threshold_y(), 500.0);

        state.reset();

        assert_eq!(state.threshold_x(), 250.0);
        assert_eq!(state.threshold_y(), 650.0);
        assert_eq!(state.history_len(), 0);
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let config = CalibrationConfig {
            bounds_x: ThresholdBounds::new(10.0, 5.0),
            ..CalibrationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EstimatorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_min_history_above_capacity() {
        let config = CalibrationConfig {
            min_history: 30,
            ..CalibrationConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(CalibrationConfig::default().validate().is_ok());
        assert!(CalibrationConfig::si().validate().is_ok());
    }
}
