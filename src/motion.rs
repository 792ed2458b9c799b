//! Movement-start detection and direction locking.
//!
//! When the sensor leaves rest, the bias-corrected acceleration is checked
//! against the adaptive thresholds, y axis first:
//!
//! 1. `|a.y| > threshold_y` starts a burst along `-sign(a.y)` on y.
//! 2. Otherwise, if the recent y readings are stable and
//!    `|a.x| > threshold_x`, a burst starts along `-sign(a.x)` on x.
//!
//! The y rule wins ties so a diagonal jolt never triggers both axes. The
//! resulting direction is locked until the next rest period.

use log::debug;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::EstimatorError;
use crate::ring_buffer::RingBuffer;
use crate::types::Axis;

/// Configuration for the movement-start rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionTriggerConfig {
    /// Maximum population stddev of recent y readings for the x rule to apply.
    pub y_stability_margin: f64,
    /// Number of y readings in the stability window.
    pub stability_window: usize,
}

impl Default for MotionTriggerConfig {
    fn default() -> Self {
        Self {
            y_stability_margin: 200.0,
            stability_window: 3,
        }
    }
}

impl MotionTriggerConfig {
    /// Trigger tuning for SI samples (m/s²).
    pub fn si() -> Self {
        Self {
            y_stability_margin: 0.3,
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<(), EstimatorError> {
        if self.stability_window == 0 {
            return Err(EstimatorError::InvalidConfig(
                "stability_window must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// A detected movement start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementStart {
    /// Axis whose reading crossed its threshold.
    pub axis: Axis,
    /// Unit direction of travel for the burst.
    pub direction: Vector3<f64>,
}

impl MovementStart {
    fn along(axis: Axis, reading: f64) -> Self {
        let mut direction = Vector3::zeros();
        direction[axis.index()] = -sign(reading);
        Self { axis, direction }
    }
}

/// Sign with `sign(0) == 0`, unlike `f64::signum`.
fn sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Movement-start rule with its y-stability window.
#[derive(Debug, Clone)]
pub struct MotionTrigger {
    config: MotionTriggerConfig,
    y_history: RingBuffer<f64>,
}

impl MotionTrigger {
    pub fn new(config: MotionTriggerConfig) -> Self {
        Self {
            y_history: RingBuffer::new(config.stability_window),
            config,
        }
    }

    /// Evaluates the axis rules for one bias-corrected reading.
    ///
    /// The y reading enters the stability window only when the y rule did
    /// not fire.
    pub fn evaluate(
        &mut self,
        accel: &Vector3<f64>,
        threshold_x: f64,
        threshold_y: f64,
    ) -> Option<MovementStart> {
        if accel.y.abs() > threshold_y {
            let start = MovementStart::along(Axis::Y, accel.y);
            debug!("movement start on y: a.y={:.1} > {:.1}", accel.y, threshold_y);
            return Some(start);
        }

        if self.y_is_stable(accel.y) && accel.x.abs() > threshold_x {
            let start = MovementStart::along(Axis::X, accel.x);
            debug!("movement start on x: a.x={:.1} > {:.1}", accel.x, threshold_x);
            return Some(start);
        }

        None
    }

    fn y_is_stable(&mut self, y: f64) -> bool {
        self.y_history.push(y);
        if !self.y_history.is_full() {
            return false;
        }
        self.y_history
            .std_dev()
            .map_or(false, |std| std < self.config.y_stability_margin)
    }

    pub fn reset(&mut self) {
        self.y_history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger() -> MotionTrigger {
        MotionTrigger::new(MotionTriggerConfig::default())
    }

    #[test]
    fn test_y_rule_fires_immediately() {
        let mut trigger = trigger();
        let start = trigger
            .evaluate(&Vector3::new(0.0, 1000.0, 0.0), 250.0, 650.0)
            .unwrap();

        assert_eq!(start.axis, Axis::Y);
        assert_eq!(start.direction, Vector3::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn test_negative_y_moves_positive() {
        let mut trigger = trigger();
        let start = trigger
            .evaluate(&Vector3::new(0.0, -700.0, 0.0), 250.0, 650.0)
            .unwrap();
        assert_eq!(start.direction, Vector3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_y_takes_priority_over_x() {
        let mut trigger = trigger();
        let start = trigger
            .evaluate(&Vector3::new(5000.0, 900.0, 0.0), 250.0, 650.0)
            .unwrap();
        assert_eq!(start.axis, Axis::Y);
        assert_eq!(start.direction.x, 0.0);
    }

    #[test]
    fn test_x_rule_requires_stable_y_window() {
        let mut trigger = trigger();
        let reading = Vector3::new(-400.0, 10.0, 0.0);

        // Window not yet full: not stable.
        assert!(trigger.evaluate(&reading, 250.0, 650.0).is_none());
        assert!(trigger.evaluate(&reading, 250.0, 650.0).is_none());

        let start = trigger.evaluate(&reading, 250.0, 650.0).unwrap();
        assert_eq!(start.axis, Axis::X);
        assert_eq!(start.direction, Vector3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_unstable_y_blocks_x_rule() {
        let mut trigger = trigger();
        for y in [-600.0, 600.0, -600.0] {
            assert!(trigger
                .evaluate(&Vector3::new(400.0, y, 0.0), 250.0, 650.0)
                .is_none());
        }
    }

    #[test]
    fn test_y_rule_does_not_record_y() {
        let mut trigger = trigger();
        trigger.evaluate(&Vector3::new(0.0, 1000.0, 0.0), 250.0, 650.0);
        assert!(trigger.y_history.is_empty());
    }

    #[test]
    fn test_zero_reading_never_triggers() {
        let mut trigger = trigger();
        for _ in 0..5 {
            assert!(trigger.evaluate(&Vector3::zeros(), 250.0, 650.0).is_none());
        }
    }

    #[test]
    fn test_sign_of_zero() {
        assert_eq!(sign(0.0), 0.0);
        assert_eq!(sign(-0.0), 0.0);
        assert_eq!(sign(3.0), 1.0);
        assert_eq!(sign(-3.0), -1.0);
    }

    #[test]
    fn test_reset_clears_stability_window() {
        let mut trigger = trigger();
        trigger.evaluate(&Vector3::zeros(), 250.0, 650.0);
        trigger.evaluate(&Vector3::zeros(), 250.0, 650.0);
        trigger.reset();
        assert!(trigger.y_history.is_empty());
    }
}
