//! Rest detection.
//!
//! Each sample is classified as "quiet" when every component of its residual
//! acceleration (bias-corrected, and gravity-compensated in inertial mode) is
//! below the rest threshold. The sensor counts as resting only when the most
//! recent `required_consecutive` classifications are all quiet. A single calm
//! sample in the middle of a stroke does not end it.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::EstimatorError;
use crate::ring_buffer::RingBuffer;

/// Configuration for rest detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestDetectorConfig {
    /// Per-axis magnitude below which a residual component is quiet.
    pub rest_threshold: f64,
    /// Capacity of the quiet/not-quiet history.
    pub window_capacity: usize,
    /// Number of most recent quiet samples required to report rest.
    pub required_consecutive: usize,
}

impl Default for RestDetectorConfig {
    fn default() -> Self {
        Self {
            rest_threshold: 200.0,
            window_capacity: 8,
            required_consecutive: 3,
        }
    }
}

impl RestDetectorConfig {
    /// Rest detection for SI samples (m/s²).
    pub fn si() -> Self {
        Self {
            rest_threshold: 0.5,
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<(), EstimatorError> {
        if self.required_consecutive == 0 || self.required_consecutive > self.window_capacity {
            return Err(EstimatorError::InvalidConfig(format!(
                "required_consecutive {} must be within 1..={}",
                self.required_consecutive, self.window_capacity
            )));
        }
        Ok(())
    }
}

/// Rolling rest detector.
#[derive(Debug, Clone)]
pub struct RestDetector {
    config: RestDetectorConfig,
    quiet_flags: RingBuffer<bool>,
}

impl RestDetector {
    pub fn new(config: RestDetectorConfig) -> Self {
        Self {
            quiet_flags: RingBuffer::new(config.window_capacity),
            config,
        }
    }

    /// True when every component of `residual` is below the rest threshold.
    pub fn is_quiet(&self, residual: &Vector3<f64>) -> bool {
        residual.iter().all(|c| c.abs() < self.config.rest_threshold)
    }

    /// Records one residual and reports whether the sensor is now at rest.
    pub fn observe(&mut self, residual: &Vector3<f64>) -> bool {
        let quiet = self.is_quiet(residual);
        self.quiet_flags.push(quiet);
        self.is_at_rest()
    }

    /// Rest verdict from the current history, without recording anything.
    pub fn is_at_rest(&self) -> bool {
        let required = self.config.required_consecutive;
        self.quiet_flags.len() >= required && self.quiet_flags.recent(required).all(|q| q)
    }

    pub fn reset(&mut self) {
        self.quiet_flags.clear();
    }
}
