//! The motion estimator: calibrated, rest-aware dead reckoning.
//!
//! This module orchestrates the per-sample flow from a raw IMU sample to a
//! position update:
//!
//! 1. **Ordering**: the first sample seeds the clock; later samples must not
//!    go back in time.
//! 2. **Calibration**: bias removal for accelerometer and gyroscope.
//! 3. **Orientation**: Rodrigues integration of the angular rate.
//! 4. **Rest detection**: rolling quiet/not-quiet window over the residual.
//! 5. **At rest**: adapt thresholds, hold position.
//! 6. **Moving**: movement-start rule, then direction-locked or inertial
//!    position integration.
//! 7. **Output**: position plus pen state.
//!
//! With no gyroscope input the orientation stays identity and the inertial
//! path reduces to plain trapezoidal integration of bias-corrected
//! acceleration.
//!
//! The estimator is a synchronous state machine with O(1) work per sample
//! and no allocation after construction. It does no locking; callers sharing
//! one instance across threads must serialize access themselves.

use log::{debug, trace};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationConfig, CalibrationState};
use crate::error::EstimatorError;
use crate::motion::{MotionTrigger, MotionTriggerConfig};
use crate::orientation::{OrientationConfig, OrientationTracker};
use crate::rest_detection::{RestDetector, RestDetectorConfig};
use crate::ring_buffer::RingBuffer;
use crate::signal::{GravityCompensator, SignalConfig};
use crate::trajectory::{DeadReckoner, TrajectoryConfig};
use crate::types::{MotionState, PenState, PositionUpdate, SensorSample};

/// How position follows a motion burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationMode {
    /// Constant speed along the direction locked at burst start.
    #[default]
    DirectionLocked,
    /// Trapezoidal integration of gravity-free global acceleration.
    Inertial,
}

/// Rule deciding whether a point is part of a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PenRule {
    /// Pen is down exactly while a motion burst is in progress.
    #[default]
    WhileMoving,
    /// Pen is down while the estimated z stays within `±max_abs_z`.
    SurfaceBand { max_abs_z: f64 },
}

impl PenRule {
    pub fn classify(&self, position: &Vector3<f64>, motion: &MotionState) -> PenState {
        let down = match *self {
            PenRule::WhileMoving => motion.is_moving(),
            PenRule::SurfaceBand { max_abs_z } => position.z.abs() < max_abs_z,
        };
        if down {
            PenState::PenDown
        } else {
            PenState::PenUp
        }
    }
}

/// Configuration for the complete estimator.
///
/// Bundles the stage configurations into one value that can be loaded from
/// a partial JSON document; missing fields take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Capacity of the raw-sample history exposed by `recent_samples`.
    pub window_size: usize,

    pub integration_mode: IntegrationMode,

    pub pen_rule: PenRule,

    /// Bias and adaptive thresholds.
    pub calibration: CalibrationConfig,

    pub rest: RestDetectorConfig,

    /// Movement-start rule.
    pub trigger: MotionTriggerConfig,

    pub orientation: OrientationConfig,

    /// Gravity removal and noise floor (inertial mode).
    pub signal: SignalConfig,

    /// Burst speed and velocity decay.
    pub trajectory: TrajectoryConfig,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            integration_mode: IntegrationMode::DirectionLocked,
            pen_rule: PenRule::WhileMoving,
            calibration: CalibrationConfig::default(),
            rest: RestDetectorConfig::default(),
            trigger: MotionTriggerConfig::default(),
            orientation: OrientationConfig::default(),
            signal: SignalConfig::default(),
            trajectory: TrajectoryConfig::default(),
        }
    }
}

impl EstimatorConfig {
    /// Orientation-aware preset for SI samples (m/s², rad/s).
    pub fn inertial() -> Self {
        Self {
            integration_mode: IntegrationMode::Inertial,
            pen_rule: PenRule::SurfaceBand { max_abs_z: 0.1 },
            calibration: CalibrationConfig::si(),
            rest: RestDetectorConfig::si(),
            trigger: MotionTriggerConfig::si(),
            ..Self::default()
        }
    }

    /// Checks every stage configuration.
    pub fn validate(&self) -> Result<(), EstimatorError> {
        if self.window_size == 0 {
            return Err(EstimatorError::InvalidConfig(
                "window_size must be at least 1".into(),
            ));
        }
        if let PenRule::SurfaceBand { max_abs_z } = self.pen_rule {
            if !(max_abs_z >= 0.0) {
                return Err(EstimatorError::InvalidConfig(format!(
                    "pen_rule.max_abs_z must be non-negative, got {max_abs_z}"
                )));
            }
        }
        self.calibration.validate()?;
        self.rest.validate()?;
        self.trigger.validate()?;
        self.signal.validate()?;
        self.trajectory.validate()?;
        Ok(())
    }
}

/// IMU position estimator.
///
/// Feed samples in arrival order with [`add_sample`](Self::add_sample) and
/// read the latest estimate from the returned update or from the accessors.
#[derive(Debug, Clone)]
pub struct MotionEstimator {
    config: EstimatorConfig,

    // Processing stages
    calibration: CalibrationState,
    rest: RestDetector,
    trigger: MotionTrigger,
    orientation: OrientationTracker,
    gravity: GravityCompensator,
    reckoner: DeadReckoner,

    // Session state
    motion_state: MotionState,
    at_rest: bool,
    last_timestamp_ms: Option<u64>,
    recent: RingBuffer<SensorSample>,
    sample_count: u64,
}

impl MotionEstimator {
    /// Create an estimator without validating `config`.
    ///
    /// Invalid values never panic but can make the estimate meaningless;
    /// use [`try_new`](Self::try_new) for configuration loaded at runtime.
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            calibration: CalibrationState::new(config.calibration.clone()),
            rest: RestDetector::new(config.rest.clone()),
            trigger: MotionTrigger::new(config.trigger.clone()),
            orientation: OrientationTracker::new(config.orientation.clone()),
            gravity: GravityCompensator::new(&config.signal),
            reckoner: DeadReckoner::new(config.trajectory.clone()),
            motion_state: MotionState::AtRest,
            at_rest: false,
            last_timestamp_ms: None,
            recent: RingBuffer::new(config.window_size),
            sample_count: 0,
            config,
        }
    }

    /// Create an estimator after validating `config`.
    pub fn try_new(config: EstimatorConfig) -> Result<Self, EstimatorError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Process one sample.
    ///
    /// Returns `Ok(None)` for the first sample of a session, which only seeds
    /// the clock. Every later accepted sample yields an update, including
    /// at-rest samples whose position is unchanged. A sample older than the
    /// previous one is rejected with `InvalidSampleOrder` and leaves the
    /// estimator untouched.
    pub fn add_sample(
        &mut self,
        sample: &SensorSample,
    ) -> Result<Option<PositionUpdate>, EstimatorError> {
        let Some(previous_ms) = self.last_timestamp_ms else {
            self.last_timestamp_ms = Some(sample.timestamp_ms);
            self.recent.push(*sample);
            self.sample_count += 1;
            return Ok(None);
        };

        if sample.timestamp_ms < previous_ms {
            debug!(
                "rejected sample at {} ms (last accepted {} ms)",
                sample.timestamp_ms, previous_ms
            );
            return Err(EstimatorError::InvalidSampleOrder {
                previous_ms,
                timestamp_ms: sample.timestamp_ms,
            });
        }

        let dt = (sample.timestamp_ms - previous_ms) as f64 / 1000.0;
        trace!("sample at {} ms, dt={dt:.3}s", sample.timestamp_ms);

        self.last_timestamp_ms = Some(sample.timestamp_ms);
        self.recent.push(*sample);
        self.sample_count += 1;

        let accel = self.calibration.correct_accel(&sample.accel_vector());
        let gyro = sample
            .gyro_reading()
            .map(|raw| self.calibration.correct_gyro(&raw))
            .unwrap_or_else(Vector3::zeros);

        self.orientation.update(&gyro, dt);

        let residual = match self.config.integration_mode {
            IntegrationMode::DirectionLocked => accel,
            IntegrationMode::Inertial => {
                self.gravity.residual(self.orientation.rotation(), &accel)
            }
        };

        let was_at_rest = self.at_rest;
        self.at_rest = self.rest.observe(&residual);

        if self.at_rest {
            self.settle(&accel, was_at_rest);
        } else {
            self.advance(&accel, dt);
        }

        Ok(Some(self.current_update(sample.timestamp_ms)))
    }

    fn settle(&mut self, accel: &Vector3<f64>, was_at_rest: bool) {
        if self.motion_state.is_moving() {
            debug!(
                "moving -> rest at ({:.2}, {:.2}, {:.2})",
                self.reckoner.position().x,
                self.reckoner.position().y,
                self.reckoner.position().z
            );
            self.calibration.clear_history();
        }
        self.motion_state = MotionState::AtRest;

        if self.config.integration_mode == IntegrationMode::Inertial && !was_at_rest {
            self.reckoner.zero_velocity();
        }

        self.calibration.observe_rest(accel);
    }

    fn advance(&mut self, accel: &Vector3<f64>, dt: f64) {
        if !self.motion_state.is_moving() {
            if let Some(start) = self.trigger.evaluate(
                accel,
                self.calibration.threshold_x(),
                self.calibration.threshold_y(),
            ) {
                debug!(
                    "rest -> moving along {:?}, direction ({}, {}, {})",
                    start.axis, start.direction.x, start.direction.y, start.direction.z
                );
                self.motion_state = MotionState::Moving {
                    direction: start.direction,
                };
            }
        }

        match self.config.integration_mode {
            IntegrationMode::DirectionLocked => {
                if let MotionState::Moving { direction } = self.motion_state {
                    self.reckoner.advance_locked(&direction, dt);
                }
            }
            IntegrationMode::Inertial => {
                let linear = self
                    .gravity
                    .linear_acceleration(self.orientation.rotation(), accel);
                self.reckoner.integrate(&linear, dt);
            }
        }
    }

    fn current_update(&self, timestamp_ms: u64) -> PositionUpdate {
        PositionUpdate {
            timestamp_ms,
            position: self.reckoner.position(),
            pen_state: self.pen_state(),
            motion_state: self.motion_state,
        }
    }

    /// Current `(x, y, pen_state)` for plotting. Does not mutate anything.
    pub fn get_plot_coordinates(&self) -> (f64, f64, PenState) {
        let position = self.reckoner.position();
        (position.x, position.y, self.pen_state())
    }

    /// Pen state for the current position and motion state.
    pub fn pen_state(&self) -> PenState {
        self.config
            .pen_rule
            .classify(&self.reckoner.position(), &self.motion_state)
    }

    pub fn position(&self) -> Vector3<f64> {
        self.reckoner.position()
    }

    pub fn velocity(&self) -> Vector3<f64> {
        self.reckoner.velocity()
    }

    /// Current body-to-session rotation.
    pub fn orientation(&self) -> &Matrix3<f64> {
        self.orientation.rotation()
    }

    pub fn motion_state(&self) -> MotionState {
        self.motion_state
    }

    /// Rest verdict from the last accepted sample.
    pub fn is_at_rest(&self) -> bool {
        self.at_rest
    }

    /// Current movement-start thresholds `(x, y)`.
    pub fn thresholds(&self) -> (f64, f64) {
        (
            self.calibration.threshold_x(),
            self.calibration.threshold_y(),
        )
    }

    /// Timestamp of the last accepted sample.
    pub fn last_timestamp_ms(&self) -> Option<u64> {
        self.last_timestamp_ms
    }

    /// Up to `window_size` most recent accepted samples, oldest first.
    pub fn recent_samples(&self) -> impl Iterator<Item = SensorSample> + '_ {
        self.recent.iter()
    }

    /// Number of accepted samples since construction or reset.
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Path length travelled since construction or reset.
    pub fn total_distance(&self) -> f64 {
        self.reckoner.total_distance()
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> EstimatorDiagnostics {
        EstimatorDiagnostics {
            heading_rad: self.orientation.yaw(),
            rotations_applied: self.orientation.applied_count(),
            rotations_skipped: self.orientation.skipped_count(),
            speed: self.reckoner.speed(),
            zero_velocity_updates: self.reckoner.zupt_count(),
            threshold_updates: self.calibration.update_count(),
            rest_history: self.calibration.history_len(),
        }
    }

    /// Reinitialize all state to construction-time defaults.
    ///
    /// Safe to call at any time; calling it twice is the same as once.
    pub fn reset(&mut self) {
        debug!("estimator reset after {} samples", self.sample_count);
        self.calibration.reset();
        self.rest.reset();
        self.trigger.reset();
        self.orientation.reset();
        self.reckoner.reset();
        self.motion_state = MotionState::AtRest;
        self.at_rest = false;
        self.last_timestamp_ms = None;
        self.recent.clear();
        self.sample_count = 0;
    }
}

/// Snapshot of internal counters, for logging and replay reports.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct EstimatorDiagnostics {
    /// Heading about the session z axis, radians.
    pub heading_rad: f64,
    pub rotations_applied: u64,
    /// Gyro updates skipped for a zero angular rate.
    pub rotations_skipped: u64,
    pub speed: f64,
    pub zero_velocity_updates: u64,
    pub threshold_updates: u64,
    /// At-rest readings currently held for threshold adaptation.
    pub rest_history: usize,
}

impl Default for MotionEstimator {
    fn default() -> Self {
        Self::new(EstimatorConfig::default())
    }
}
