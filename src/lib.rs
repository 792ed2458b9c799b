//! Motion Trace IMU Estimator Library
//!
//! Turns a stream of raw accelerometer (and optional gyroscope) samples into
//! an estimated position plus a pen-up/pen-down classification, suitable for
//! drawing a trajectory on a canvas.
//!
//! # Design Philosophy
//!
//! - **Pure state machine**: the estimator is a function of the samples it has
//!   seen. It does no I/O, holds no external resources and never blocks.
//! - **Fail-loud ordering**: out-of-order samples are rejected, never
//!   reordered or silently dropped.
//! - **Bounded memory**: every history is a fixed-capacity ring buffer, O(1)
//!   work per sample.
//! - **Calibration is configuration**: bias and thresholds arrive through
//!   [`EstimatorConfig`]; there is no process-wide state.
//!
//! # Example
//!
//! ```
//! use motion_trace::{MotionEstimator, MotionState, SensorSample};
//!
//! let mut estimator = MotionEstimator::default();
//! let bias = [-1950.0, 100.0, 17600.0];
//!
//! // Three still samples after the first establish rest.
//! for t in [0, 100, 200, 300] {
//!     estimator.add_sample(&SensorSample::new(t, bias)).unwrap();
//! }
//!
//! // A strong +y jolt starts a burst moving along -y.
//! let update = estimator
//!     .add_sample(&SensorSample::new(400, [bias[0], bias[1] + 1000.0, bias[2]]))
//!     .unwrap()
//!     .unwrap();
//! assert!(matches!(update.motion_state, MotionState::Moving { .. }));
//! assert!((update.position.y + 5.0).abs() < 1e-9);
//! ```

pub mod calibration;
pub mod error;
pub mod estimator;
pub mod motion;
pub mod orientation;
pub mod replay;
pub mod rest_detection;
pub mod ring_buffer;
pub mod signal;
pub mod strokes;
pub mod trajectory;
pub mod types;


// Re-export commonly used types
pub use calibration::CalibrationConfig;
pub use error::EstimatorError;
pub use estimator::{
    EstimatorConfig, EstimatorDiagnostics, IntegrationMode, MotionEstimator, PenRule,
};
pub use strokes::{Stroke, StrokeCollector};
pub use types::{Axis, MotionState, PenState, PositionUpdate, SensorSample};
