use thiserror::Error;

/// Errors produced by the estimator and its stages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimatorError {
    /// A sample arrived with a timestamp earlier than the last accepted one.
    /// The estimator does not reorder; the rejected sample changes nothing.
    #[error("sample at {timestamp_ms} ms precedes last accepted sample at {previous_ms} ms")]
    InvalidSampleOrder { previous_ms: u64, timestamp_ms: u64 },

    /// Angular-rate vector has zero magnitude, so it has no rotation axis.
    /// Handled inside the estimator by skipping the orientation update.
    #[error("angular rate has zero magnitude, rotation axis is undefined")]
    DegenerateRotationAxis,

    /// A configuration value is outside its valid range.
    #[error("invalid estimator configuration: {0}")]
    InvalidConfig(String),
}
