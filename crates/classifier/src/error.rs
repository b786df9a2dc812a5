//! Classifier Error Types

use dataset::SchemaError;
use thiserror::Error;

/// Errors while building, training or running the network
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainError {
    /// No rows to train or evaluate on
    #[error("Empty {0} set")]
    EmptyDataset(&'static str),

    /// Input width or target count does not match the network
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// Classification needs at least two labels
    #[error("Need at least 2 classes, found {0}")]
    TooFewClasses(usize),

    /// Feature matrix holds a NaN or infinite entry
    #[error("Non-finite feature at row {row}, column {column}")]
    NonFiniteInput { row: usize, column: usize },

    /// Loss became NaN or infinite; weights are no longer usable
    #[error("Non-finite loss at epoch {epoch}")]
    NonFiniteLoss { epoch: usize },

    /// Invalid hyperparameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tensor backend or weight record failure
    #[error("Backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}
