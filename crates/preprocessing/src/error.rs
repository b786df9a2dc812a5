//! Preprocessing Error Types

use dataset::{DatasetRole, SchemaError};
use thiserror::Error;

/// Errors during capping, balancing or scaling
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PreprocessError {
    /// No rows to fit statistics on
    #[error("Cannot fit {operation} on an empty dataset")]
    EmptyDataset { operation: &'static str },

    /// Fit semantics invoked on non-training data
    #[error("{operation} refused {role} data: fitting is only allowed on the training population")]
    LeakageGuard {
        operation: &'static str,
        role: DatasetRole,
    },

    /// Feature whose spread breaks the transformation
    #[error("Feature {feature} is degenerate: {reason}")]
    DegenerateFeature { feature: String, reason: String },

    /// Parameters fitted on a different feature list
    #[error("Feature mismatch: fitted on {expected:?}, got {actual:?}")]
    FeatureMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// Too few minority samples to interpolate between
    #[error("Minority class {label} has {count} samples, need at least 2")]
    InsufficientMinority { label: String, count: usize },

    /// Configured label absent from the dataset
    #[error("Label {0} not present in dataset")]
    UnknownLabel(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Reject roles that must never contribute fit statistics
pub(crate) fn guard_fit_role(operation: &'static str, role: DatasetRole) -> Result<(), PreprocessError> {
    match role {
        DatasetRole::Validation | DatasetRole::Test => {
            Err(PreprocessError::LeakageGuard { operation, role })
        }
        DatasetRole::Training | DatasetRole::Unsplit => Ok(()),
    }
}

/// Require the exact feature list a transformation was fitted on
pub(crate) fn check_features(expected: &[String], actual: &[String]) -> Result<(), PreprocessError> {
    if expected != actual {
        return Err(PreprocessError::FeatureMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}
