//! Pipeline Error Types

use classifier::TrainError;
use dataset::{SchemaError, SplitError};
use preprocessing::PreprocessError;
use thiserror::Error;

/// Errors from any stage of fitting or evaluating the pipeline
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("Split failed: {0}")]
    Split(#[from] SplitError),

    #[error("Preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),

    #[error("Training failed: {0}")]
    Train(#[from] TrainError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}
