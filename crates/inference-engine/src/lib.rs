//! Fault Inference Engine
//!
//! Loads a persisted model artifact and predicts the fault class of new raw
//! statistics: engineer, cap, scale with the persisted parameters, then run
//! the network in evaluation mode.

mod artifact;
mod engine;

pub use artifact::{ArtifactFormat, ModelArtifact, TrainingSummary, ARTIFACT_VERSION};
pub use engine::{CappingPolicy, InferenceService, Prediction};

use classifier::TrainError;
use dataset::SchemaError;
use preprocessing::PreprocessError;
use thiserror::Error;

/// Errors during artifact handling or inference
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Artifact contents disagree with each other or with the runtime
    #[error("Artifact mismatch: {0}")]
    ArtifactMismatch(String),

    #[error("Artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Artifact serialization failed: {0}")]
    Serialization(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error("Model evaluation failed: {0}")]
    Model(#[from] TrainError),
}
