//! Model Evaluation
//!
//! Fits the preprocessing chain and classifier on a training population,
//! scores held-out data and runs stratified k-fold cross-validation.

mod cross_validation;
mod error;
mod holdout;
mod metrics;
mod pipeline;

pub use cross_validation::{cross_validate, CrossValidationReport, FoldResult};
pub use error::PipelineError;
pub use holdout::{holdout_evaluate, HoldoutReport};
pub use metrics::{ClassMetrics, ConfusionMatrix};
pub use pipeline::{fit_pipeline, train_and_evaluate, FittedPipeline, PipelineConfig};
