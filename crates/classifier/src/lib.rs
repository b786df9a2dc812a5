//! Fault Classifier
//!
//! Feed-forward network with four Linear → BatchNorm → LeakyReLU → Dropout
//! blocks and a softmax output, built on burn and trained with Adam on
//! label-smoothed cross-entropy. Training runs on the autodiff backend; the
//! returned [`Network`] holds the evaluation-mode module only.

mod data;
mod error;
mod model;
mod network;
mod optimizer;
mod trainer;

pub use data::TrainingData;
pub use error::TrainError;
pub use model::{Block, InferenceBackend, Mlp, TrainBackend};
pub use network::{Network, NetworkConfig};
pub use optimizer::PlateauSchedule;
pub use trainer::{
    evaluate, EpochEvent, EpochObserver, Evaluation, TrainConfig, Trainer, TrainingReport,
    TrainingWarning,
};
