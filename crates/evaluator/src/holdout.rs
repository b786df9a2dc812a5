//! Held-Out Evaluation

use crate::error::PipelineError;
use crate::metrics::ConfusionMatrix;
use classifier::{evaluate, Network, TrainConfig, TrainingData};
use dataset::{Dataset, LabelSet};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Loss, accuracy and confusion matrix on a held-out set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldoutReport {
    pub loss: f64,
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
}

/// Score `test` with the network in evaluation mode
///
/// `test` must already carry the preprocessing fitted on the training
/// population (see [`crate::FittedPipeline::prepare`]).
pub fn holdout_evaluate(
    network: &Network,
    test: &Dataset,
    labels: &LabelSet,
    config: &TrainConfig,
) -> Result<HoldoutReport, PipelineError> {
    let data = TrainingData::from_dataset(test, labels)?;
    let evaluation = evaluate(network, &data, config)?;
    let confusion = ConfusionMatrix::from_predictions(labels, &evaluation.predictions, data.targets());

    info!(
        "Holdout on {} {} records: loss {:.4}, accuracy {:.3}",
        test.len(),
        test.role(),
        evaluation.loss,
        evaluation.accuracy
    );

    Ok(HoldoutReport {
        loss: evaluation.loss,
        accuracy: evaluation.accuracy,
        confusion,
    })
}
