//! Stratified K-Fold Cross-Validation

use crate::error::PipelineError;
use crate::holdout::holdout_evaluate;
use crate::pipeline::{fit_pipeline, PipelineConfig};
use classifier::EpochEvent;
use dataset::{Dataset, DatasetRole, FoldAssignment};
use feature_engine::statistics::{mean, std_dev};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Outcome of one held-out fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldResult {
    pub fold: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub loss: f64,
    pub accuracy: f64,
    /// Epochs run before stopping
    pub epochs: usize,
}

/// Per-fold accuracies and their summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationReport {
    pub folds: Vec<FoldResult>,
    pub fold_accuracies: Vec<f64>,
    pub mean_accuracy: f64,
    /// Population standard deviation across folds
    pub std_accuracy: f64,
}

/// Partition `dataset` into `k` stratified folds and train a fresh pipeline
/// per fold on the union of the others
///
/// Folds are assigned before any capping, balancing or scaling. Each fold's
/// network is seeded with `training.seed + fold`.
pub fn cross_validate(
    dataset: &Dataset,
    k: usize,
    config: &PipelineConfig,
) -> Result<CrossValidationReport, PipelineError> {
    let assignment = FoldAssignment::stratified(dataset, k, config.split.seed)?;
    let labels = dataset.label_set();
    let mut folds = Vec::with_capacity(k);

    for fold in 0..k {
        let train = dataset.subset(&assignment.training_indices(fold), DatasetRole::Training);
        let test = dataset.subset(assignment.fold(fold), DatasetRole::Test);

        let mut fold_config = config.clone();
        fold_config.training.seed = config.training.seed.wrapping_add(fold as u64);

        let fitted = fit_pipeline(&train, &labels, &fold_config, &mut |_: &EpochEvent| {})?;
        let prepared = fitted.prepare(&test)?;
        let holdout = holdout_evaluate(fitted.network(), &prepared, &labels, &fold_config.training)?;

        info!(
            "Fold {}/{}: accuracy {:.3} on {} samples",
            fold + 1,
            k,
            holdout.accuracy,
            test.len()
        );
        folds.push(FoldResult {
            fold,
            train_size: train.len(),
            test_size: test.len(),
            loss: holdout.loss,
            accuracy: holdout.accuracy,
            epochs: fitted.report().history.len(),
        });
    }

    let fold_accuracies: Vec<f64> = folds.iter().map(|f| f.accuracy).collect();
    let report = CrossValidationReport {
        mean_accuracy: mean(&fold_accuracies),
        std_accuracy: std_dev(&fold_accuracies),
        fold_accuracies,
        folds,
    };
    info!(
        "{}-fold cross-validation: mean accuracy {:.3} ± {:.3}",
        k, report.mean_accuracy, report.std_accuracy
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use classifier::{NetworkConfig, TrainConfig};
    use dataset::{FeatureRecord, SplitError};

    fn three_classes(per_class: usize) -> Dataset {
        let mut records = Vec::new();
        for i in 0..per_class {
            let t = i as f64 / per_class as f64;
            records.push(FeatureRecord::new(vec![t, 0.0], "Normal"));
            records.push(FeatureRecord::new(vec![6.0 + t, 3.0], "C1_open"));
            records.push(FeatureRecord::new(vec![-6.0 - t, -3.0], "R2_short"));
        }
        Dataset::from_records(vec!["a".into(), "b".into()], records).unwrap()
    }

    fn quick() -> PipelineConfig {
        PipelineConfig {
            training: TrainConfig {
                network: NetworkConfig {
                    hidden_layers: vec![16, 8],
                    ..Default::default()
                },
                max_epochs: 30,
                learning_rate: 0.01,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_every_sample_scored_once() {
        let dataset = three_classes(20);
        let report = cross_validate(&dataset, 5, &quick()).unwrap();
        assert_eq!(report.fold_accuracies.len(), 5);
        let scored: usize = report.folds.iter().map(|f| f.test_size).sum();
        assert_eq!(scored, dataset.len());
        for fold in &report.folds {
            assert_eq!(fold.train_size + fold.test_size, dataset.len());
        }
    }

    #[test]
    fn test_summary_statistics() {
        let report = cross_validate(&three_classes(20), 4, &quick()).unwrap();
        let expected = report.fold_accuracies.iter().sum::<f64>() / 4.0;
        assert!((report.mean_accuracy - expected).abs() < 1e-12);
        assert!(report.std_accuracy >= 0.0);
        assert!(report.mean_accuracy > 0.8);
    }

    #[test]
    fn test_invalid_fold_count() {
        let dataset = three_classes(2);
        assert_eq!(
            cross_validate(&dataset, 1, &quick()).unwrap_err(),
            PipelineError::Split(SplitError::InvalidFoldCount { k: 1, n: 6 })
        );
        assert!(matches!(
            cross_validate(&dataset, 7, &quick()),
            Err(PipelineError::Split(SplitError::InvalidFoldCount { .. }))
        ));
    }
}
