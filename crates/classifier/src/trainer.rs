//! Mini-Batch Training Loop

use crate::data::TrainingData;
use crate::error::TrainError;
use crate::model::{
    class_tensor, loss_function, matrix_tensor, scalar, tensor_matrix, InferenceBackend, Mlp,
    TrainBackend, DEVICE,
};
use crate::network::{argmax_rows, check_shape, Network, NetworkConfig};
use crate::optimizer::{adam, PlateauSchedule};
use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::activation::softmax;
use burn::tensor::backend::Backend;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Training hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub network: NetworkConfig,
    /// Hard epoch cap (default: 300)
    pub max_epochs: usize,
    /// Mini-batch size (default: 32)
    pub batch_size: usize,
    /// Initial Adam learning rate (default: 0.001)
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub adam_epsilon: f64,
    /// L2 coefficient on every dense kernel (default: 0.001)
    pub l2_penalty: f64,
    /// Cross-entropy label smoothing (default: 0.1)
    pub label_smoothing: f64,
    /// Learning-rate multiplier on plateau (default: 0.5)
    pub plateau_factor: f64,
    /// Epochs without validation improvement before reducing (default: 10)
    pub plateau_patience: usize,
    /// Learning-rate floor (default: 1e-4)
    pub min_learning_rate: f64,
    /// Epochs without validation improvement before stopping (default: 20)
    pub early_stopping_patience: usize,
    /// Return the best-validation weights rather than the last ones
    pub restore_best_weights: bool,
    /// Seed for the backend generator (initialisation, dropout) and shuffling
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            max_epochs: 300,
            batch_size: 32,
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            adam_epsilon: 1e-7,
            l2_penalty: 0.001,
            label_smoothing: 0.1,
            plateau_factor: 0.5,
            plateau_patience: 10,
            min_learning_rate: 1e-4,
            early_stopping_patience: 20,
            restore_best_weights: true,
            seed: 42,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<(), TrainError> {
        self.network.validate()?;
        if self.max_epochs == 0 || self.batch_size == 0 {
            return Err(TrainError::InvalidConfig(
                "max_epochs and batch_size must be positive".into(),
            ));
        }
        if !(self.learning_rate > 0.0) {
            return Err(TrainError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.label_smoothing) {
            return Err(TrainError::InvalidConfig(format!(
                "label_smoothing must be in [0, 1), got {}",
                self.label_smoothing
            )));
        }
        if !(self.plateau_factor > 0.0 && self.plateau_factor < 1.0) {
            return Err(TrainError::InvalidConfig(format!(
                "plateau_factor must be in (0, 1), got {}",
                self.plateau_factor
            )));
        }
        if self.l2_penalty < 0.0 {
            return Err(TrainError::InvalidConfig("l2_penalty must be non-negative".into()));
        }
        Ok(())
    }
}

/// Metrics of one completed epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochEvent {
    /// 1-based
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    pub train_accuracy: f64,
    pub val_accuracy: f64,
    /// Learning rate used during this epoch
    pub learning_rate: f64,
}

/// Receives one event per epoch
pub trait EpochObserver {
    fn on_epoch(&mut self, event: &EpochEvent);
}

impl<F: FnMut(&EpochEvent)> EpochObserver for F {
    fn on_epoch(&mut self, event: &EpochEvent) {
        self(event)
    }
}

/// Non-fatal training outcome worth surfacing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainingWarning {
    /// Hit the epoch cap before early stopping triggered
    EpochCapReached { epochs: usize },
}

impl fmt::Display for TrainingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingWarning::EpochCapReached { epochs } => {
                write!(f, "training reached the {} epoch cap without converging", epochs)
            }
        }
    }
}

/// Summary of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub history: Vec<EpochEvent>,
    /// Epoch whose weights were returned when restoring
    pub best_epoch: usize,
    pub best_val_loss: f64,
    pub stopped_early: bool,
    pub warnings: Vec<TrainingWarning>,
}

/// Evaluation-mode loss and accuracy on a labelled set
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Smoothed cross-entropy plus the L2 term
    pub loss: f64,
    pub accuracy: f64,
    pub predictions: Vec<usize>,
    pub probabilities: Array2<f64>,
}

/// Score the evaluation-mode network over `data`
pub fn evaluate(network: &Network, data: &TrainingData, config: &TrainConfig) -> Result<Evaluation, TrainError> {
    if data.is_empty() {
        return Err(TrainError::EmptyDataset("evaluation"));
    }
    if data.n_classes() != network.n_classes() {
        return Err(TrainError::ShapeMismatch {
            expected: format!("{} classes", network.n_classes()),
            actual: data.n_classes().to_string(),
        });
    }
    let logits = network.logits(data.features().view())?;
    let cross_entropy = loss_function::<InferenceBackend>(config.label_smoothing, &DEVICE)
        .forward(logits.clone(), class_tensor(data.targets(), &DEVICE));
    let loss = scalar(cross_entropy) + config.l2_penalty * scalar(network.model().squared_weight_norm());
    let probabilities = tensor_matrix(softmax(logits, 1))?;
    let predictions = argmax_rows(&probabilities);
    Ok(Evaluation {
        loss,
        accuracy: accuracy(&predictions, data.targets()),
        predictions,
        probabilities,
    })
}

/// Fraction of rows whose prediction equals the target
pub(crate) fn accuracy(predictions: &[usize], targets: &[usize]) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    let correct = predictions.iter().zip(targets).filter(|(p, t)| p == t).count();
    correct as f64 / targets.len() as f64
}

/// Fits a freshly initialised [`Network`]
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainConfig,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> Result<Self, TrainError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Train on `train`, monitoring `validation` for the schedule and early stopping
    pub fn train(
        &self,
        train: &TrainingData,
        validation: &TrainingData,
        observer: &mut dyn EpochObserver,
    ) -> Result<(Network, TrainingReport), TrainError> {
        let config = &self.config;
        if train.is_empty() {
            return Err(TrainError::EmptyDataset("training"));
        }
        if validation.is_empty() {
            return Err(TrainError::EmptyDataset("validation"));
        }
        if validation.n_features() != train.n_features() || validation.n_classes() != train.n_classes() {
            return Err(TrainError::ShapeMismatch {
                expected: format!("{} features, {} classes", train.n_features(), train.n_classes()),
                actual: format!(
                    "{} features, {} classes",
                    validation.n_features(),
                    validation.n_classes()
                ),
            });
        }

        let (input_dim, n_classes) = (train.n_features(), train.n_classes());
        let snapshot = |model: &Mlp<TrainBackend>| {
            Network::from_model(input_dim, n_classes, config.network.clone(), model.valid())
        };

        check_shape(input_dim, n_classes, &config.network)?;
        TrainBackend::seed(config.seed);
        let mut model: Mlp<TrainBackend> = Mlp::new(input_dim, n_classes, &config.network, &DEVICE);
        let mut optimizer =
            adam(config.beta1, config.beta2, config.adam_epsilon).init::<TrainBackend, Mlp<TrainBackend>>();
        let loss_fn = loss_function::<TrainBackend>(config.label_smoothing, &DEVICE);
        let mut schedule = PlateauSchedule::new(
            config.plateau_factor,
            config.plateau_patience,
            config.min_learning_rate,
        );
        let mut learning_rate = config.learning_rate;
        let mut rng = StdRng::seed_from_u64(config.seed);

        info!(
            "Training on {} samples ({} validation), {} features, {} classes",
            train.len(),
            validation.len(),
            input_dim,
            n_classes
        );

        let mut indices: Vec<usize> = (0..train.len()).collect();
        let mut history = Vec::new();
        let mut best: Option<(usize, f64, Network)> = None;
        let mut wait = 0;
        let mut stopped_early = false;

        for epoch in 1..=config.max_epochs {
            indices.shuffle(&mut rng);
            let mut loss_sum = 0.0;
            let mut correct = 0usize;

            for batch in indices.chunks(config.batch_size) {
                let (x, y) = train.batch(batch);
                let logits = model.forward(matrix_tensor(x.view(), &DEVICE));
                let cross_entropy = loss_fn.forward(logits.clone(), class_tensor(&y, &DEVICE));
                let batch_loss = scalar(cross_entropy.clone());
                if !batch_loss.is_finite() {
                    return Err(TrainError::NonFiniteLoss { epoch });
                }

                let objective = cross_entropy + model.squared_weight_norm().mul_scalar(config.l2_penalty);
                let grads = GradientsParams::from_grads(objective.backward(), &model);
                model = optimizer.step(learning_rate, model, grads);

                loss_sum += batch_loss * batch.len() as f64;
                correct += argmax_rows(&tensor_matrix(logits)?)
                    .iter()
                    .zip(&y)
                    .filter(|(p, t)| p == t)
                    .count();
            }

            let network = snapshot(&model);
            let train_loss =
                loss_sum / train.len() as f64 + config.l2_penalty * scalar(network.model().squared_weight_norm());
            let val = evaluate(&network, validation, config)?;
            if !train_loss.is_finite() || !val.loss.is_finite() {
                return Err(TrainError::NonFiniteLoss { epoch });
            }

            let event = EpochEvent {
                epoch,
                train_loss,
                val_loss: val.loss,
                train_accuracy: correct as f64 / train.len() as f64,
                val_accuracy: val.accuracy,
                learning_rate,
            };
            debug!(
                "Epoch {}: loss {:.4} acc {:.3} val_loss {:.4} val_acc {:.3} lr {:.1e}",
                epoch, event.train_loss, event.train_accuracy, event.val_loss, event.val_accuracy, event.learning_rate
            );
            observer.on_epoch(&event);
            history.push(event);

            let improved = best.as_ref().map_or(true, |(_, loss, _)| val.loss < *loss);
            if improved {
                best = Some((epoch, val.loss, network));
                wait = 0;
            } else {
                wait += 1;
                if wait >= config.early_stopping_patience {
                    stopped_early = true;
                    info!("Early stopping at epoch {}", epoch);
                    break;
                }
            }

            learning_rate = schedule.step(val.loss, learning_rate);
        }

        let (best_epoch, best_val_loss, best_network) = match best {
            Some(best) => best,
            None => return Err(TrainError::EmptyDataset("training")),
        };
        let network = if config.restore_best_weights {
            best_network
        } else {
            snapshot(&model)
        };

        let mut warnings = Vec::new();
        if !stopped_early {
            let warning = TrainingWarning::EpochCapReached {
                epochs: config.max_epochs,
            };
            warn!("{}", warning);
            warnings.push(warning);
        }

        info!(
            "Training finished after {} epochs, best epoch {} (val_loss {:.4})",
            history.len(),
            best_epoch,
            best_val_loss
        );

        Ok((
            network,
            TrainingReport {
                history,
                best_epoch,
                best_val_loss,
                stopped_early,
                warnings,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// Two well separated clusters on one feature
    fn clusters(per_class: usize, offset: f64) -> TrainingData {
        let n = 2 * per_class;
        let features = Array2::from_shape_fn((n, 1), |(i, _)| {
            let jitter = (i % per_class) as f64 * 0.05 + offset;
            if i < per_class {
                -1.0 + jitter
            } else {
                1.0 + jitter
            }
        });
        let targets = (0..n).map(|i| usize::from(i >= per_class)).collect();
        TrainingData::new(features, targets, 2).unwrap()
    }

    fn quick_config() -> TrainConfig {
        TrainConfig {
            network: NetworkConfig {
                hidden_layers: vec![16, 8],
                dropout_blocks: 1,
                dropout_rate: 0.2,
                ..Default::default()
            },
            max_epochs: 60,
            batch_size: 8,
            learning_rate: 0.01,
            ..Default::default()
        }
    }

    #[test]
    fn test_learns_separable_clusters() {
        let trainer = Trainer::new(quick_config()).unwrap();
        let (network, report) = trainer
            .train(&clusters(20, 0.0), &clusters(5, 0.02), &mut |_: &EpochEvent| {})
            .unwrap();
        let eval = evaluate(&network, &clusters(5, 0.01), trainer.config()).unwrap();
        assert!(eval.accuracy >= 0.9, "accuracy {}", eval.accuracy);
        assert!(report.best_epoch >= 1);
    }

    #[test]
    fn test_observer_sees_every_epoch() {
        let trainer = Trainer::new(quick_config()).unwrap();
        let mut seen = Vec::new();
        let (_, report) = trainer
            .train(&clusters(10, 0.0), &clusters(4, 0.0), &mut |e: &EpochEvent| {
                seen.push(e.epoch)
            })
            .unwrap();
        assert_eq!(seen.len(), report.history.len());
        assert_eq!(seen, (1..=seen.len()).collect::<Vec<_>>());
        assert_eq!(report.history[0].learning_rate, 0.01);
    }

    #[test]
    fn test_epoch_cap_warning() {
        let config = TrainConfig {
            max_epochs: 3,
            ..quick_config()
        };
        let trainer = Trainer::new(config).unwrap();
        let (_, report) = trainer
            .train(&clusters(10, 0.0), &clusters(4, 0.0), &mut |_: &EpochEvent| {})
            .unwrap();
        assert!(!report.stopped_early);
        assert_eq!(
            report.warnings,
            vec![TrainingWarning::EpochCapReached { epochs: 3 }]
        );
    }

    #[test]
    fn test_early_stopping_restores_best() {
        // Validation labels are the inverse of training labels, so validation
        // loss worsens as training succeeds
        let train = clusters(10, 0.0);
        let flipped: Vec<usize> = train.targets().iter().map(|t| 1 - t).collect();
        let validation = TrainingData::new(train.features().clone(), flipped, 2).unwrap();
        let config = TrainConfig {
            max_epochs: 200,
            early_stopping_patience: 5,
            ..quick_config()
        };
        let trainer = Trainer::new(config).unwrap();
        let (network, report) = trainer
            .train(&train, &validation, &mut |_: &EpochEvent| {})
            .unwrap();

        assert!(report.stopped_early);
        assert!(report.warnings.is_empty());
        assert_eq!(report.history.len(), report.best_epoch + 5);
        let restored = evaluate(&network, &validation, trainer.config()).unwrap();
        assert!((restored.loss - report.best_val_loss).abs() < 1e-9);
    }

    #[test]
    fn test_overflowing_features_abort_at_first_epoch() {
        // Finite inputs whose products overflow inside the first block
        let features = Array2::from_elem((8, 4), f64::MAX);
        let targets = (0..8).map(|i| i % 2).collect();
        let train = TrainingData::new(features, targets, 2).unwrap();
        let trainer = Trainer::new(quick_config()).unwrap();
        assert_eq!(
            trainer
                .train(&train, &train, &mut |_: &EpochEvent| {})
                .unwrap_err(),
            TrainError::NonFiniteLoss { epoch: 1 }
        );
    }

    #[test]
    fn test_nan_feature_rejected_before_training() {
        let mut features = clusters(4, 0.0).features().clone();
        features[[2, 0]] = f64::NAN;
        assert_eq!(
            TrainingData::new(features, vec![0, 0, 0, 0, 1, 1, 1, 1], 2).unwrap_err(),
            TrainError::NonFiniteInput { row: 2, column: 0 }
        );
    }

    #[test]
    fn test_evaluation_loss_includes_weight_penalty() {
        let trainer = Trainer::new(quick_config()).unwrap();
        let (network, _) = trainer
            .train(&clusters(6, 0.0), &clusters(3, 0.0), &mut |_: &EpochEvent| {})
            .unwrap();
        let data = clusters(3, 0.0);
        let plain = TrainConfig {
            l2_penalty: 0.0,
            ..quick_config()
        };
        let with_penalty = evaluate(&network, &data, trainer.config()).unwrap();
        let without = evaluate(&network, &data, &plain).unwrap();
        assert!(with_penalty.loss > without.loss);
        assert_eq!(with_penalty.predictions, without.predictions);
    }

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(&[0, 1, 1, 2], &[0, 1, 2, 2]), 0.75);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn test_rejects_empty_validation() {
        let trainer = Trainer::new(quick_config()).unwrap();
        let empty = TrainingData::new(Array2::zeros((0, 1)), vec![], 2).unwrap();
        assert_eq!(
            trainer
                .train(&clusters(4, 0.0), &empty, &mut |_: &EpochEvent| {})
                .unwrap_err(),
            TrainError::EmptyDataset("validation")
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = TrainConfig {
            label_smoothing: 1.5,
            ..Default::default()
        };
        assert!(matches!(Trainer::new(config), Err(TrainError::InvalidConfig(_))));
    }
}
