//! Training Pipeline
//!
//! Order of operations on a training population:
//!
//! 1. stratified validation hold-out
//! 2. IQR capping bounds fitted and applied
//! 3. SMOTE oversampling of the minority class
//! 4. z-score parameters fitted and applied
//! 5. network training with early stopping on the validation split
//!
//! Validation and test data only ever receive parameters fitted in steps 2
//! and 4.

use crate::error::PipelineError;
use crate::holdout::{holdout_evaluate, HoldoutReport};
use classifier::{EpochObserver, Network, TrainConfig, Trainer, TrainingData, TrainingReport};
use dataset::{stratified_split, Dataset, DatasetRole, LabelSet, SplitConfig};
use preprocessing::{
    BalanceReport, BalancerConfig, CappingBounds, CappingConfig, ClassBalancer, FeatureScaler,
    OutlierCapper, ScalerConfig, ScalingParameters,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Configuration of every pipeline stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub split: SplitConfig,
    pub capping: CappingConfig,
    pub balancing: BalancerConfig,
    pub scaling: ScalerConfig,
    pub training: TrainConfig,
}

/// Everything fitted on one training population
#[derive(Debug, Clone)]
pub struct FittedPipeline {
    labels: LabelSet,
    capping: Option<CappingBounds>,
    balance: Option<BalanceReport>,
    scaling: ScalingParameters,
    network: Network,
    report: TrainingReport,
}

impl FittedPipeline {
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn feature_names(&self) -> &[String] {
        self.scaling.feature_names()
    }

    /// `None` when capping was disabled
    pub fn capping(&self) -> Option<&CappingBounds> {
        self.capping.as_ref()
    }

    /// `None` when balancing was disabled or skipped
    pub fn balance(&self) -> Option<&BalanceReport> {
        self.balance.as_ref()
    }

    pub fn scaling(&self) -> &ScalingParameters {
        &self.scaling
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn report(&self) -> &TrainingReport {
        &self.report
    }

    /// Apply the fitted capping and scaling to evaluation data
    pub fn prepare(&self, dataset: &Dataset) -> Result<Dataset, PipelineError> {
        let mut prepared = dataset.clone();
        if let Some(bounds) = &self.capping {
            bounds.apply(&mut prepared)?;
        }
        self.scaling.transform(&mut prepared)?;
        Ok(prepared)
    }
}

/// Fit capping, balancing, scaling and the network on `train`
///
/// `labels` fixes the class order of the network output, so every fold of
/// a cross-validation run shares it.
pub fn fit_pipeline(
    train: &Dataset,
    labels: &LabelSet,
    config: &PipelineConfig,
    observer: &mut dyn EpochObserver,
) -> Result<FittedPipeline, PipelineError> {
    let trainer = Trainer::new(config.training.clone())?;

    let (mut fit_set, mut validation) = stratified_split(
        train,
        config.split.validation_fraction,
        config.split.seed,
        (DatasetRole::Training, DatasetRole::Validation),
    )?;

    let capping = if config.capping.enabled {
        let bounds = OutlierCapper::new(config.capping.clone())?.fit(&fit_set)?;
        let report = bounds.apply(&mut fit_set)?;
        bounds.apply(&mut validation)?;
        info!("Capped {} training values", report.total());
        Some(bounds)
    } else {
        None
    };

    let balance = if config.balancing.enabled {
        let label = &config.balancing.minority_label;
        // Interpolation needs a neighbour, so a lone sample is treated like an absent class
        match fit_set.class_counts().get(label).copied().unwrap_or(0) {
            0 => {
                warn!("Minority class {} absent from training data; skipping oversampling", label);
                None
            }
            1 => {
                warn!("Only one {} sample in training data; skipping oversampling", label);
                None
            }
            _ => Some(ClassBalancer::new(config.balancing.clone())?.balance(&mut fit_set)?),
        }
    } else {
        None
    };

    let scaling = FeatureScaler::new(config.scaling.clone()).fit(&fit_set)?;
    scaling.transform(&mut fit_set)?;
    scaling.transform(&mut validation)?;

    let train_data = TrainingData::from_dataset(&fit_set, labels)?;
    let validation_data = TrainingData::from_dataset(&validation, labels)?;
    let (network, report) = trainer.train(&train_data, &validation_data, observer)?;

    Ok(FittedPipeline {
        labels: labels.clone(),
        capping,
        balance,
        scaling,
        network,
        report,
    })
}

/// Stratified train/test split, pipeline fit on the training side and
/// holdout evaluation on the test side
pub fn train_and_evaluate(
    dataset: &Dataset,
    config: &PipelineConfig,
    observer: &mut dyn EpochObserver,
) -> Result<(FittedPipeline, HoldoutReport), PipelineError> {
    let labels = dataset.label_set();
    let (train, test) = stratified_split(
        dataset,
        config.split.test_fraction,
        config.split.seed,
        (DatasetRole::Training, DatasetRole::Test),
    )?;
    info!(
        "Split {} records into {} training and {} test",
        dataset.len(),
        train.len(),
        test.len()
    );

    let fitted = fit_pipeline(&train, &labels, config, observer)?;
    let prepared = fitted.prepare(&test)?;
    let report = holdout_evaluate(fitted.network(), &prepared, &labels, &config.training)?;
    Ok((fitted, report))
}
