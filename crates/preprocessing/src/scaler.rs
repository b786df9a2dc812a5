//! Z-Score Standardization

use crate::error::{check_features, PreprocessError};
use dataset::{Dataset, DatasetRole};
use feature_engine::statistics::{mean, std_dev};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Standard deviations below this are treated as zero
const MIN_SCALE: f64 = 1e-12;

/// What to do with a zero-variance feature
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegenerateScalePolicy {
    /// Use scale = 1 (center only) and record the feature
    #[default]
    UnitScale,
    /// Fail the fit
    Reject,
}

/// Scaler configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalerConfig {
    pub degenerate_policy: DegenerateScalePolicy,
}

/// Per-feature (center, scale) fitted on a training population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingParameters {
    feature_names: Vec<String>,
    centers: Vec<f64>,
    scales: Vec<f64>,
    degenerate_features: Vec<String>,
    /// Number of rows the parameters were fitted on
    fitted_rows: usize,
}

impl ScalingParameters {
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn centers(&self) -> &[f64] {
        &self.centers
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    pub fn degenerate_features(&self) -> &[String] {
        &self.degenerate_features
    }

    pub fn fitted_rows(&self) -> usize {
        self.fitted_rows
    }

    /// Apply `(x - center) / scale` to every record
    pub fn transform(&self, dataset: &mut Dataset) -> Result<(), PreprocessError> {
        check_features(&self.feature_names, dataset.feature_names())?;
        for record in dataset.records_mut() {
            for (j, value) in record.values.iter_mut().enumerate() {
                *value = (*value - self.centers[j]) / self.scales[j];
            }
        }
        Ok(())
    }

    /// Scale one engineered vector in place
    pub fn transform_vector(&self, values: &mut [f64]) -> Result<(), PreprocessError> {
        self.check_width(values.len())?;
        for (j, value) in values.iter_mut().enumerate() {
            *value = (*value - self.centers[j]) / self.scales[j];
        }
        Ok(())
    }

    /// Undo [`ScalingParameters::transform_vector`]
    pub fn inverse_transform_vector(&self, values: &mut [f64]) -> Result<(), PreprocessError> {
        self.check_width(values.len())?;
        for (j, value) in values.iter_mut().enumerate() {
            *value = *value * self.scales[j] + self.centers[j];
        }
        Ok(())
    }

    fn check_width(&self, width: usize) -> Result<(), PreprocessError> {
        if width != self.centers.len() {
            return Err(PreprocessError::FeatureMismatch {
                expected: self.feature_names.clone(),
                actual: vec![format!("<{} values>", width)],
            });
        }
        Ok(())
    }
}

/// Fits standardization parameters on training data only
#[derive(Debug, Clone, Default)]
pub struct FeatureScaler {
    config: ScalerConfig,
}

impl FeatureScaler {
    pub fn new(config: ScalerConfig) -> Self {
        Self { config }
    }

    /// Per-feature mean and population standard deviation
    pub fn fit(&self, dataset: &Dataset) -> Result<ScalingParameters, PreprocessError> {
        if dataset.role() != DatasetRole::Training {
            return Err(PreprocessError::LeakageGuard {
                operation: "feature scaling",
                role: dataset.role(),
            });
        }
        if dataset.is_empty() {
            return Err(PreprocessError::EmptyDataset {
                operation: "feature scaling",
            });
        }

        let n = dataset.n_features();
        let mut centers = Vec::with_capacity(n);
        let mut scales = Vec::with_capacity(n);
        let mut degenerate_features = Vec::new();

        for (j, name) in dataset.feature_names().iter().enumerate() {
            let column = dataset.column(j);
            let center = mean(&column);
            let mut scale = std_dev(&column);

            if scale < MIN_SCALE {
                match self.config.degenerate_policy {
                    DegenerateScalePolicy::Reject => {
                        return Err(PreprocessError::DegenerateFeature {
                            feature: name.clone(),
                            reason: "zero standard deviation".into(),
                        });
                    }
                    DegenerateScalePolicy::UnitScale => {
                        warn!("Feature {} has zero standard deviation; using scale 1", name);
                        degenerate_features.push(name.clone());
                        scale = 1.0;
                    }
                }
            }
            centers.push(center);
            scales.push(scale);
        }

        info!(
            "Fitted scaling parameters on {} training records",
            dataset.len()
        );

        Ok(ScalingParameters {
            feature_names: dataset.feature_names().to_vec(),
            centers,
            scales,
            degenerate_features,
            fitted_rows: dataset.len(),
        })
    }
}
