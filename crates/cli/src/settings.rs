//! Application Settings
//!
//! Layers built-in defaults, an optional TOML file and `FAULT_DIAG__*`
//! environment variables into one [`AppConfig`].

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use evaluator::PipelineConfig;
use feature_engine::{DEFAULT_CORRELATION_THRESHOLD, ENGINEERED_FEATURES};
use inference_engine::CappingPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Environment variable prefix, e.g. `FAULT_DIAG__PIPELINE__TRAINING__MAX_EPOCHS`
const ENV_PREFIX: &str = "FAULT_DIAG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Label column name in tabular files
    pub label_column: String,
    /// Engineered features kept for training, in column order
    pub retained_features: Vec<String>,
    /// Absolute Pearson coefficient above which raw statistics are redundant
    pub correlation_threshold: f64,
    /// ANOVA significance level
    pub significance_alpha: f64,
    /// Fold count for `cross-validate`
    pub cv_folds: usize,
    /// Whether `predict` clamps into the training bounds
    pub capping_policy: CappingPolicy,
    pub pipeline: PipelineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            label_column: dataset::DEFAULT_LABEL_COLUMN.to_string(),
            retained_features: ENGINEERED_FEATURES.iter().map(|f| f.to_string()).collect(),
            correlation_threshold: DEFAULT_CORRELATION_THRESHOLD,
            significance_alpha: 0.05,
            cv_folds: 5,
            capping_policy: CappingPolicy::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Resolve the effective configuration
pub fn load(path: Option<&Path>) -> Result<AppConfig> {
    let mut builder = Config::builder().add_source(
        Config::try_from(&AppConfig::default()).context("Failed to encode default configuration")?,
    );
    if let Some(path) = path {
        debug!("Reading configuration from {}", path.display());
        builder = builder.add_source(File::from(path).format(FileFormat::Toml));
    }
    let config = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to assemble configuration")?;

    config
        .try_deserialize()
        .context("Invalid configuration")
}
