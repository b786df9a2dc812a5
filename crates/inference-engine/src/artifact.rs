//! Model Artifact Persistence

use crate::InferenceError;
use chrono::{DateTime, Utc};
use classifier::{Network, TrainingReport};
use dataset::LabelSet;
use feature_engine::FeatureEngineer;
use preprocessing::{CappingBounds, ScalingParameters};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Bumped whenever the persisted layout changes
pub const ARTIFACT_VERSION: u32 = 1;

/// On-disk encoding, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// `.json`: human-readable
    Json,
    /// Anything else: postcard
    Binary,
}

impl ArtifactFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ArtifactFormat::Json,
            _ => ArtifactFormat::Binary,
        }
    }
}

/// Outcome of the training run that produced an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub epochs: usize,
    pub best_epoch: usize,
    pub best_val_loss: f64,
    pub stopped_early: bool,
}

impl From<&TrainingReport> for TrainingSummary {
    fn from(report: &TrainingReport) -> Self {
        Self {
            epochs: report.history.len(),
            best_epoch: report.best_epoch,
            best_val_loss: report.best_val_loss,
            stopped_early: report.stopped_early,
        }
    }
}

/// Trained network plus everything needed to reproduce its input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    /// Engineered feature order the network was trained on
    pub feature_names: Vec<String>,
    /// Class order of the network output
    pub labels: LabelSet,
    /// Training-population capping bounds, if capping was enabled
    pub capping: Option<CappingBounds>,
    pub scaling: ScalingParameters,
    pub network: Network,
    pub training: Option<TrainingSummary>,
}

impl ModelArtifact {
    pub fn new(
        labels: LabelSet,
        capping: Option<CappingBounds>,
        scaling: ScalingParameters,
        network: Network,
    ) -> Self {
        Self {
            format_version: ARTIFACT_VERSION,
            created_at: Utc::now(),
            feature_names: scaling.feature_names().to_vec(),
            labels,
            capping,
            scaling,
            network,
            training: None,
        }
    }

    /// Attach the summary of the run that fitted `network`
    pub fn with_training(mut self, report: &TrainingReport) -> Self {
        self.training = Some(TrainingSummary::from(report));
        self
    }

    /// Check that every part of the artifact agrees on features and labels
    pub fn validate(&self) -> Result<(), InferenceError> {
        if self.format_version != ARTIFACT_VERSION {
            return Err(InferenceError::ArtifactMismatch(format!(
                "format version {} (expected {})",
                self.format_version, ARTIFACT_VERSION
            )));
        }
        FeatureEngineer::with_retained(&self.feature_names).map_err(|e| {
            InferenceError::ArtifactMismatch(format!("feature list not producible: {}", e))
        })?;
        if self.scaling.feature_names() != self.feature_names.as_slice() {
            return Err(InferenceError::ArtifactMismatch(format!(
                "scaling fitted on {:?}, artifact lists {:?}",
                self.scaling.feature_names(),
                self.feature_names
            )));
        }
        if let Some(capping) = &self.capping {
            if capping.feature_names() != self.feature_names.as_slice() {
                return Err(InferenceError::ArtifactMismatch(format!(
                    "capping fitted on {:?}, artifact lists {:?}",
                    capping.feature_names(),
                    self.feature_names
                )));
            }
        }
        if self.network.input_dim() != self.feature_names.len() {
            return Err(InferenceError::ArtifactMismatch(format!(
                "network expects {} inputs, artifact lists {} features",
                self.network.input_dim(),
                self.feature_names.len()
            )));
        }
        if self.network.n_classes() != self.labels.len() {
            return Err(InferenceError::ArtifactMismatch(format!(
                "network emits {} classes, artifact lists {} labels",
                self.network.n_classes(),
                self.labels.len()
            )));
        }
        Ok(())
    }

    /// Write to `path` in the format implied by its extension
    pub fn save(&self, path: &Path) -> Result<(), InferenceError> {
        let bytes = match ArtifactFormat::from_path(path) {
            ArtifactFormat::Json => serde_json::to_vec_pretty(self)
                .map_err(|e| InferenceError::Serialization(e.to_string()))?,
            ArtifactFormat::Binary => {
                postcard::to_allocvec(self).map_err(|e| InferenceError::Serialization(e.to_string()))?
            }
        };
        fs::write(path, &bytes)?;
        info!(
            "Saved model artifact to {} ({} bytes, {} features, {} labels)",
            path.display(),
            bytes.len(),
            self.feature_names.len(),
            self.labels.len()
        );
        Ok(())
    }

    /// Read from `path` and validate
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let bytes = fs::read(path)?;
        let artifact: Self = match ArtifactFormat::from_path(path) {
            ArtifactFormat::Json => serde_json::from_slice(&bytes)
                .map_err(|e| InferenceError::Serialization(e.to_string()))?,
            ArtifactFormat::Binary => {
                postcard::from_bytes(&bytes).map_err(|e| InferenceError::Serialization(e.to_string()))?
            }
        };
        artifact.validate()?;
        info!(
            "Loaded model artifact from {} (created {})",
            path.display(),
            artifact.created_at
        );
        if let Some(training) = &artifact.training {
            debug!(
                "Artifact trained for {} epochs, best validation loss {:.4} at epoch {}",
                training.epochs, training.best_val_loss, training.best_epoch
            );
        }
        Ok(artifact)
    }
}
