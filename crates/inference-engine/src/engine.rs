//! Inference Service Implementation

use crate::artifact::ModelArtifact;
use crate::InferenceError;
use dataset::RawTable;
use feature_engine::{FeatureEngineer, RawStatistics};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Whether persisted capping bounds are applied before scaling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CappingPolicy {
    /// Clamp into the training bounds when the artifact carries them
    #[default]
    Apply,
    /// Pass engineered values straight to the scaler
    Skip,
}

/// Prediction for one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Most probable class name
    pub label: String,
    /// Probability of `label`
    pub confidence: f64,
    /// Probability per class, in artifact label order
    pub probabilities: Vec<(String, f64)>,
}

/// Read-only predictor over one model artifact
#[derive(Debug, Clone)]
pub struct InferenceService {
    artifact: ModelArtifact,
    engineer: FeatureEngineer,
    capping: CappingPolicy,
}

impl InferenceService {
    /// Validate the artifact and build the matching feature engineer
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, InferenceError> {
        artifact.validate()?;
        let engineer = FeatureEngineer::with_retained(&artifact.feature_names)
            .map_err(|e| InferenceError::ArtifactMismatch(e.to_string()))?;
        info!(
            "Inference service ready: {} features, labels {:?}",
            artifact.feature_names.len(),
            artifact.labels.names()
        );
        Ok(Self {
            artifact,
            engineer,
            capping: CappingPolicy::default(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        Self::from_artifact(ModelArtifact::load(path)?)
    }

    pub fn with_capping(mut self, policy: CappingPolicy) -> Self {
        self.capping = policy;
        self
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn capping_policy(&self) -> CappingPolicy {
        self.capping
    }

    /// Predict from one raw statistics vector
    pub fn predict(&self, raw: &RawStatistics) -> Result<Prediction, InferenceError> {
        let mut predictions = self.predict_rows(&[*raw])?;
        predictions
            .pop()
            .ok_or_else(|| InferenceError::ArtifactMismatch("network returned no rows".into()))
    }

    /// Predict from `name = value` pairs; every raw column must be present
    pub fn predict_named(&self, pairs: &[(String, f64)]) -> Result<Prediction, InferenceError> {
        self.predict(&RawStatistics::from_named(pairs)?)
    }

    /// Predict every row of a raw statistics table; labels are ignored
    pub fn predict_table(&self, table: &RawTable) -> Result<Vec<Prediction>, InferenceError> {
        let raws = table
            .rows
            .iter()
            .map(|row| RawStatistics::from_columns(&table.columns, &row.values))
            .collect::<Result<Vec<_>, _>>()?;
        self.predict_rows(&raws)
    }

    fn predict_rows(&self, raws: &[RawStatistics]) -> Result<Vec<Prediction>, InferenceError> {
        let n_features = self.artifact.feature_names.len();
        let mut matrix = Array2::zeros((raws.len(), n_features));

        for (i, raw) in raws.iter().enumerate() {
            let mut values = self.engineer.engineer_one(raw)?;
            if let (CappingPolicy::Apply, Some(bounds)) = (self.capping, &self.artifact.capping) {
                let clamped = bounds.apply_to_vector(&mut values)?;
                if clamped > 0 {
                    debug!("Row {}: clamped {} values into training bounds", i, clamped);
                }
            }
            self.artifact.scaling.transform_vector(&mut values)?;
            for (j, value) in values.into_iter().enumerate() {
                matrix[[i, j]] = value;
            }
        }

        let probabilities = self.artifact.network.predict_proba(matrix.view())?;
        let labels = self.artifact.labels.names();
        let predictions = probabilities
            .rows()
            .into_iter()
            .map(|row| {
                let (best, confidence) = row
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |acc, (i, &p)| if p > acc.1 { (i, p) } else { acc });
                Prediction {
                    label: labels[best].clone(),
                    confidence,
                    probabilities: labels.iter().cloned().zip(row.iter().copied()).collect(),
                }
            })
            .collect();
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::tests::{raw, sample_artifact};
    use dataset::{RawRow, SchemaError};
    use feature_engine::RAW_COLUMNS;

    fn service() -> InferenceService {
        InferenceService::from_artifact(sample_artifact()).unwrap()
    }

    fn named(raw: &RawStatistics) -> Vec<(String, f64)> {
        let values = [
            raw.mean,
            raw.std,
            raw.max,
            raw.min,
            raw.median,
            raw.peak_to_peak,
            raw.skewness,
            raw.kurtosis,
            raw.rms,
            raw.zero_crossing_rate,
        ];
        RAW_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .zip(values)
            .collect()
    }

    #[test]
    fn test_prediction_is_deterministic() {
        let service = service();
        let a = service.predict(&raw(4)).unwrap();
        let b = service.predict(&raw(4)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_probabilities_cover_labels() {
        let prediction = service().predict(&raw(2)).unwrap();
        assert_eq!(prediction.probabilities.len(), 3);
        let sum: f64 = prediction.probabilities.iter().map(|(_, p)| p).sum();
        assert!((sum - 1.0).abs() < 1e-9);
        let max = prediction
            .probabilities
            .iter()
            .map(|(_, p)| *p)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(prediction.confidence, max);
        assert!(prediction
            .probabilities
            .iter()
            .any(|(l, p)| *l == prediction.label && *p == max));
    }

    #[test]
    fn test_named_matches_struct_input() {
        let service = service();
        let direct = service.predict(&raw(7)).unwrap();
        let by_name = service.predict_named(&named(&raw(7))).unwrap();
        assert_eq!(direct, by_name);
    }

    #[test]
    fn test_missing_named_column() {
        let mut pairs = named(&raw(1));
        pairs.retain(|(name, _)| name != "rms");
        assert!(matches!(
            service().predict_named(&pairs),
            Err(InferenceError::Schema(SchemaError::MissingColumn(ref c))) if c == "rms"
        ));
    }

    #[test]
    fn test_table_rows_match_single_predictions() {
        let service = service();
        let mut columns: Vec<String> = RAW_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.push("sample_id".into());
        let rows = (0..3)
            .map(|i| {
                let mut values: Vec<f64> = named(&raw(i)).into_iter().map(|(_, v)| v).collect();
                values.push(i as f64);
                RawRow { values, label: None }
            })
            .collect();
        let table = RawTable { columns, rows };

        let batch = service.predict_table(&table).unwrap();
        for (i, prediction) in batch.iter().enumerate() {
            let single = service.predict(&raw(i)).unwrap();
            assert_eq!(prediction.label, single.label);
            assert!((prediction.confidence - single.confidence).abs() < 1e-12);
        }
    }

    #[test]
    fn test_capping_policy_changes_outlier_input() {
        let mut extreme = raw(3);
        extreme.mean = 1e4;
        extreme.median = -1e4;
        let apply = service().predict(&extreme).unwrap();
        let skip = service()
            .with_capping(CappingPolicy::Skip)
            .predict(&extreme)
            .unwrap();
        assert_ne!(apply.probabilities, skip.probabilities);
    }

    #[test]
    fn test_loaded_service_predicts_like_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let artifact = sample_artifact();
        artifact.save(&path).unwrap();

        let original = InferenceService::from_artifact(artifact).unwrap();
        let loaded = InferenceService::load(&path).unwrap();
        assert_eq!(
            original.predict(&raw(5)).unwrap(),
            loaded.predict(&raw(5)).unwrap()
        );
    }
}
