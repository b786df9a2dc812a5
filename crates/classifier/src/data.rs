//! Training Matrices

use crate::error::TrainError;
use dataset::{Dataset, LabelSet};
use ndarray::{Array2, Axis};

/// Feature matrix with class-index targets
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingData {
    features: Array2<f64>,
    targets: Vec<usize>,
    n_classes: usize,
}

impl TrainingData {
    pub fn new(features: Array2<f64>, targets: Vec<usize>, n_classes: usize) -> Result<Self, TrainError> {
        if features.nrows() != targets.len() {
            return Err(TrainError::ShapeMismatch {
                expected: format!("{} targets", features.nrows()),
                actual: targets.len().to_string(),
            });
        }
        if let Some(((row, column), _)) = features.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(TrainError::NonFiniteInput { row, column });
        }
        if let Some(&bad) = targets.iter().find(|&&t| t >= n_classes) {
            return Err(TrainError::ShapeMismatch {
                expected: format!("class index below {}", n_classes),
                actual: bad.to_string(),
            });
        }
        Ok(Self {
            features,
            targets,
            n_classes,
        })
    }

    /// Map labels through `labels`; unknown labels are a schema error
    pub fn from_dataset(dataset: &Dataset, labels: &LabelSet) -> Result<Self, TrainError> {
        let targets = dataset.label_indices(labels)?;
        Self::new(dataset.to_matrix(), targets, labels.len())
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn targets(&self) -> &[usize] {
        &self.targets
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Rows at `indices`, in that order
    pub(crate) fn batch(&self, indices: &[usize]) -> (Array2<f64>, Vec<usize>) {
        (
            self.features.select(Axis(0), indices),
            indices.iter().map(|&i| self.targets[i]).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataset::FeatureRecord;
    use ndarray::array;

    #[test]
    fn test_from_dataset_uses_label_order() {
        let dataset = Dataset::from_records(
            vec!["x".into()],
            vec![
                FeatureRecord::new(vec![1.0], "R1_open"),
                FeatureRecord::new(vec![2.0], "Normal"),
            ],
        )
        .unwrap();
        let labels = LabelSet::new(vec!["Normal".into(), "R1_open".into()]);
        let data = TrainingData::from_dataset(&dataset, &labels).unwrap();
        assert_eq!(data.targets(), &[1, 0]);
        assert_eq!(data.features(), &array![[1.0], [2.0]]);
    }

    #[test]
    fn test_rejects_out_of_range_target() {
        let result = TrainingData::new(array![[1.0]], vec![3], 2);
        assert!(matches!(result, Err(TrainError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_rejects_non_finite_features() {
        let result = TrainingData::new(array![[1.0, 2.0], [3.0, f64::NAN]], vec![0, 1], 2);
        assert_eq!(result, Err(TrainError::NonFiniteInput { row: 1, column: 1 }));
        let result = TrainingData::new(array![[f64::INFINITY]], vec![0], 2);
        assert_eq!(result, Err(TrainError::NonFiniteInput { row: 0, column: 0 }));
    }
}
