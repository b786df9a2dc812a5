//! Stratified Splits and Fold Assignment

use crate::record::{Dataset, DatasetRole};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Split configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of each class held out for testing (default: 0.2)
    pub test_fraction: f64,
    /// Fraction of the training population held out for early stopping (default: 0.2)
    pub validation_fraction: f64,
    /// Seed for shuffling before the split
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            validation_fraction: 0.2,
            seed: 42,
        }
    }
}

/// Errors while partitioning a dataset
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplitError {
    #[error("Split fraction {0} must be in (0, 1)")]
    InvalidFraction(f64),
    #[error("Cannot build {k} folds from {n} samples")]
    InvalidFoldCount { k: usize, n: usize },
    #[error("Cannot split an empty dataset")]
    Empty,
}

/// Split every class independently, keeping class proportions
///
/// Classes with at least two samples always contribute one sample to each
/// side. Returns `(kept, held_out)` tagged with the given roles.
pub fn stratified_split(
    dataset: &Dataset,
    fraction: f64,
    seed: u64,
    roles: (DatasetRole, DatasetRole),
) -> Result<(Dataset, Dataset), SplitError> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(SplitError::InvalidFraction(fraction));
    }
    if dataset.is_empty() {
        return Err(SplitError::Empty);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut kept = Vec::with_capacity(dataset.len());
    let mut held_out = Vec::new();

    for (_label, mut indices) in dataset.indices_by_label() {
        indices.shuffle(&mut rng);
        let n = indices.len();
        let n_held = if n < 2 {
            0
        } else {
            ((n as f64 * fraction).round() as usize).clamp(1, n - 1)
        };
        held_out.extend_from_slice(&indices[..n_held]);
        kept.extend_from_slice(&indices[n_held..]);
    }

    kept.sort_unstable();
    held_out.sort_unstable();

    debug!(
        "Stratified split: {} {} / {} {}",
        kept.len(),
        roles.0,
        held_out.len(),
        roles.1
    );

    Ok((
        dataset.subset(&kept, roles.0),
        dataset.subset(&held_out, roles.1),
    ))
}

/// Partition of dataset indices into `k` disjoint, exhaustive folds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldAssignment {
    folds: Vec<Vec<usize>>,
}

impl FoldAssignment {
    /// Deal each class's shuffled indices round-robin over the folds
    pub fn stratified(dataset: &Dataset, k: usize, seed: u64) -> Result<Self, SplitError> {
        let n = dataset.len();
        if k < 2 || k > n {
            return Err(SplitError::InvalidFoldCount { k, n });
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut folds = vec![Vec::with_capacity(n / k + 1); k];
        let mut next = 0usize;

        for (_label, mut indices) in dataset.indices_by_label() {
            indices.shuffle(&mut rng);
            for idx in indices {
                folds[next].push(idx);
                next = (next + 1) % k;
            }
        }

        for fold in &mut folds {
            fold.sort_unstable();
        }

        Ok(Self { folds })
    }

    /// Number of folds
    pub fn k(&self) -> usize {
        self.folds.len()
    }

    pub fn fold(&self, index: usize) -> &[usize] {
        &self.folds[index]
    }

    pub fn folds(&self) -> &[Vec<usize>] {
        &self.folds
    }

    /// Union of every fold except `index`, sorted
    pub fn training_indices(&self, index: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .folds
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .flat_map(|(_, fold)| fold.iter().copied())
            .collect();
        indices.sort_unstable();
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FeatureRecord;
    use proptest::prelude::*;

    fn balanced(n_per_class: usize, classes: &[&str]) -> Dataset {
        let mut records = Vec::new();
        for (c, label) in classes.iter().enumerate() {
            for i in 0..n_per_class {
                records.push(FeatureRecord::new(vec![c as f64, i as f64], *label));
            }
        }
        Dataset::from_records(vec!["x".into(), "y".into()], records).unwrap()
    }

    #[test]
    fn test_stratified_split_keeps_proportions() {
        let dataset = balanced(10, &["Normal", "C1_open", "R2_short"]);
        let (train, test) =
            stratified_split(&dataset, 0.2, 7, (DatasetRole::Training, DatasetRole::Test)).unwrap();
        assert_eq!(train.len(), 24);
        assert_eq!(test.len(), 6);
        assert_eq!(train.role(), DatasetRole::Training);
        for count in test.class_counts().values() {
            assert_eq!(*count, 2);
        }
    }

    #[test]
    fn test_split_rejects_bad_fraction() {
        let dataset = balanced(4, &["Normal"]);
        let err = stratified_split(&dataset, 1.0, 0, (DatasetRole::Training, DatasetRole::Test))
            .unwrap_err();
        assert_eq!(err, SplitError::InvalidFraction(1.0));
    }

    #[test]
    fn test_folds_partition_714_samples() {
        let mut records = Vec::new();
        let classes = ["Normal", "C1", "C2", "R1", "R2", "R3", "Q1"];
        for i in 0..714 {
            records.push(FeatureRecord::new(vec![i as f64], classes[i % 7]));
        }
        let dataset = Dataset::from_records(vec!["x".into()], records).unwrap();
        let folds = FoldAssignment::stratified(&dataset, 5, 42).unwrap();

        let mut seen = vec![false; 714];
        for fold in folds.folds() {
            for &idx in fold {
                assert!(!seen[idx], "index {} assigned twice", idx);
                seen[idx] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));

        for fold in folds.folds() {
            assert!(fold.len() == 142 || fold.len() == 143);
        }
    }

    #[test]
    fn test_training_indices_exclude_fold() {
        let dataset = balanced(5, &["Normal", "C1_open"]);
        let folds = FoldAssignment::stratified(&dataset, 5, 1).unwrap();
        let train = folds.training_indices(2);
        assert_eq!(train.len() + folds.fold(2).len(), dataset.len());
        assert!(folds.fold(2).iter().all(|i| !train.contains(i)));
    }

    #[test]
    fn test_invalid_fold_count() {
        let dataset = balanced(1, &["Normal", "C1_open"]);
        assert_eq!(
            FoldAssignment::stratified(&dataset, 3, 0).unwrap_err(),
            SplitError::InvalidFoldCount { k: 3, n: 2 }
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_folds_are_disjoint_and_exhaustive(n in 10usize..200, k in 2usize..10, seed in 0u64..1000) {
            let mut records = Vec::new();
            for i in 0..n {
                records.push(FeatureRecord::new(vec![i as f64], if i % 3 == 0 { "Normal" } else { "C1" }));
            }
            let dataset = Dataset::from_records(vec!["x".into()], records).unwrap();
            let folds = FoldAssignment::stratified(&dataset, k, seed).unwrap();
            let mut all: Vec<usize> = folds.folds().iter().flatten().copied().collect();
            all.sort_unstable();
            prop_assert_eq!(all, (0..n).collect::<Vec<_>>());
        }
    }
}
