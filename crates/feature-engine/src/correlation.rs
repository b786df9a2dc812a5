//! Pairwise Correlation Analysis
//!
//! Finds near-collinear feature pairs and proposes which member of each pair
//! to drop. The pruned list in [`crate::ENGINEERED_FEATURES`] was derived
//! with this analysis; it is exposed so the decision can be re-checked on new
//! simulation batches.

use crate::statistics::pearson;
use dataset::Dataset;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Absolute correlation at or above which two features count as redundant
pub const DEFAULT_CORRELATION_THRESHOLD: f64 = 0.95;

/// Features ranked by how much distinct information they carry
///
/// Earlier entries are kept when a redundant pair is found; peak-to-peak is
/// preferred over rms as the energy proxy.
pub const RETENTION_PREFERENCE: [&str; 10] = [
    "peak_to_peak",
    "mean",
    "std",
    "median",
    "skewness",
    "kurtosis",
    "zero_crossing_rate",
    "rms",
    "max",
    "min",
];

/// A pair of highly correlated features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedPair {
    pub first: String,
    pub second: String,
    /// Pearson coefficient
    pub coefficient: f64,
}

/// Symmetric Pearson correlation matrix over dataset columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    names: Vec<String>,
    /// Row-major `n × n`
    values: Vec<f64>,
}

impl CorrelationMatrix {
    /// Compute all pairwise coefficients
    pub fn compute(dataset: &Dataset) -> Self {
        let n = dataset.n_features();
        let columns: Vec<Vec<f64>> = (0..n).map(|j| dataset.column(j)).collect();
        let mut values = vec![f64::NAN; n * n];

        for i in 0..n {
            for j in i..n {
                let r = if i == j {
                    if pearson(&columns[i], &columns[i]).is_nan() {
                        f64::NAN
                    } else {
                        1.0
                    }
                } else {
                    pearson(&columns[i], &columns[j])
                };
                values[i * n + j] = r;
                values[j * n + i] = r;
            }
        }

        debug!("Computed {}x{} correlation matrix", n, n);
        Self {
            names: dataset.feature_names().to_vec(),
            values,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.names.len() + j]
    }

    pub fn get_by_name(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.names.iter().position(|n| n == a)?;
        let j = self.names.iter().position(|n| n == b)?;
        Some(self.get(i, j))
    }

    /// Pairs with `|r| >= threshold`, strongest first
    ///
    /// Pairs involving a constant column (`NaN`) are never reported.
    pub fn redundant_pairs(&self, threshold: f64) -> Vec<CorrelatedPair> {
        let n = self.names.len();
        let mut pairs = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                let r = self.get(i, j);
                if r.abs() >= threshold {
                    pairs.push(CorrelatedPair {
                        first: self.names[i].clone(),
                        second: self.names[j].clone(),
                        coefficient: r,
                    });
                }
            }
        }
        pairs.sort_by(|a, b| b.coefficient.abs().total_cmp(&a.coefficient.abs()));
        pairs
    }

    /// Greedy drop list: for each redundant pair, drop the less preferred member
    ///
    /// Features absent from `preferred` rank after all listed ones, by column
    /// order. Returned names follow column order.
    pub fn suggest_drops(&self, threshold: f64, preferred: &[&str]) -> Vec<String> {
        let rank = |name: &str| -> (usize, usize) {
            let listed = preferred.iter().position(|p| *p == name).unwrap_or(preferred.len());
            let column = self.names.iter().position(|n| n == name).unwrap_or(usize::MAX);
            (listed, column)
        };

        let mut dropped: Vec<String> = Vec::new();
        for pair in self.redundant_pairs(threshold) {
            if dropped.contains(&pair.first) || dropped.contains(&pair.second) {
                continue;
            }
            let loser = if rank(&pair.first) <= rank(&pair.second) {
                pair.second
            } else {
                pair.first
            };
            debug!("Dropping {} (|r| = {:.3})", loser, pair.coefficient.abs());
            dropped.push(loser);
        }

        dropped.sort_by_key(|name| rank(name).1);
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataset::FeatureRecord;

    fn dataset() -> Dataset {
        let names = ["rms", "peak_to_peak", "skewness", "flat"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let records = (0..20)
            .map(|i| {
                let x = i as f64;
                FeatureRecord::new(vec![x * 0.7 + 0.01, x * 2.0, (x * 1.3).sin(), 1.0], "Normal")
            })
            .collect();
        Dataset::from_records(names, records).unwrap()
    }

    #[test]
    fn test_matrix_is_symmetric_with_unit_diagonal() {
        let matrix = CorrelationMatrix::compute(&dataset());
        assert_eq!(matrix.get(0, 0), 1.0);
        assert_eq!(matrix.get(0, 2), matrix.get(2, 0));
        assert!(matrix.get(3, 3).is_nan());
    }

    #[test]
    fn test_redundant_pairs_skip_constant_columns() {
        let matrix = CorrelationMatrix::compute(&dataset());
        let pairs = matrix.redundant_pairs(DEFAULT_CORRELATION_THRESHOLD);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].first, "rms");
        assert_eq!(pairs[0].second, "peak_to_peak");
    }

    #[test]
    fn test_peak_to_peak_retained_over_rms() {
        let matrix = CorrelationMatrix::compute(&dataset());
        let drops = matrix.suggest_drops(DEFAULT_CORRELATION_THRESHOLD, &RETENTION_PREFERENCE);
        assert_eq!(drops, vec!["rms".to_string()]);
    }
}
