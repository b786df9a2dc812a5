//! Minority Oversampling (SMOTE)

use crate::error::{guard_fit_role, PreprocessError};
use dataset::{Dataset, FeatureRecord, NORMAL_LABEL};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Oversampling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// Apply oversampling in the training pipeline
    pub enabled: bool,
    /// Class to oversample (default: "Normal")
    pub minority_label: String,
    /// Target minority count as a fraction of all other classes combined (default: 0.2)
    pub target_ratio: f64,
    /// Neighbours considered for interpolation (default: 5)
    pub k_neighbors: usize,
    /// Seed for sample and gap selection
    pub seed: u64,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            minority_label: NORMAL_LABEL.to_string(),
            target_ratio: 0.2,
            k_neighbors: 5,
            seed: 42,
        }
    }
}

/// Outcome of one balancing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceReport {
    pub minority_label: String,
    pub minority_before: usize,
    pub minority_after: usize,
    /// Target count implied by the configured ratio
    pub target: usize,
    pub synthesized: usize,
}

/// Synthesizes minority samples by interpolating towards nearest neighbours
#[derive(Debug, Clone)]
pub struct ClassBalancer {
    config: BalancerConfig,
}

impl Default for ClassBalancer {
    fn default() -> Self {
        Self {
            config: BalancerConfig::default(),
        }
    }
}

impl ClassBalancer {
    pub fn new(config: BalancerConfig) -> Result<Self, PreprocessError> {
        if !(config.target_ratio.is_finite() && config.target_ratio > 0.0) {
            return Err(PreprocessError::InvalidConfig(format!(
                "target_ratio must be positive, got {}",
                config.target_ratio
            )));
        }
        if config.k_neighbors == 0 {
            return Err(PreprocessError::InvalidConfig(
                "k_neighbors must be at least 1".into(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }

    /// Current and target minority counts
    pub fn target_count(&self, dataset: &Dataset) -> Result<(usize, usize), PreprocessError> {
        let label = &self.config.minority_label;
        let minority = dataset.records().iter().filter(|r| &r.label == label).count();
        if minority == 0 {
            return Err(PreprocessError::UnknownLabel(label.clone()));
        }
        let others = dataset.len() - minority;
        let target = (self.config.target_ratio * others as f64).floor() as usize;
        Ok((minority, target))
    }

    /// Append synthetic minority samples until the target count is reached
    ///
    /// Majority classes are never modified. Refuses validation and test data.
    pub fn balance(&self, dataset: &mut Dataset) -> Result<BalanceReport, PreprocessError> {
        guard_fit_role("class balancing", dataset.role())?;

        let label = self.config.minority_label.clone();
        let (before, target) = self.target_count(dataset)?;

        if before >= target {
            debug!("Minority {} already at {} (target {})", label, before, target);
            return Ok(BalanceReport {
                minority_label: label,
                minority_before: before,
                minority_after: before,
                target,
                synthesized: 0,
            });
        }
        if before < 2 {
            return Err(PreprocessError::InsufficientMinority {
                label,
                count: before,
            });
        }

        let points: Vec<Vec<f64>> = dataset
            .records()
            .iter()
            .filter(|r| r.label == label)
            .map(|r| r.values.clone())
            .collect();
        let k = self.config.k_neighbors.min(points.len() - 1);
        let neighbors = nearest_neighbors(&points, k);

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let needed = target - before;
        let synthetic: Vec<FeatureRecord> = (0..needed)
            .map(|_| {
                let i = rng.gen_range(0..points.len());
                let nn = neighbors[i][rng.gen_range(0..k)];
                let gap = open_unit(&mut rng);
                let values = points[i]
                    .iter()
                    .zip(&points[nn])
                    .map(|(a, b)| a + gap * (b - a))
                    .collect();
                FeatureRecord::new(values, label.clone())
            })
            .collect();
        dataset.extend_records(synthetic)?;

        info!(
            "Oversampled {}: {} -> {} ({} synthetic, k={})",
            label, before, target, needed, k
        );

        Ok(BalanceReport {
            minority_label: label,
            minority_before: before,
            minority_after: target,
            target,
            synthesized: needed,
        })
    }
}

/// Uniform sample from the open interval (0, 1)
fn open_unit(rng: &mut StdRng) -> f64 {
    loop {
        let u: f64 = rng.gen();
        if u > 0.0 {
            return u;
        }
    }
}

/// Indices of the `k` nearest other points for every point (ties by index)
fn nearest_neighbors(points: &[Vec<f64>], k: usize) -> Vec<Vec<usize>> {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let mut distances: Vec<(f64, usize)> = points
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(j, q)| (squared_distance(p, q), j))
                .collect();
            distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            distances.into_iter().take(k).map(|(_, j)| j).collect()
        })
        .collect()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataset::DatasetRole;

    /// 10 Normal samples on a diagonal, 50 per fault class
    fn imbalanced() -> Dataset {
        let mut records = Vec::new();
        for i in 0..10 {
            let x = i as f64;
            records.push(FeatureRecord::new(vec![x, 2.0 * x], "Normal"));
        }
        for label in ["C1_open", "R2_short"] {
            for i in 0..50 {
                records.push(FeatureRecord::new(vec![100.0 + i as f64, -1.0], label));
            }
        }
        Dataset::from_records(vec!["a".into(), "b".into()], records)
            .unwrap()
            .with_role(DatasetRole::Training)
    }

    #[test]
    fn test_reaches_target_ratio() {
        let balancer = ClassBalancer::default();
        let mut dataset = imbalanced();
        let report = balancer.balance(&mut dataset).unwrap();
        assert_eq!(report.target, 20);
        assert_eq!(report.synthesized, 10);
        assert_eq!(dataset.class_counts()["Normal"], 20);
    }

    #[test]
    fn test_majority_counts_unchanged() {
        let balancer = ClassBalancer::default();
        let mut dataset = imbalanced();
        balancer.balance(&mut dataset).unwrap();
        let counts = dataset.class_counts();
        assert_eq!(counts["C1_open"], 50);
        assert_eq!(counts["R2_short"], 50);
    }

    #[test]
    fn test_synthetic_samples_stay_in_minority_hull() {
        let balancer = ClassBalancer::default();
        let mut dataset = imbalanced();
        balancer.balance(&mut dataset).unwrap();
        for record in dataset.records().iter().filter(|r| r.label == "Normal") {
            let (a, b) = (record.values[0], record.values[1]);
            assert!((0.0..=9.0).contains(&a));
            assert!((b - 2.0 * a).abs() < 1e-9);
        }
    }

    #[test]
    fn test_synthetic_rows_follow_originals_as_one_block() {
        let balancer = ClassBalancer::default();
        let original = imbalanced();
        let mut dataset = original.clone();
        let report = balancer.balance(&mut dataset).unwrap();
        assert_eq!(&dataset.records()[..original.len()], original.records());
        let appended = &dataset.records()[original.len()..];
        assert_eq!(appended.len(), report.synthesized);
        assert!(appended.iter().all(|r| r.label == "Normal"));
    }

    #[test]
    fn test_no_exact_duplicates() {
        let balancer = ClassBalancer::default();
        let mut dataset = imbalanced();
        balancer.balance(&mut dataset).unwrap();
        let normals: Vec<&FeatureRecord> =
            dataset.records().iter().filter(|r| r.label == "Normal").collect();
        for (i, a) in normals.iter().enumerate() {
            for b in normals.iter().skip(i + 1) {
                assert_ne!(a.values, b.values);
            }
        }
    }

    #[test]
    fn test_already_balanced_is_noop() {
        let config = BalancerConfig {
            target_ratio: 0.05,
            ..Default::default()
        };
        let balancer = ClassBalancer::new(config).unwrap();
        let mut dataset = imbalanced();
        let report = balancer.balance(&mut dataset).unwrap();
        assert_eq!(report.synthesized, 0);
        assert_eq!(dataset.len(), 110);
    }

    #[test]
    fn test_refuses_validation_split() {
        let balancer = ClassBalancer::default();
        let mut dataset = imbalanced().with_role(DatasetRole::Validation);
        assert!(matches!(
            balancer.balance(&mut dataset),
            Err(PreprocessError::LeakageGuard { role: DatasetRole::Validation, .. })
        ));
    }

    #[test]
    fn test_unknown_minority_label() {
        let config = BalancerConfig {
            minority_label: "Healthy".into(),
            ..Default::default()
        };
        let balancer = ClassBalancer::new(config).unwrap();
        let mut dataset = imbalanced();
        assert_eq!(
            balancer.balance(&mut dataset).unwrap_err(),
            PreprocessError::UnknownLabel("Healthy".into())
        );
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let balancer = ClassBalancer::default();
        let mut a = imbalanced();
        let mut b = imbalanced();
        balancer.balance(&mut a).unwrap();
        balancer.balance(&mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_never_exceeds_target() {
        for ratio in [0.1, 0.15, 0.33, 0.5, 1.0] {
            let config = BalancerConfig {
                target_ratio: ratio,
                ..Default::default()
            };
            let balancer = ClassBalancer::new(config).unwrap();
            let mut dataset = imbalanced();
            let report = balancer.balance(&mut dataset).unwrap();
            let target = (ratio * 100.0).floor() as usize;
            assert_eq!(report.minority_after, target.max(10));
            assert!(dataset.class_counts()["Normal"] <= target.max(10));
        }
    }
}
