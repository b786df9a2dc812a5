//! IQR Outlier Capping

use crate::error::{check_features, guard_fit_role, PreprocessError};
use dataset::Dataset;
use feature_engine::statistics::quartiles;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Capping configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CappingConfig {
    /// Apply capping in the training pipeline
    pub enabled: bool,
    /// Whisker length in IQR units (default: 1.5)
    pub iqr_multiplier: f64,
}

impl Default for CappingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            iqr_multiplier: 1.5,
        }
    }
}

/// Quartiles and clamp bounds of one feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureBounds {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl FeatureBounds {
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lower, self.upper)
    }
}

/// Per-feature bounds fitted on one population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CappingBounds {
    feature_names: Vec<String>,
    bounds: Vec<FeatureBounds>,
    /// Features whose IQR is zero; their values collapse to Q1
    degenerate_features: Vec<String>,
}

/// Number of values clamped per feature
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CappingReport {
    pub clamped: Vec<(String, usize)>,
}

impl CappingReport {
    pub fn total(&self) -> usize {
        self.clamped.iter().map(|(_, n)| n).sum()
    }
}

impl CappingBounds {
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn bounds(&self) -> &[FeatureBounds] {
        &self.bounds
    }

    pub fn degenerate_features(&self) -> &[String] {
        &self.degenerate_features
    }

    /// Clamp every value of the dataset into its feature's bounds
    pub fn apply(&self, dataset: &mut Dataset) -> Result<CappingReport, PreprocessError> {
        check_features(&self.feature_names, dataset.feature_names())?;

        let mut counts = vec![0usize; self.bounds.len()];
        for record in dataset.records_mut() {
            for (j, value) in record.values.iter_mut().enumerate() {
                let capped = self.bounds[j].clamp(*value);
                if capped != *value {
                    counts[j] += 1;
                    *value = capped;
                }
            }
        }

        let report = CappingReport {
            clamped: self
                .feature_names
                .iter()
                .cloned()
                .zip(counts)
                .filter(|(_, n)| *n > 0)
                .collect(),
        };
        debug!(
            "Capped {} values across {} {} records",
            report.total(),
            dataset.len(),
            dataset.role()
        );
        Ok(report)
    }

    /// Clamp one engineered vector; returns the number of clamped values
    pub fn apply_to_vector(&self, values: &mut [f64]) -> Result<usize, PreprocessError> {
        if values.len() != self.bounds.len() {
            return Err(PreprocessError::FeatureMismatch {
                expected: self.feature_names.clone(),
                actual: vec![format!("<{} values>", values.len())],
            });
        }
        let mut clamped = 0;
        for (value, bounds) in values.iter_mut().zip(&self.bounds) {
            let capped = bounds.clamp(*value);
            if capped != *value {
                clamped += 1;
                *value = capped;
            }
        }
        Ok(clamped)
    }
}

/// Winsorizes features into `[Q1 - k·IQR, Q3 + k·IQR]`
#[derive(Debug, Clone, Default)]
pub struct OutlierCapper {
    config: CappingConfig,
}

impl OutlierCapper {
    pub fn new(config: CappingConfig) -> Result<Self, PreprocessError> {
        if !(config.iqr_multiplier.is_finite() && config.iqr_multiplier >= 0.0) {
            return Err(PreprocessError::InvalidConfig(format!(
                "iqr_multiplier must be a non-negative number, got {}",
                config.iqr_multiplier
            )));
        }
        Ok(Self { config })
    }

    /// Compute quartiles and bounds per feature
    pub fn fit(&self, dataset: &Dataset) -> Result<CappingBounds, PreprocessError> {
        guard_fit_role("outlier capping", dataset.role())?;
        if dataset.is_empty() {
            return Err(PreprocessError::EmptyDataset {
                operation: "outlier capping",
            });
        }

        let k = self.config.iqr_multiplier;
        let mut bounds = Vec::with_capacity(dataset.n_features());
        let mut degenerate_features = Vec::new();

        for (j, name) in dataset.feature_names().iter().enumerate() {
            let column = dataset.column(j);
            let (q1, q3) = quartiles(&column).ok_or(PreprocessError::EmptyDataset {
                operation: "outlier capping",
            })?;
            let iqr = q3 - q1;
            if iqr == 0.0 {
                warn!("Feature {} has zero IQR; values will clamp to {}", name, q1);
                degenerate_features.push(name.clone());
            }
            bounds.push(FeatureBounds {
                q1,
                q3,
                lower: q1 - k * iqr,
                upper: q3 + k * iqr,
            });
        }

        info!(
            "Fitted capping bounds on {} {} records ({} degenerate features)",
            dataset.len(),
            dataset.role(),
            degenerate_features.len()
        );

        Ok(CappingBounds {
            feature_names: dataset.feature_names().to_vec(),
            bounds,
            degenerate_features,
        })
    }

    /// Fit on the dataset and clamp it in place
    pub fn cap(&self, dataset: &mut Dataset) -> Result<(CappingBounds, CappingReport), PreprocessError> {
        let bounds = self.fit(dataset)?;
        let report = bounds.apply(dataset)?;
        Ok((bounds, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataset::{DatasetRole, FeatureRecord};
    use proptest::prelude::*;

    fn single_column(values: &[f64]) -> Dataset {
        let records = values
            .iter()
            .map(|&v| FeatureRecord::new(vec![v], "Normal"))
            .collect();
        Dataset::from_records(vec!["x".into()], records).unwrap()
    }

    fn values(dataset: &Dataset) -> Vec<f64> {
        dataset.column(0)
    }

    #[test]
    fn test_outlier_capped_to_upper_bound() {
        let capper = OutlierCapper::default();
        let mut dataset = single_column(&[1.0, 2.0, 3.0, 4.0, 100.0]);
        let (bounds, report) = capper.cap(&mut dataset).unwrap();

        let b = bounds.bounds()[0];
        assert_eq!(b.q1, 2.0);
        assert_eq!(b.q3, 4.0);
        assert_eq!(b.lower, -1.0);
        assert_eq!(b.upper, 7.0);
        assert_eq!(values(&dataset), vec![1.0, 2.0, 3.0, 4.0, 7.0]);
        assert_eq!(report.total(), 1);
    }

    #[test]
    fn test_recapping_is_idempotent() {
        let capper = OutlierCapper::default();
        let mut dataset = single_column(&[1.0, 2.0, 3.0, 4.0, 7.0]);
        let (_, report) = capper.cap(&mut dataset).unwrap();
        assert_eq!(values(&dataset), vec![1.0, 2.0, 3.0, 4.0, 7.0]);
        assert_eq!(report.total(), 0);
    }

    #[test]
    fn test_zero_iqr_clamps_to_constant() {
        let capper = OutlierCapper::default();
        let mut dataset = single_column(&[5.0, 5.0, 5.0, 5.0, 5.0, 9.0]);
        let (bounds, _) = capper.cap(&mut dataset).unwrap();
        assert_eq!(bounds.degenerate_features(), &["x".to_string()]);
        assert!(values(&dataset).iter().all(|&v| v == 5.0));
    }

    #[test]
    fn test_no_rows_dropped() {
        let capper = OutlierCapper::default();
        let mut dataset = single_column(&[-50.0, 1.0, 2.0, 3.0, 50.0]);
        capper.cap(&mut dataset).unwrap();
        assert_eq!(dataset.len(), 5);
    }

    #[test]
    fn test_fit_rejects_test_split() {
        let capper = OutlierCapper::default();
        let dataset = single_column(&[1.0, 2.0]).with_role(DatasetRole::Test);
        let err = capper.fit(&dataset).unwrap_err();
        assert!(matches!(err, PreprocessError::LeakageGuard { role: DatasetRole::Test, .. }));
    }

    #[test]
    fn test_apply_rejects_other_schema() {
        let capper = OutlierCapper::default();
        let bounds = capper.fit(&single_column(&[1.0, 2.0, 3.0])).unwrap();
        let mut other = Dataset::from_records(
            vec!["y".into()],
            vec![FeatureRecord::new(vec![1.0], "Normal")],
        )
        .unwrap();
        assert!(matches!(
            bounds.apply(&mut other),
            Err(PreprocessError::FeatureMismatch { .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_applying_bounds_twice_changes_nothing(
            column in proptest::collection::vec(-1e4f64..1e4, 4..60)
        ) {
            let capper = OutlierCapper::default();
            let mut dataset = single_column(&column);
            let (bounds, _) = capper.cap(&mut dataset).unwrap();
            let once = values(&dataset);
            let report = bounds.apply(&mut dataset).unwrap();
            prop_assert_eq!(report.total(), 0);
            prop_assert_eq!(values(&dataset), once);
        }
    }
}
