//! One-Way ANOVA per Feature

use crate::distribution::f_survival;
use dataset::Dataset;
use feature_engine::statistics::mean;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Spread below `MIN_SPREAD · max(|mean|, 1)` per record counts as rounding noise
const MIN_SPREAD: f64 = 1e-12;

/// Why a feature's F statistic could not be computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedReason {
    /// Same value in every record
    ZeroVariance,
    /// Only one class present
    SingleClass,
    /// No within-group degrees of freedom (one sample per class)
    TooFewSamples,
}

impl fmt::Display for UndefinedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UndefinedReason::ZeroVariance => "zero variance",
            UndefinedReason::SingleClass => "fewer than two classes",
            UndefinedReason::TooFewSamples => "too few samples per class",
        })
    }
}

/// Test result for one feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnovaOutcome {
    Tested {
        f_statistic: f64,
        p_value: f64,
        df_between: usize,
        df_within: usize,
    },
    Undefined {
        reason: UndefinedReason,
    },
}

impl AnovaOutcome {
    pub fn p_value(&self) -> Option<f64> {
        match self {
            AnovaOutcome::Tested { p_value, .. } => Some(*p_value),
            AnovaOutcome::Undefined { .. } => None,
        }
    }

    pub fn f_statistic(&self) -> Option<f64> {
        match self {
            AnovaOutcome::Tested { f_statistic, .. } => Some(*f_statistic),
            AnovaOutcome::Undefined { .. } => None,
        }
    }
}

/// Named ANOVA outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSignificance {
    pub feature: String,
    pub outcome: AnovaOutcome,
}

/// Outcomes for every feature, in column order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnovaReport {
    pub features: Vec<FeatureSignificance>,
}

impl AnovaReport {
    /// Features with `p < alpha`
    pub fn significant(&self, alpha: f64) -> Vec<&str> {
        self.features
            .iter()
            .filter(|f| f.outcome.p_value().is_some_and(|p| p < alpha))
            .map(|f| f.feature.as_str())
            .collect()
    }

    /// Features whose statistic is undefined
    pub fn undefined(&self) -> Vec<&FeatureSignificance> {
        self.features
            .iter()
            .filter(|f| matches!(f.outcome, AnovaOutcome::Undefined { .. }))
            .collect()
    }

    pub fn get(&self, feature: &str) -> Option<&AnovaOutcome> {
        self.features
            .iter()
            .find(|f| f.feature == feature)
            .map(|f| &f.outcome)
    }
}

/// Test every feature for a difference of class means
///
/// The dataset is only read.
pub fn anova(dataset: &Dataset) -> AnovaReport {
    let groups: Vec<Vec<usize>> = dataset.indices_by_label().into_values().collect();
    let n = dataset.len();
    let k = groups.len();

    let features = dataset
        .feature_names()
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let column = dataset.column(j);
            let outcome = test_feature(&column, &groups, n, k);
            if let AnovaOutcome::Undefined { reason } = outcome {
                warn!("ANOVA undefined for {}: {}", name, reason);
            }
            FeatureSignificance {
                feature: name.clone(),
                outcome,
            }
        })
        .collect::<Vec<_>>();

    let report = AnovaReport { features };
    info!(
        "ANOVA over {} features, {} classes, {} records: {} significant at 0.05",
        dataset.n_features(),
        k,
        n,
        report.significant(0.05).len()
    );
    report
}

fn test_feature(column: &[f64], groups: &[Vec<usize>], n: usize, k: usize) -> AnovaOutcome {
    if k < 2 {
        return AnovaOutcome::Undefined {
            reason: UndefinedReason::SingleClass,
        };
    }
    if n <= k {
        return AnovaOutcome::Undefined {
            reason: UndefinedReason::TooFewSamples,
        };
    }

    let grand_mean = mean(column);
    let mut ss_between = 0.0;
    let mut ss_within = 0.0;
    for group in groups {
        let values: Vec<f64> = group.iter().map(|&i| column[i]).collect();
        let group_mean = mean(&values);
        ss_between += values.len() as f64 * (group_mean - grand_mean).powi(2);
        ss_within += values.iter().map(|v| (v - group_mean).powi(2)).sum::<f64>();
    }

    let noise_floor = n as f64 * (MIN_SPREAD * grand_mean.abs().max(1.0)).powi(2);
    if ss_between + ss_within <= noise_floor {
        return AnovaOutcome::Undefined {
            reason: UndefinedReason::ZeroVariance,
        };
    }

    let df_between = k - 1;
    let df_within = n - k;
    let ms_between = ss_between / df_between as f64;
    let ms_within = ss_within / df_within as f64;

    let (f_statistic, p_value) = if ss_within <= noise_floor {
        // Perfect separation
        (f64::INFINITY, 0.0)
    } else {
        let f = ms_between / ms_within;
        (f, f_survival(f, df_between as f64, df_within as f64))
    };
    debug!("F = {:.4}, p = {:.3e}", f_statistic, p_value);

    AnovaOutcome::Tested {
        f_statistic,
        p_value,
        df_between,
        df_within,
    }
}
