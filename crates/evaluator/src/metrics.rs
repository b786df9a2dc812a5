//! Classification Metrics

use dataset::LabelSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Square count matrix, cell `(predicted, actual)`
///
/// Both axes follow the label order the matrix was created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    labels: Vec<String>,
    /// Row-major `predicted * K + actual`
    counts: Vec<usize>,
}

/// Precision, recall and F1 of one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: String,
    /// `TP / (TP + FP)`, 0 when nothing was predicted as this class
    pub precision: f64,
    /// `TP / (TP + FN)`, 0 when the class is absent
    pub recall: f64,
    pub f1: f64,
    /// Number of actual samples of the class
    pub support: usize,
}

impl ConfusionMatrix {
    pub fn new(labels: &LabelSet) -> Self {
        let k = labels.len();
        Self {
            labels: labels.names().to_vec(),
            counts: vec![0; k * k],
        }
    }

    /// Build from parallel class-index slices
    pub fn from_predictions(labels: &LabelSet, predicted: &[usize], actual: &[usize]) -> Self {
        let mut matrix = Self::new(labels);
        for (&p, &a) in predicted.iter().zip(actual) {
            matrix.record(p, a);
        }
        matrix
    }

    /// Count one outcome; out-of-range indices are ignored
    pub fn record(&mut self, predicted: usize, actual: usize) {
        let k = self.labels.len();
        if predicted < k && actual < k {
            self.counts[predicted * k + actual] += 1;
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn n_classes(&self) -> usize {
        self.labels.len()
    }

    pub fn get(&self, predicted: usize, actual: usize) -> usize {
        self.counts[predicted * self.labels.len() + actual]
    }

    /// Row sums: how often each class was predicted
    pub fn predicted_totals(&self) -> Vec<usize> {
        let k = self.labels.len();
        (0..k).map(|p| (0..k).map(|a| self.get(p, a)).sum()).collect()
    }

    /// Column sums: how often each class actually occurred
    pub fn actual_totals(&self) -> Vec<usize> {
        let k = self.labels.len();
        (0..k).map(|a| (0..k).map(|p| self.get(p, a)).sum()).collect()
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.labels.len()).map(|i| self.get(i, i)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.correct() as f64 / total as f64,
        }
    }

    pub fn per_class(&self) -> Vec<ClassMetrics> {
        let predicted = self.predicted_totals();
        let actual = self.actual_totals();
        self.labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let tp = self.get(i, i) as f64;
                let precision = ratio(tp, predicted[i] as f64);
                let recall = ratio(tp, actual[i] as f64);
                ClassMetrics {
                    label: label.clone(),
                    precision,
                    recall,
                    f1: ratio(2.0 * precision * recall, precision + recall),
                    support: actual[i],
                }
            })
            .collect()
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

impl fmt::Display for ConfusionMatrix {
    /// Rows are predictions, columns actual classes
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.labels.iter().map(String::len).max().unwrap_or(0).max(6);
        write!(f, "{:>width$}", "pred\\act", width = width + 2)?;
        for label in &self.labels {
            write!(f, " {:>width$}", label, width = width)?;
        }
        writeln!(f)?;
        for (p, label) in self.labels.iter().enumerate() {
            write!(f, "{:>width$}", label, width = width + 2)?;
            for a in 0..self.labels.len() {
                write!(f, " {:>width$}", self.get(p, a), width = width)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
