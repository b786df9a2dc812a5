//! Feature Records and Datasets

use crate::error::SchemaError;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Which population a dataset belongs to
///
/// Fitting stages (capping bounds, oversampling, scaling) check the role so
/// that statistics never flow from evaluation data into a model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetRole {
    /// Full table before any split
    #[default]
    Unsplit,
    /// Population used to fit preprocessing and weights
    Training,
    /// Population monitored for early stopping
    Validation,
    /// Held-out population for final metrics
    Test,
}

impl DatasetRole {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetRole::Unsplit => "unsplit",
            DatasetRole::Training => "training",
            DatasetRole::Validation => "validation",
            DatasetRole::Test => "test",
        }
    }
}

impl fmt::Display for DatasetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One simulation sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Feature values, aligned with the dataset's feature names
    pub values: Vec<f64>,
    /// Fault-type identifier
    pub label: String,
}

impl FeatureRecord {
    pub fn new(values: Vec<f64>, label: impl Into<String>) -> Self {
        Self {
            values,
            label: label.into(),
        }
    }
}

/// Ordered set of class names
///
/// Class indices used by the classifier and the confusion matrix are
/// positions in this list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
    names: Vec<String>,
}

impl LabelSet {
    /// Create from an explicit ordering (duplicates are dropped, first wins)
    pub fn new(names: Vec<String>) -> Self {
        let mut seen = BTreeSet::new();
        let names = names
            .into_iter()
            .filter(|name| seen.insert(name.clone()))
            .collect();
        Self { names }
    }

    /// Collect labels in lexicographic order
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let set: BTreeSet<&str> = labels.into_iter().collect();
        Self {
            names: set.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }
}

/// Ordered sequence of records sharing one schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    feature_names: Vec<String>,
    records: Vec<FeatureRecord>,
    role: DatasetRole,
}

impl Dataset {
    /// Create an empty dataset with the given schema
    pub fn new(feature_names: Vec<String>) -> Self {
        Self {
            feature_names,
            records: Vec::new(),
            role: DatasetRole::Unsplit,
        }
    }

    /// Create a dataset, validating every record against the schema
    pub fn from_records(
        feature_names: Vec<String>,
        records: Vec<FeatureRecord>,
    ) -> Result<Self, SchemaError> {
        let mut dataset = Self::new(feature_names);
        dataset.records.reserve(records.len());
        for record in records {
            dataset.push(record)?;
        }
        Ok(dataset)
    }

    /// Append a record with matching width and finite values
    pub fn push(&mut self, record: FeatureRecord) -> Result<(), SchemaError> {
        self.validate(&record, self.records.len())?;
        self.records.push(record);
        Ok(())
    }

    /// Append a batch of records; on any invalid record nothing is appended
    pub fn extend_records(&mut self, records: Vec<FeatureRecord>) -> Result<(), SchemaError> {
        for (offset, record) in records.iter().enumerate() {
            self.validate(record, self.records.len() + offset)?;
        }
        self.records.extend(records);
        Ok(())
    }

    fn validate(&self, record: &FeatureRecord, row: usize) -> Result<(), SchemaError> {
        if record.values.len() != self.feature_names.len() {
            return Err(SchemaError::WidthMismatch {
                expected: self.feature_names.len(),
                actual: record.values.len(),
            });
        }
        if let Some(pos) = record.values.iter().position(|v| !v.is_finite()) {
            return Err(SchemaError::InvalidValue {
                row,
                column: self.feature_names[pos].clone(),
                value: record.values[pos].to_string(),
            });
        }
        Ok(())
    }

    /// Append all records of another dataset with the same schema
    pub fn extend_from(&mut self, other: &Dataset) -> Result<(), SchemaError> {
        other.check_schema(&self.feature_names)?;
        self.records.extend(other.records.iter().cloned());
        Ok(())
    }

    pub fn with_role(mut self, role: DatasetRole) -> Self {
        self.role = role;
        self
    }

    pub fn set_role(&mut self, role: DatasetRole) {
        self.role = role;
    }

    pub fn role(&self) -> DatasetRole {
        self.role
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|n| n == name)
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn records(&self) -> &[FeatureRecord] {
        &self.records
    }

    /// Mutable access to records; callers must keep values finite
    pub fn records_mut(&mut self) -> &mut [FeatureRecord] {
        &mut self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Values of one feature column
    pub fn column(&self, index: usize) -> Vec<f64> {
        self.records.iter().map(|r| r.values[index]).collect()
    }

    /// Sample count per label, ordered by label name
    pub fn class_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.label.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Record indices per label, ordered by label name
    pub fn indices_by_label(&self) -> BTreeMap<String, Vec<usize>> {
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, record) in self.records.iter().enumerate() {
            groups.entry(record.label.clone()).or_default().push(idx);
        }
        groups
    }

    pub fn label_set(&self) -> LabelSet {
        LabelSet::from_labels(self.records.iter().map(|r| r.label.as_str()))
    }

    /// Class index of every record
    pub fn label_indices(&self, labels: &LabelSet) -> Result<Vec<usize>, SchemaError> {
        self.records
            .iter()
            .map(|r| {
                labels
                    .index_of(&r.label)
                    .ok_or_else(|| SchemaError::UnknownLabel(r.label.clone()))
            })
            .collect()
    }

    /// Copy the selected records into a new dataset with the given role
    pub fn subset(&self, indices: &[usize], role: DatasetRole) -> Self {
        Self {
            feature_names: self.feature_names.clone(),
            records: indices.iter().map(|&i| self.records[i].clone()).collect(),
            role,
        }
    }

    /// Row-major feature matrix (`len × n_features`)
    pub fn to_matrix(&self) -> Array2<f64> {
        let n = self.records.len();
        let d = self.feature_names.len();
        let mut matrix = Array2::zeros((n, d));
        for (i, record) in self.records.iter().enumerate() {
            for (j, &v) in record.values.iter().enumerate() {
                matrix[[i, j]] = v;
            }
        }
        matrix
    }

    /// Require the exact feature list, in order
    pub fn check_schema(&self, expected: &[String]) -> Result<(), SchemaError> {
        check_columns(&self.feature_names, expected)
    }
}

/// Compare a found column list against the expected one
pub(crate) fn check_columns(found: &[String], expected: &[String]) -> Result<(), SchemaError> {
    for (position, name) in expected.iter().enumerate() {
        match found.get(position) {
            Some(actual) if actual == name => {}
            Some(actual) => {
                if found.contains(name) {
                    return Err(SchemaError::ColumnMismatch {
                        position,
                        expected: name.clone(),
                        found: actual.clone(),
                    });
                }
                return Err(SchemaError::MissingColumn(name.clone()));
            }
            None => return Err(SchemaError::MissingColumn(name.clone())),
        }
    }
    if let Some(extra) = found.get(expected.len()) {
        return Err(SchemaError::UnexpectedColumn(extra.clone()));
    }
    Ok(())
}
