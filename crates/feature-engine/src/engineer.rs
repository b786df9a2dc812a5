//! Engineered Feature Construction
//!
//! Every derived feature is computed once, from raw statistics, with its
//! denominator guarded by [`EPSILON`].

use dataset::{Dataset, FeatureRecord, RawTable, SchemaError, DEFAULT_LABEL_COLUMN};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Denominator guard for ratio features
pub const EPSILON: f64 = 1e-6;

/// Raw statistics expected from the extraction stage, in file order
pub const RAW_COLUMNS: [&str; 10] = [
    "mean",
    "std",
    "max",
    "min",
    "median",
    "peak_to_peak",
    "skewness",
    "kurtosis",
    "rms",
    "zero_crossing_rate",
];

/// Feature set retained after correlation pruning (`max`, `min`, `rms` dropped)
pub const ENGINEERED_FEATURES: [&str; 14] = [
    "mean",
    "std",
    "median",
    "peak_to_peak",
    "skewness",
    "kurtosis",
    "zero_crossing_rate",
    "skew_kurt_ratio",
    "max_rms_ratio",
    "rms_median_ratio",
    "variance",
    "skew_kurt_product",
    "std_min_ratio",
    "min_ptp_ratio",
];

/// Divide with the denominator pushed `EPSILON` away from zero
///
/// The offset follows the sign of the denominator (zero counts as positive),
/// so the effective denominator magnitude is never below `EPSILON`.
pub fn guarded_div(numerator: f64, denominator: f64) -> f64 {
    numerator / (denominator + EPSILON.copysign(denominator))
}

/// Raw statistics of one waveform
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawStatistics {
    pub mean: f64,
    pub std: f64,
    pub max: f64,
    pub min: f64,
    pub median: f64,
    pub peak_to_peak: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    pub rms: f64,
    pub zero_crossing_rate: f64,
}

impl RawStatistics {
    /// Build from values aligned with `column_indices` (see [`RawStatistics::resolve`])
    fn from_indexed(values: &[f64], idx: &[usize; 10]) -> Self {
        Self {
            mean: values[idx[0]],
            std: values[idx[1]],
            max: values[idx[2]],
            min: values[idx[3]],
            median: values[idx[4]],
            peak_to_peak: values[idx[5]],
            skewness: values[idx[6]],
            kurtosis: values[idx[7]],
            rms: values[idx[8]],
            zero_crossing_rate: values[idx[9]],
        }
    }

    /// Locate every raw column in a header
    fn resolve(columns: &[String]) -> Result<[usize; 10], SchemaError> {
        let mut idx = [0usize; 10];
        for (slot, name) in idx.iter_mut().zip(RAW_COLUMNS) {
            *slot = columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| SchemaError::MissingColumn(name.to_string()))?;
        }
        Ok(idx)
    }

    /// Build from a header and one row of values
    pub fn from_columns(columns: &[String], values: &[f64]) -> Result<Self, SchemaError> {
        if columns.len() != values.len() {
            return Err(SchemaError::WidthMismatch {
                expected: columns.len(),
                actual: values.len(),
            });
        }
        let idx = Self::resolve(columns)?;
        Ok(Self::from_indexed(values, &idx))
    }

    /// Build from `name = value` pairs; extra names are ignored
    pub fn from_named(pairs: &[(String, f64)]) -> Result<Self, SchemaError> {
        let (columns, values): (Vec<String>, Vec<f64>) = pairs.iter().cloned().unzip();
        Self::from_columns(&columns, &values)
    }

    fn check_finite(&self, row: usize) -> Result<(), SchemaError> {
        let values = [
            self.mean,
            self.std,
            self.max,
            self.min,
            self.median,
            self.peak_to_peak,
            self.skewness,
            self.kurtosis,
            self.rms,
            self.zero_crossing_rate,
        ];
        match values.iter().position(|v| !v.is_finite()) {
            Some(pos) => Err(SchemaError::InvalidValue {
                row,
                column: RAW_COLUMNS[pos].to_string(),
                value: values[pos].to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Every feature the engineer can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    Mean,
    Std,
    Max,
    Min,
    Median,
    PeakToPeak,
    Skewness,
    Kurtosis,
    Rms,
    ZeroCrossingRate,
    SkewKurtRatio,
    MaxRmsRatio,
    RmsMedianRatio,
    Variance,
    SkewKurtProduct,
    StdMinRatio,
    MinPtpRatio,
}

impl Feature {
    pub const ALL: [Feature; 17] = [
        Feature::Mean,
        Feature::Std,
        Feature::Max,
        Feature::Min,
        Feature::Median,
        Feature::PeakToPeak,
        Feature::Skewness,
        Feature::Kurtosis,
        Feature::Rms,
        Feature::ZeroCrossingRate,
        Feature::SkewKurtRatio,
        Feature::MaxRmsRatio,
        Feature::RmsMedianRatio,
        Feature::Variance,
        Feature::SkewKurtProduct,
        Feature::StdMinRatio,
        Feature::MinPtpRatio,
    ];

    /// Column name
    pub fn name(&self) -> &'static str {
        match self {
            Feature::Mean => "mean",
            Feature::Std => "std",
            Feature::Max => "max",
            Feature::Min => "min",
            Feature::Median => "median",
            Feature::PeakToPeak => "peak_to_peak",
            Feature::Skewness => "skewness",
            Feature::Kurtosis => "kurtosis",
            Feature::Rms => "rms",
            Feature::ZeroCrossingRate => "zero_crossing_rate",
            Feature::SkewKurtRatio => "skew_kurt_ratio",
            Feature::MaxRmsRatio => "max_rms_ratio",
            Feature::RmsMedianRatio => "rms_median_ratio",
            Feature::Variance => "variance",
            Feature::SkewKurtProduct => "skew_kurt_product",
            Feature::StdMinRatio => "std_min_ratio",
            Feature::MinPtpRatio => "min_ptp_ratio",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// Whether the feature is a division
    pub fn is_ratio(&self) -> bool {
        matches!(
            self,
            Feature::SkewKurtRatio
                | Feature::MaxRmsRatio
                | Feature::RmsMedianRatio
                | Feature::StdMinRatio
                | Feature::MinPtpRatio
        )
    }

    /// Compute the feature value from raw statistics
    ///
    /// Ratios and products of finite inputs stay finite for physical signal
    /// magnitudes but can overflow to `±inf` for extreme ones (a numerator
    /// near `1e300` over a denominator below 1, or two factors above `1e154`).
    /// The value is returned as computed; [`FeatureEngineer`] rejects the
    /// row with [`SchemaError::InvalidValue`] instead of clamping it.
    pub fn compute(&self, raw: &RawStatistics) -> f64 {
        match self {
            Feature::Mean => raw.mean,
            Feature::Std => raw.std,
            Feature::Max => raw.max,
            Feature::Min => raw.min,
            Feature::Median => raw.median,
            Feature::PeakToPeak => raw.peak_to_peak,
            Feature::Skewness => raw.skewness,
            Feature::Kurtosis => raw.kurtosis,
            Feature::Rms => raw.rms,
            Feature::ZeroCrossingRate => raw.zero_crossing_rate,
            Feature::SkewKurtRatio => guarded_div(raw.skewness, raw.kurtosis),
            Feature::MaxRmsRatio => guarded_div(raw.max, raw.rms),
            Feature::RmsMedianRatio => guarded_div(raw.rms, raw.median.abs()),
            // Reconstructed from rms and median, as the extraction stage exports no variance
            Feature::Variance => raw.rms * raw.rms - raw.median * raw.median,
            Feature::SkewKurtProduct => raw.skewness * raw.kurtosis,
            Feature::StdMinRatio => guarded_div(raw.std, raw.min).abs(),
            Feature::MinPtpRatio => guarded_div(raw.min, raw.peak_to_peak),
        }
    }
}

/// Feature engineer producing a fixed, ordered feature list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureEngineer {
    retained: Vec<Feature>,
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureEngineer {
    /// Engineer with the canonical retained feature list
    pub fn new() -> Self {
        let retained = ENGINEERED_FEATURES
            .iter()
            .filter_map(|name| Feature::from_name(name))
            .collect();
        Self { retained }
    }

    /// Engineer with an explicit retained list (e.g. from a model artifact)
    pub fn with_retained(names: &[String]) -> Result<Self, SchemaError> {
        if names.is_empty() {
            return Err(SchemaError::Empty("retained feature list".into()));
        }
        let mut retained = Vec::with_capacity(names.len());
        for name in names {
            let feature =
                Feature::from_name(name).ok_or_else(|| SchemaError::UnknownFeature(name.clone()))?;
            if retained.contains(&feature) {
                return Err(SchemaError::UnexpectedColumn(name.clone()));
            }
            retained.push(feature);
        }
        Ok(Self { retained })
    }

    pub fn features(&self) -> &[Feature] {
        &self.retained
    }

    /// Output column names, in order
    pub fn feature_names(&self) -> Vec<String> {
        self.retained.iter().map(|f| f.name().to_string()).collect()
    }

    /// Engineer one raw vector
    pub fn engineer_one(&self, raw: &RawStatistics) -> Result<Vec<f64>, SchemaError> {
        self.engineer_row(raw, 0)
    }

    fn engineer_row(&self, raw: &RawStatistics, row: usize) -> Result<Vec<f64>, SchemaError> {
        raw.check_finite(row)?;
        let mut values = Vec::with_capacity(self.retained.len());
        for feature in &self.retained {
            let value = feature.compute(raw);
            if !value.is_finite() {
                return Err(SchemaError::InvalidValue {
                    row,
                    column: feature.name().to_string(),
                    value: value.to_string(),
                });
            }
            values.push(value);
        }
        Ok(values)
    }

    /// Engineer every labelled row of a raw table
    pub fn engineer_table(&self, table: &RawTable) -> Result<Dataset, SchemaError> {
        if table.is_empty() {
            return Err(SchemaError::Empty("raw table has no rows".into()));
        }
        let idx = RawStatistics::resolve(&table.columns)?;

        let mut records = Vec::with_capacity(table.len());
        for (row, raw_row) in table.rows.iter().enumerate() {
            let label = raw_row
                .label
                .clone()
                .ok_or_else(|| SchemaError::MissingColumn(DEFAULT_LABEL_COLUMN.to_string()))?;
            let raw = RawStatistics::from_indexed(&raw_row.values, &idx);
            records.push(FeatureRecord::new(self.engineer_row(&raw, row)?, label));
        }

        let dataset = Dataset::from_records(self.feature_names(), records)?;
        info!(
            "Engineered {} records into {} features",
            dataset.len(),
            dataset.n_features()
        );
        debug!("Class distribution: {:?}", dataset.class_counts());
        Ok(dataset)
    }
}
