//! Feature Engineering Engine
//!
//! Turns raw waveform statistics into the engineered, pruned feature set used
//! for training and inference, and provides the correlation analysis that
//! drives pruning decisions.

mod correlation;
mod engineer;
pub mod statistics;

pub use correlation::{
    CorrelatedPair, CorrelationMatrix, DEFAULT_CORRELATION_THRESHOLD, RETENTION_PREFERENCE,
};
pub use engineer::{
    guarded_div, Feature, FeatureEngineer, RawStatistics, ENGINEERED_FEATURES, EPSILON,
    RAW_COLUMNS,
};
