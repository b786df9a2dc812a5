//! Feature Significance Testing
//!
//! Runs a one-way ANOVA of every feature against the fault label and
//! reports F statistics with p-values from the F distribution.

mod anova;
pub mod distribution;

pub use anova::{anova, AnovaOutcome, AnovaReport, FeatureSignificance, UndefinedReason};
