//! Data Preprocessing
//!
//! Provides IQR winsorization, SMOTE oversampling of the minority class and
//! z-score standardization. Every fitting step refuses evaluation data.

mod balancer;
mod capper;
mod error;
mod scaler;

pub use balancer::{BalanceReport, BalancerConfig, ClassBalancer};
pub use capper::{CappingBounds, CappingConfig, CappingReport, FeatureBounds, OutlierCapper};
pub use error::PreprocessError;
pub use scaler::{DegenerateScalePolicy, FeatureScaler, ScalerConfig, ScalingParameters};
