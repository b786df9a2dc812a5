//! Fault Dataset Model
//!
//! Provides labelled feature records, tabular file I/O and stratified splits
//! shared by every stage of the diagnosis pipeline.

mod error;
mod record;
mod split;
mod table;

pub use error::{DatasetError, SchemaError};
pub use record::{Dataset, DatasetRole, FeatureRecord, LabelSet};
pub use split::{stratified_split, FoldAssignment, SplitConfig, SplitError};
pub use table::{read_dataset, read_raw_table, write_dataset, RawRow, RawTable};

/// Default name of the label column in tabular files
pub const DEFAULT_LABEL_COLUMN: &str = "label";

/// Label of the fault-free class
pub const NORMAL_LABEL: &str = "Normal";
