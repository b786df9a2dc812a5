//! Dataset Error Types

use thiserror::Error;

/// Errors raised when records or files do not match the agreed schema
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    /// Required column absent from the input
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// Column present that the schema does not allow
    #[error("Unexpected column: {0}")]
    UnexpectedColumn(String),

    /// Column present but at the wrong position
    #[error("Column {position} should be {expected}, found {found}")]
    ColumnMismatch {
        position: usize,
        expected: String,
        found: String,
    },

    /// Row with a different field count than the header
    #[error("Row {row} has {actual} fields, header has {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// Unparsable or non-finite value
    #[error("Row {row}, column {column}: invalid value {value:?}")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },

    /// Record width does not match the feature list
    #[error("Record has {actual} values, schema has {expected}")]
    WidthMismatch { expected: usize, actual: usize },

    /// Feature name that cannot be produced
    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    /// Label outside the known label set
    #[error("Unknown label: {0}")]
    UnknownLabel(String),

    /// Input without header or rows
    #[error("Empty input: {0}")]
    Empty(String),
}

/// Errors while reading or writing tabular files
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}
