use arrow::error::ArrowError;
use thiserror::Error;

/// Fatal problems with the input data or parameters, raised before any search runs.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Location set is empty")]
    EmptyLocations,

    #[error("Flow set is empty")]
    EmptyFlows,

    #[error("Required column '{column}' is missing")]
    MissingColumn { column: String },

    #[error("Column '{column}' has unsupported type {found}, expected {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
        found: String,
    },

    #[error("Null value in required column '{column}' at row {row}")]
    NullValue { column: String, row: usize },

    #[error("Negative count {value} in column '{column}' at row {row}")]
    NegativeCount {
        column: String,
        row: usize,
        value: i64,
    },

    #[error("Required field '{field}' is empty in record {index}")]
    EmptyField { field: &'static str, index: usize },

    #[error("Invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Failed to read record batch: {0}")]
    Arrow(#[from] ArrowError),
}
