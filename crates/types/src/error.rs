use thiserror::Error;

/// Errors raised while constructing or parsing data-model values
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypesError {
    #[error("Invalid bounding box: {0}")]
    InvalidBounds(String),

    #[error("Invalid date range: {start} is after {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("Parse error: {0}")]
    Parse(String),
}
