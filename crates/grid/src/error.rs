use thiserror::Error;

/// Grid configuration errors. Always fatal at run start.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GridError {
    #[error("Invalid grid configuration: {0}")]
    InvalidConfig(String),

    #[error("Grid of {cols}x{rows} cells exceeds the limit of {max}")]
    TooManyCells { cols: u64, rows: u64, max: u64 },
}
