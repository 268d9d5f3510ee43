use thiserror::Error;

/// Errors in quality configuration. Violating records are never errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QualityError {
    #[error("Invalid quality configuration: {0}")]
    InvalidConfig(String),

    #[error("Contract {contract} has an invalid rule: {message}")]
    InvalidRule { contract: String, message: String },
}
