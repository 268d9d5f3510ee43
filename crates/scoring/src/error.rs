//! Error types for risk scoring

use marine_risk_types::CellKey;
use thiserror::Error;

/// Errors that can occur while loading or running a scorer
#[derive(Error, Debug)]
pub enum ScoringError {
    /// Scorer produced NaN or infinity
    #[error("Scorer {version} produced a non-finite output for {key}: score={score}, confidence={confidence}")]
    NonFinite {
        version: String,
        key: CellKey,
        score: f64,
        confidence: f64,
    },

    /// Scorer produced a value outside [0, 1]
    #[error("Scorer {version} produced an out-of-range output for {key}: score={score}, confidence={confidence}")]
    OutOfRange {
        version: String,
        key: CellKey,
        score: f64,
        confidence: f64,
    },

    /// No scorer registered under the requested version
    #[error("Unknown scoring version: {0}")]
    UnknownVersion(String),

    /// Model file could not be read or decoded
    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    /// Model structure is inconsistent
    #[error("Invalid model structure: {0}")]
    InvalidModel(String),

    #[error("Invalid node reference in tree {tree} node {node}")]
    InvalidNodeReference { tree: usize, node: usize },

    #[error("Invalid scoring configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for scoring operations
pub type Result<T> = std::result::Result<T, ScoringError>;
