use marine_risk_adapters::AdapterError;
use marine_risk_features::FeatureError;
use marine_risk_grid::GridError;
use marine_risk_quality::QualityError;
use marine_risk_scoring::ScoringError;
use marine_risk_storage::StorageError;
use thiserror::Error;

/// Errors that stop a run before it produces a summary.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Configuration could not be loaded or is invalid
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Quality(#[from] QualityError),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Input batch file could not be listed or read
    #[error("Input error at {path}: {message}")]
    Input { path: String, message: String },

    #[error("Failed to build worker pool: {0}")]
    WorkerPool(String),
}

impl From<config::ConfigError> for PipelineError {
    fn from(e: config::ConfigError) -> Self {
        PipelineError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
