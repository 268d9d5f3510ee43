use marine_risk_types::SourceKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AdapterError>;

/// Adapter errors. Individual malformed rows never surface here; they are
/// counted as rejections instead.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(
        "{kind} adapter rejected {rejected} of {examined} rows ({rate:.3} > {threshold:.3}) in batch {source_id}"
    )]
    RejectionRateExceeded {
        kind: SourceKind,
        source_id: String,
        rejected: u64,
        examined: u64,
        rate: f64,
        threshold: f64,
    },

    #[error("Invalid adapter configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read batch {path}: {message}")]
    Io { path: String, message: String },

    #[error("Failed to decode batch {path}: {message}")]
    Decode { path: String, message: String },
}
