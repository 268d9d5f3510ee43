//! Run orchestration.
//!
//! A run takes raw batches for the four sources, pushes them through
//! normalization, validation, grid assignment, feature extraction and
//! scoring, appends the resulting risk records to a store and returns a
//! [`RunSummary`]. Work for independent cell-times runs on a rayon pool;
//! nothing is shared between runs except the store.

pub mod cancel;
pub mod config;
pub mod error;
pub mod inputs;
pub mod run;
pub mod summary;

pub use cancel::CancellationToken;
pub use config::{RunConfig, RunSettings, ENV_PREFIX};
pub use error::{PipelineError, Result};
pub use inputs::RunInputs;
pub use run::Pipeline;
pub use summary::{CellOutcome, FailedCell, RunStatus, RunSummary};
