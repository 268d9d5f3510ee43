//! Quality validation.
//!
//! Contracts are declarative rule lists applied twice per run: to adapter
//! output before assignment and to feature vectors before scoring.
//! Violations are values, counted by rule, and never stop a batch.

pub mod config;
pub mod contract;
pub mod error;
pub mod geometry;
pub mod subject;
pub mod validator;

pub use config::QualityConfig;
pub use contract::{Contract, Rule};
pub use error::QualityError;
pub use subject::{FieldValue, TrackSpan, Validatable};
pub use validator::{
    RuleState, ValidationOutcome, ValidationStats, Validator, Violation, TIMEOUT_KEY,
};
