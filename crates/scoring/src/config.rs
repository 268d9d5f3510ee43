use crate::error::{Result, ScoringError};
use crate::linear::BASELINE_VERSION;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Scoring version used for new runs.
    pub version: String,
    /// Optional tree ensemble to register next to the built-in model.
    pub model_path: Option<PathBuf>,
    /// Confidence multiplier applied to every record of a degraded run.
    pub degraded_confidence_factor: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            version: BASELINE_VERSION.to_string(),
            model_path: None,
            degraded_confidence_factor: 0.5,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(ScoringError::InvalidConfig(
                "scoring.version must not be empty".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.degraded_confidence_factor) {
            return Err(ScoringError::InvalidConfig(format!(
                "scoring.degraded_confidence_factor must be within [0, 1], got {}",
                self.degraded_confidence_factor
            )));
        }
        Ok(())
    }
}
