//! The scoring contract.

use crate::error::{Result, ScoringError};
use marine_risk_types::{FeatureVector, ScoringVersion};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Risk and confidence for one feature vector, both in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutput {
    pub score: f64,
    pub confidence: f64,
}

/// A pure, deterministic, versioned scoring function.
///
/// Implementations must not keep mutable state or perform I/O in `score`;
/// the same vector always yields the same output.
pub trait RiskScorer: Send + Sync {
    fn version(&self) -> &ScoringVersion;

    /// Structural check run once when the scorer is registered.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn score(&self, features: &FeatureVector) -> ScoreOutput;
}

/// Run `scorer` and reject non-finite or out-of-range output. Failures are
/// logged with the full feature vector so they can be reproduced.
pub fn score_checked(scorer: &dyn RiskScorer, features: &FeatureVector) -> Result<ScoreOutput> {
    let out = scorer.score(features);
    let version = scorer.version().to_string();
    let key = features.key();

    let err = if !out.score.is_finite() || !out.confidence.is_finite() {
        ScoringError::NonFinite {
            version,
            key,
            score: out.score,
            confidence: out.confidence,
        }
    } else if !(0.0..=1.0).contains(&out.score) || !(0.0..=1.0).contains(&out.confidence) {
        ScoringError::OutOfRange {
            version,
            key,
            score: out.score,
            confidence: out.confidence,
        }
    } else {
        return Ok(out);
    };

    let vector = serde_json::to_string(features).unwrap_or_else(|e| format!("<unserializable: {e}>"));
    error!(
        key = %key,
        scorer = %scorer.version(),
        error = %err,
        features = %vector,
        "scoring failed"
    );
    Err(err)
}
