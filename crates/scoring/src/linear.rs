//! Baseline weighted linear model.

use crate::calibration::FeatureRange;
use crate::error::{Result, ScoringError};
use crate::scorer::{RiskScorer, ScoreOutput};
use marine_risk_types::{FeatureName, FeatureVector, ScoringVersion};
use serde::{Deserialize, Serialize};

pub const BASELINE_VERSION: &str = "baseline-linear/1.0.0";

/// One weighted term of the linear model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearTerm {
    pub feature: FeatureName,
    pub weight: f64,
    pub range: FeatureRange,
    /// Use the magnitude of the value (depth is stored as negative elevation).
    #[serde(default)]
    pub magnitude: bool,
}

impl LinearTerm {
    fn new(feature: FeatureName, weight: f64, min: f64, max: f64) -> Self {
        Self {
            feature,
            weight,
            range: FeatureRange::new(min, max),
            magnitude: false,
        }
    }
}

/// `score = clamp(bias + sum(weight * normalized), 0, 1)`.
///
/// Missing features contribute nothing. Confidence is coverage scaled down
/// by how far observed inputs sit outside their calibration range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRiskModel {
    pub version: ScoringVersion,
    pub bias: f64,
    pub terms: Vec<LinearTerm>,
}

impl LinearRiskModel {
    /// Vessel traffic, speed, whale presence and protection increase risk;
    /// deeper water lowers it slightly.
    pub fn baseline() -> Self {
        let depth = LinearTerm {
            magnitude: true,
            ..LinearTerm::new(FeatureName::DepthM, -0.10, 0.0, 4_000.0)
        };
        Self {
            version: ScoringVersion::new(BASELINE_VERSION),
            bias: 0.05,
            terms: vec![
                LinearTerm::new(FeatureName::VesselDensity, 0.30, 0.0, 50.0),
                LinearTerm::new(FeatureName::VesselSpeedMean, 0.15, 0.0, 15.0),
                LinearTerm::new(FeatureName::WhaleDensity, 0.25, 0.0, 10.0),
                LinearTerm::new(FeatureName::WhaleRecency, 0.15, 0.0, 1.0),
                LinearTerm::new(FeatureName::ProtectionFraction, 0.10, 0.0, 1.0),
                depth,
            ],
        }
    }
}

impl RiskScorer for LinearRiskModel {
    fn version(&self) -> &ScoringVersion {
        &self.version
    }

    fn validate(&self) -> Result<()> {
        if self.version.as_str().is_empty() {
            return Err(ScoringError::InvalidModel("empty version tag".into()));
        }
        if !self.bias.is_finite() {
            return Err(ScoringError::InvalidModel("non-finite bias".into()));
        }
        for term in &self.terms {
            if !term.weight.is_finite() || !term.range.is_valid() {
                return Err(ScoringError::InvalidModel(format!(
                    "invalid term for {}",
                    term.feature
                )));
            }
        }
        Ok(())
    }

    fn score(&self, features: &FeatureVector) -> ScoreOutput {
        let mut raw = self.bias;
        let mut extrapolation = 0.0;
        for term in &self.terms {
            let Some(mut v) = features.value(term.feature) else {
                continue;
            };
            if term.magnitude {
                v = v.abs();
            }
            raw += term.weight * term.range.normalize(v);
            extrapolation += term.range.extrapolation(v);
        }
        ScoreOutput {
            score: raw.clamp(0.0, 1.0),
            confidence: (features.coverage() * (-extrapolation).exp()).clamp(0.0, 1.0),
        }
    }
}
