use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeatureError {
    #[error("Invalid feature configuration: {0}")]
    InvalidConfig(String),
}

/// Feature extraction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Area fraction at or above which a cell counts as protected.
    pub protection_fraction_threshold: f64,
    /// Half-life of the whale recency signal.
    pub whale_recency_half_life_hours: f64,
    /// How far before a bucket sightings still contribute to recency.
    pub recency_lookback_days: u32,
    /// Percentile reported as `vessel_speed_p90`.
    pub speed_percentile: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            protection_fraction_threshold: 0.5,
            whale_recency_half_life_hours: 72.0,
            recency_lookback_days: 30,
            speed_percentile: 0.9,
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<(), FeatureError> {
        if !(0.0..=1.0).contains(&self.protection_fraction_threshold) {
            return Err(FeatureError::InvalidConfig(format!(
                "features.protection_fraction_threshold must be within [0, 1], got {}",
                self.protection_fraction_threshold
            )));
        }
        if !self.whale_recency_half_life_hours.is_finite() || self.whale_recency_half_life_hours <= 0.0
        {
            return Err(FeatureError::InvalidConfig(format!(
                "features.whale_recency_half_life_hours must be positive, got {}",
                self.whale_recency_half_life_hours
            )));
        }
        if !(self.speed_percentile > 0.0 && self.speed_percentile <= 1.0) {
            return Err(FeatureError::InvalidConfig(format!(
                "features.speed_percentile must be within (0, 1], got {}",
                self.speed_percentile
            )));
        }
        Ok(())
    }
}
