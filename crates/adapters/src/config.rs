use crate::error::{AdapterError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rejection and timeout limits shared by every adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterLimits {
    /// Fraction of rejected rows above which a batch is treated as a
    /// systemic upstream format change.
    pub max_rejection_rate: f64,
    pub batch_timeout_secs: u64,
}

impl Default for AdapterLimits {
    fn default() -> Self {
        Self {
            max_rejection_rate: 0.05,
            batch_timeout_secs: 300,
        }
    }
}

impl AdapterLimits {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !(0.0..=1.0).contains(&self.max_rejection_rate) {
            return Err(AdapterError::InvalidConfig(format!(
                "{name}.max_rejection_rate must be within [0, 1], got {}",
                self.max_rejection_rate
            )));
        }
        if self.batch_timeout_secs == 0 {
            return Err(AdapterError::InvalidConfig(format!(
                "{name}.batch_timeout_secs must be non-zero"
            )));
        }
        Ok(())
    }
}

/// Vessel track adapter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VesselTrackConfig {
    #[serde(flatten)]
    pub limits: AdapterLimits,
    /// Consecutive reports further apart than this start a new track.
    pub max_segment_gap_secs: u64,
    /// Pairs implying a faster speed are GPS jumps and get rejected.
    pub max_implied_speed_mps: f64,
}

impl Default for VesselTrackConfig {
    fn default() -> Self {
        Self {
            limits: AdapterLimits::default(),
            max_segment_gap_secs: 1_800,
            max_implied_speed_mps: 30.0,
        }
    }
}

/// Settings for all four adapters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptersConfig {
    pub vessel_tracks: VesselTrackConfig,
    pub whale_sightings: AdapterLimits,
    pub bathymetry: AdapterLimits,
    pub protected_areas: AdapterLimits,
}

impl AdaptersConfig {
    pub fn validate(&self) -> Result<()> {
        self.vessel_tracks.limits.validate("adapters.vessel_tracks")?;
        self.whale_sightings.validate("adapters.whale_sightings")?;
        self.bathymetry.validate("adapters.bathymetry")?;
        self.protected_areas.validate("adapters.protected_areas")?;

        if self.vessel_tracks.max_segment_gap_secs == 0 {
            return Err(AdapterError::InvalidConfig(
                "adapters.vessel_tracks.max_segment_gap_secs must be non-zero".into(),
            ));
        }
        let max_speed = self.vessel_tracks.max_implied_speed_mps;
        if !max_speed.is_finite() || max_speed <= 0.0 {
            return Err(AdapterError::InvalidConfig(format!(
                "adapters.vessel_tracks.max_implied_speed_mps must be positive, got {max_speed}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        AdaptersConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut config = AdaptersConfig::default();
        config.bathymetry.max_rejection_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut config = AdaptersConfig::default();
        config.vessel_tracks.limits.batch_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
