use crate::error::QualityError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Run-level quality thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Violation rate above which a run is degraded.
    pub degraded_violation_rate: f64,
    /// Violation rate above which a run fails before scoring.
    pub failed_violation_rate: f64,
    /// Physically plausible vessel speed ceiling.
    pub max_speed_mps: f64,
    pub validation_timeout_secs: u64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            degraded_violation_rate: 0.05,
            failed_violation_rate: 0.5,
            max_speed_mps: 30.0,
            validation_timeout_secs: 300,
        }
    }
}

impl QualityConfig {
    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), QualityError> {
        for (name, value) in [
            ("degraded_violation_rate", self.degraded_violation_rate),
            ("failed_violation_rate", self.failed_violation_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(QualityError::InvalidConfig(format!(
                    "quality.{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.degraded_violation_rate > self.failed_violation_rate {
            return Err(QualityError::InvalidConfig(format!(
                "quality.degraded_violation_rate ({}) exceeds failed_violation_rate ({})",
                self.degraded_violation_rate, self.failed_violation_rate
            )));
        }
        if !self.max_speed_mps.is_finite() || self.max_speed_mps <= 0.0 {
            return Err(QualityError::InvalidConfig(format!(
                "quality.max_speed_mps must be positive, got {}",
                self.max_speed_mps
            )));
        }
        if self.validation_timeout_secs == 0 {
            return Err(QualityError::InvalidConfig(
                "quality.validation_timeout_secs must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceilings_must_be_ordered() {
        let config = QualityConfig {
            degraded_violation_rate: 0.6,
            failed_violation_rate: 0.5,
            ..QualityConfig::default()
        };
        assert!(config.validate().is_err());
        QualityConfig::default().validate().unwrap();
    }
}
