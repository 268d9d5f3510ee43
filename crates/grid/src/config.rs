use crate::error::GridError;
use marine_risk_types::{BoundingBox, TimeBucketSize};
use serde::{Deserialize, Serialize};

/// Upper bound on grid size; larger grids are almost always a unit mistake.
pub const MAX_CELLS: u64 = 4_000_000;

/// Grid resolution, extent and time bucketing. Fixed for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Area of interest in EPSG:4326 degrees.
    pub extent: BoundingBox,
    /// Cell edge length in degrees.
    pub resolution_deg: f64,
    /// Width of a time bucket.
    pub time_bucket: TimeBucketSize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            // US East Coast, Florida Keys to the Gulf of Maine
            extent: BoundingBox {
                min_lon: -82.0,
                min_lat: 24.0,
                max_lon: -65.0,
                max_lat: 46.0,
            },
            resolution_deg: 0.1,
            time_bucket: TimeBucketSize::Day,
        }
    }
}

impl GridConfig {
    /// Number of columns and rows needed to cover the extent.
    pub fn dimensions(&self) -> (u64, u64) {
        let cols = (self.extent.width() / self.resolution_deg).ceil() as u64;
        let rows = (self.extent.height() / self.resolution_deg).ceil() as u64;
        (cols.max(1), rows.max(1))
    }

    pub fn validate(&self) -> Result<(), GridError> {
        self.extent
            .validate()
            .map_err(|e| GridError::InvalidConfig(format!("extent: {e}")))?;

        if !self.resolution_deg.is_finite() || self.resolution_deg <= 0.0 {
            return Err(GridError::InvalidConfig(format!(
                "resolution_deg must be a positive number, got {}",
                self.resolution_deg
            )));
        }
        if self.resolution_deg > self.extent.width().max(self.extent.height()) {
            return Err(GridError::InvalidConfig(format!(
                "resolution_deg {} is larger than the extent",
                self.resolution_deg
            )));
        }

        let (cols, rows) = self.dimensions();
        if cols.saturating_mul(rows) > MAX_CELLS {
            return Err(GridError::TooManyCells {
                cols,
                rows,
                max: MAX_CELLS,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = GridConfig::default();
        config.validate().unwrap();
        assert_eq!(config.dimensions(), (170, 220));
    }

    #[test]
    fn rejects_bad_resolution() {
        for res in [0.0, -0.1, f64::NAN, f64::INFINITY, 50.0] {
            let config = GridConfig {
                resolution_deg: res,
                ..GridConfig::default()
            };
            assert!(config.validate().is_err(), "resolution {res} accepted");
        }
    }

    #[test]
    fn rejects_oversized_grid() {
        let config = GridConfig {
            resolution_deg: 0.001,
            ..GridConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(GridError::TooManyCells { .. })
        ));
    }

    #[test]
    fn rejects_inverted_extent() {
        let config = GridConfig {
            extent: BoundingBox {
                min_lon: -60.0,
                min_lat: 24.0,
                max_lon: -82.0,
                max_lat: 46.0,
            },
            ..GridConfig::default()
        };
        assert!(matches!(config.validate(), Err(GridError::InvalidConfig(_))));
    }
}
