use serde::{Deserialize, Serialize};

/// Range a feature was calibrated on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRange {
    pub min: f64,
    pub max: f64,
}

impl FeatureRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn span(&self) -> f64 {
        (self.max - self.min).max(f64::EPSILON)
    }

    /// Min-max normalized value clamped to [0, 1].
    pub fn normalize(&self, v: f64) -> f64 {
        ((v - self.min) / self.span()).clamp(0.0, 1.0)
    }

    /// Distance outside the range, in multiples of the range width.
    pub fn extrapolation(&self, v: f64) -> f64 {
        if v < self.min {
            (self.min - v) / self.span()
        } else if v > self.max {
            (v - self.max) / self.span()
        } else {
            0.0
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min < self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_and_measures_extrapolation() {
        let r = FeatureRange::new(0.0, 10.0);
        assert_eq!(r.normalize(5.0), 0.5);
        assert_eq!(r.normalize(20.0), 1.0);
        assert_eq!(r.extrapolation(5.0), 0.0);
        assert_eq!(r.extrapolation(20.0), 1.0);
        assert_eq!(r.extrapolation(-5.0), 0.5);
    }
}
