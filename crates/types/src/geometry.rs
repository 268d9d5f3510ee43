//! Axis-aligned lon/lat bounds shared by the grid, the records and queries.

use crate::error::TypesError;
use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longitude/latitude bounding box in EPSG:4326 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Build a bounding box, rejecting inverted, empty or non-finite bounds.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self, TypesError> {
        let bbox = Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    /// Check that the box is finite, non-empty and inside the world bounds.
    pub fn validate(&self) -> Result<(), TypesError> {
        let values = [self.min_lon, self.min_lat, self.max_lon, self.max_lat];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(TypesError::InvalidBounds(format!(
                "non-finite bound in {self}"
            )));
        }
        if self.min_lon >= self.max_lon || self.min_lat >= self.max_lat {
            return Err(TypesError::InvalidBounds(format!(
                "empty or inverted box {self}"
            )));
        }
        if self.min_lon < -180.0 || self.max_lon > 180.0 || self.min_lat < -90.0 || self.max_lat > 90.0
        {
            return Err(TypesError::InvalidBounds(format!(
                "box {self} exceeds world bounds"
            )));
        }
        Ok(())
    }

    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Planar area in square degrees.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Coord<f64> {
        Coord {
            x: (self.min_lon + self.max_lon) / 2.0,
            y: (self.min_lat + self.max_lat) / 2.0,
        }
    }

    /// Inclusive containment test.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    /// True when the two boxes share a region of positive area.
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.min_lon < other.max_lon
            && other.min_lon < self.max_lon
            && self.min_lat < other.max_lat
            && other.min_lat < self.max_lat
    }

    /// Area of the intersection in square degrees (0 when disjoint).
    pub fn overlap_area(&self, other: &BoundingBox) -> f64 {
        let w = self.max_lon.min(other.max_lon) - self.min_lon.max(other.min_lon);
        let h = self.max_lat.min(other.max_lat) - self.min_lat.max(other.min_lat);
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.min_lon,
                y: self.min_lat,
            },
            Coord {
                x: self.max_lon,
                y: self.max_lat,
            },
        )
    }

    pub fn from_rect(rect: &Rect<f64>) -> Self {
        let min = rect.min();
        let max = rect.max();
        Self {
            min_lon: min.x,
            min_lat: min.y,
            max_lon: max.x,
            max_lat: max.y,
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

/// Parses `min_lon,min_lat,max_lon,max_lat`.
impl FromStr for BoundingBox {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<f64>()
                    .map_err(|e| TypesError::Parse(format!("bbox component {p:?}: {e}")))
            })
            .collect::<Result<_, _>>()?;
        if parts.len() != 4 {
            return Err(TypesError::Parse(format!(
                "bbox needs 4 components, got {}",
                parts.len()
            )));
        }
        Self::new(parts[0], parts[1], parts[2], parts[3])
    }
}
