//! Raw batch envelope and coordinate reference systems.

use crate::error::{AdapterError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::path::Path;

/// WGS84 semi-major axis used by Web Mercator.
const MERCATOR_RADIUS_M: f64 = 6_378_137.0;

/// Coordinate reference systems accepted from upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Crs {
    #[default]
    #[serde(rename = "EPSG:4326", alias = "epsg:4326", alias = "WGS84")]
    Wgs84,
    /// NAD83. Within a metre of WGS84, well below any useful grid resolution.
    #[serde(rename = "EPSG:4269", alias = "epsg:4269", alias = "NAD83")]
    Nad83,
    #[serde(rename = "EPSG:3857", alias = "epsg:3857")]
    WebMercator,
}

impl Crs {
    /// Convert `(x, y)` in this CRS to `(lon, lat)` degrees. Returns `None`
    /// for non-finite input or positions outside the valid lon/lat range.
    pub fn to_wgs84(self, x: f64, y: f64) -> Option<(f64, f64)> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let (lon, lat) = match self {
            Crs::Wgs84 | Crs::Nad83 => (x, y),
            Crs::WebMercator => {
                let lon = (x / MERCATOR_RADIUS_M).to_degrees();
                let lat = (2.0 * (y / MERCATOR_RADIUS_M).exp().atan() - PI / 2.0).to_degrees();
                (lon, lat)
            }
        };
        if (-180.0..=180.0).contains(&lon) && (-90.0..=90.0).contains(&lat) {
            Some((lon, lat))
        } else {
            None
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Crs::Wgs84 => "EPSG:4326",
            Crs::Nad83 => "EPSG:4269",
            Crs::WebMercator => "EPSG:3857",
        })
    }
}

/// A batch of raw rows from one upstream source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBatch<T> {
    pub source_id: String,
    pub ingested_at: DateTime<Utc>,
    #[serde(default)]
    pub crs: Crs,
    pub rows: Vec<T>,
}

impl<T> RawBatch<T> {
    pub fn new(source_id: impl Into<String>, ingested_at: DateTime<Utc>, rows: Vec<T>) -> Self {
        Self {
            source_id: source_id.into(),
            ingested_at,
            crs: Crs::Wgs84,
            rows,
        }
    }

    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = crs;
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<T: DeserializeOwned> RawBatch<T> {
    /// Read a JSON batch file.
    pub fn read_json(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| AdapterError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| AdapterError::Decode {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}
