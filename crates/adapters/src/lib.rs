//! Dataset adapters.
//!
//! One adapter per upstream source. Adapters only normalize shape, units,
//! coordinate reference system and timestamps; they never join across
//! datasets. Malformed rows are counted and skipped, and a batch whose
//! rejection rate exceeds its configured threshold fails as a whole.

pub mod adapter;
pub mod bathymetry;
pub mod batch;
pub mod config;
pub mod error;
pub mod protected_areas;
pub mod sightings;
pub mod time;
pub mod vessel;

pub use adapter::{AdapterOutput, AdapterStats, DatasetAdapter, Normalized, Rejection, RowOutcome};
pub use bathymetry::{BathymetryAdapter, BathymetryGrid, DepthUnits};
pub use batch::{Crs, RawBatch};
pub use config::{AdapterLimits, AdaptersConfig, VesselTrackConfig};
pub use error::{AdapterError, Result};
pub use protected_areas::{GeoJsonGeometry, MpaRow, ProtectedAreaAdapter};
pub use sightings::{SightingRow, WhaleSightingAdapter};
pub use vessel::{AisPosition, Mmsi, VesselTrackAdapter, KNOTS_TO_MPS};
