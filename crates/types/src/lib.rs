//! Shared data model for the marine risk fusion engine.
//!
//! Modules:
//! - `geometry`: lon/lat bounding boxes
//! - `time_bucket`: epoch-aligned time buckets and date ranges
//! - `cell`: grid cell identity and cell-time keys
//! - `record`: normalized adapter output with provenance
//! - `features`: immutable per cell-time feature vectors
//! - `risk`: risk records, scoring versions and queries

pub mod cell;
pub mod error;
pub mod features;
pub mod geometry;
pub mod record;
pub mod risk;
pub mod time_bucket;

pub use cell::{CellId, CellKey, GridCell};
pub use error::TypesError;
pub use features::{FeatureName, FeatureValue, FeatureVector};
pub use geometry::BoundingBox;
pub use record::{
    DepthFootprint, DepthSample, NormalizedRecord, Provenance, ProtectionLevel, ProtectionPolygon,
    RecordGeometry, SightingPoint, SourceKind, Temporal, TrackSegment,
};
pub use risk::{RevisionSelector, RiskQuery, RiskRecord, ScoringVersion, VersionSelector};
pub use time_bucket::{DateRange, TimeBucket, TimeBucketSize};
