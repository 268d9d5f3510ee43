//! Per cell-time feature vectors.

use crate::cell::CellKey;
use crate::error::TypesError;
use crate::record::SourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Named features produced by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureName {
    VesselCount,
    VesselDensity,
    VesselHours,
    VesselSpeedMean,
    VesselSpeedP90,
    WhaleDensity,
    WhaleRecency,
    DepthM,
    ProtectionFraction,
    ProtectionFlag,
    ProtectionLevel,
}

impl FeatureName {
    pub const ALL: [FeatureName; 11] = [
        FeatureName::VesselCount,
        FeatureName::VesselDensity,
        FeatureName::VesselHours,
        FeatureName::VesselSpeedMean,
        FeatureName::VesselSpeedP90,
        FeatureName::WhaleDensity,
        FeatureName::WhaleRecency,
        FeatureName::DepthM,
        FeatureName::ProtectionFraction,
        FeatureName::ProtectionFlag,
        FeatureName::ProtectionLevel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureName::VesselCount => "vessel_count",
            FeatureName::VesselDensity => "vessel_density",
            FeatureName::VesselHours => "vessel_hours",
            FeatureName::VesselSpeedMean => "vessel_speed_mean",
            FeatureName::VesselSpeedP90 => "vessel_speed_p90",
            FeatureName::WhaleDensity => "whale_density",
            FeatureName::WhaleRecency => "whale_recency",
            FeatureName::DepthM => "depth_m",
            FeatureName::ProtectionFraction => "protection_fraction",
            FeatureName::ProtectionFlag => "protection_flag",
            FeatureName::ProtectionLevel => "protection_level",
        }
    }

    /// Dataset family a feature is derived from.
    pub fn source(&self) -> SourceKind {
        match self {
            FeatureName::VesselCount
            | FeatureName::VesselDensity
            | FeatureName::VesselHours
            | FeatureName::VesselSpeedMean
            | FeatureName::VesselSpeedP90 => SourceKind::VesselTracks,
            FeatureName::WhaleDensity | FeatureName::WhaleRecency => SourceKind::WhaleSightings,
            FeatureName::DepthM => SourceKind::Bathymetry,
            FeatureName::ProtectionFraction
            | FeatureName::ProtectionFlag
            | FeatureName::ProtectionLevel => SourceKind::ProtectedAreas,
        }
    }
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureName {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatureName::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| TypesError::Parse(format!("unknown feature {s:?}")))
    }
}

/// A feature value, or the explicit marker that no source data was available.
///
/// `NoData` is distinct from an observed zero: "no vessels observed" is
/// `Observed(0.0)`, "no AIS coverage" is `NoData`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureValue {
    Observed(f64),
    NoData,
}

impl FeatureValue {
    pub fn observed(&self) -> Option<f64> {
        match self {
            FeatureValue::Observed(v) => Some(*v),
            FeatureValue::NoData => None,
        }
    }

    pub fn is_observed(&self) -> bool {
        matches!(self, FeatureValue::Observed(_))
    }
}

impl From<Option<f64>> for FeatureValue {
    fn from(value: Option<f64>) -> Self {
        value.map(FeatureValue::Observed).unwrap_or(FeatureValue::NoData)
    }
}

/// Immutable feature vector for one cell-time.
///
/// Coverage is derived from the contributing sources at construction and
/// cannot drift from them. A recomputation builds a new vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    key: CellKey,
    bucket_start: DateTime<Utc>,
    bucket_end: DateTime<Utc>,
    values: BTreeMap<FeatureName, FeatureValue>,
    sources: BTreeSet<SourceKind>,
    coverage: f64,
    extractor_version: String,
}

impl FeatureVector {
    pub fn new(
        key: CellKey,
        bucket_start: DateTime<Utc>,
        bucket_end: DateTime<Utc>,
        values: BTreeMap<FeatureName, FeatureValue>,
        sources: BTreeSet<SourceKind>,
        extractor_version: impl Into<String>,
    ) -> Self {
        let coverage = sources.len() as f64 / SourceKind::ALL.len() as f64;
        Self {
            key,
            bucket_start,
            bucket_end,
            values,
            sources,
            coverage,
            extractor_version: extractor_version.into(),
        }
    }

    pub fn key(&self) -> CellKey {
        self.key
    }

    pub fn bucket_start(&self) -> DateTime<Utc> {
        self.bucket_start
    }

    pub fn bucket_end(&self) -> DateTime<Utc> {
        self.bucket_end
    }

    /// `None` when the feature was never declared; `Some(NoData)` when declared
    /// but unsupported by data.
    pub fn get(&self, name: FeatureName) -> Option<FeatureValue> {
        self.values.get(&name).copied()
    }

    /// Observed value, if any.
    pub fn value(&self, name: FeatureName) -> Option<f64> {
        self.get(name).and_then(|v| v.observed())
    }

    pub fn values(&self) -> &BTreeMap<FeatureName, FeatureValue> {
        &self.values
    }

    pub fn sources(&self) -> &BTreeSet<SourceKind> {
        &self.sources
    }

    /// Fraction of the four source families that contributed (0..=1).
    pub fn coverage(&self) -> f64 {
        self.coverage
    }

    pub fn extractor_version(&self) -> &str {
        &self.extractor_version
    }

    /// Content hash over the canonical JSON encoding.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }
}
