//! Persisted risk records and the query surface.

use crate::cell::{CellId, CellKey};
use crate::features::{FeatureName, FeatureValue};
use crate::geometry::BoundingBox;
use crate::time_bucket::{DateRange, TimeBucket};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Version tag of a scoring function, stored on every record it produces.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoringVersion(String);

impl ScoringVersion {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScoringVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScoringVersion {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Scored cell-time.
///
/// For a fixed (cell, bucket, scoring version) and identical inputs the
/// record is reproduced exactly; `computed_at` is the run's logical time,
/// not the wall clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRecord {
    pub cell_id: CellId,
    pub time_bucket: TimeBucket,
    pub bucket_start: DateTime<Utc>,
    pub bucket_end: DateTime<Utc>,
    pub cell_bounds: BoundingBox,
    /// Cell centroid as `[lon, lat]`.
    pub centroid: [f64; 2],
    /// Risk in [0, 1].
    pub score: f64,
    /// Scorer confidence in [0, 1], reduced further on degraded runs.
    pub confidence: f64,
    pub coverage: f64,
    pub degraded: bool,
    /// Snapshot of the features the score was computed from.
    pub features: BTreeMap<FeatureName, FeatureValue>,
    pub scoring_version: ScoringVersion,
    pub computed_at: DateTime<Utc>,
}

impl RiskRecord {
    pub fn key(&self) -> CellKey {
        CellKey::new(self.cell_id, self.time_bucket)
    }
}

/// Which scoring version a query reads.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSelector {
    /// The most recently written version.
    #[default]
    Latest,
    Exact(ScoringVersion),
}

/// Whether repeated appends for the same key are all returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionSelector {
    #[default]
    All,
    Latest,
}

/// Bounding-box and date-range query over stored risk records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskQuery {
    pub bbox: BoundingBox,
    pub dates: DateRange,
    #[serde(default)]
    pub version: VersionSelector,
    #[serde(default)]
    pub revisions: RevisionSelector,
}

impl RiskQuery {
    pub fn new(bbox: BoundingBox, dates: DateRange) -> Self {
        Self {
            bbox,
            dates,
            version: VersionSelector::Latest,
            revisions: RevisionSelector::All,
        }
    }

    pub fn with_version(mut self, version: ScoringVersion) -> Self {
        self.version = VersionSelector::Exact(version);
        self
    }

    pub fn latest_revision_only(mut self) -> Self {
        self.revisions = RevisionSelector::Latest;
        self
    }

    /// Spatial and temporal match, ignoring version selection.
    pub fn matches(&self, record: &RiskRecord) -> bool {
        self.bbox.overlaps(&record.cell_bounds)
            && self.dates.overlaps(record.bucket_start, record.bucket_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn record() -> RiskRecord {
        let bounds = BoundingBox::new(-70.1, 41.0, -70.0, 41.1).unwrap();
        RiskRecord {
            cell_id: CellId::from_bounds(&bounds),
            time_bucket: TimeBucket(19_875),
            bucket_start: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            bucket_end: Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap(),
            cell_bounds: bounds,
            centroid: [-70.05, 41.05],
            score: 0.4,
            confidence: 0.5,
            coverage: 0.5,
            degraded: false,
            features: BTreeMap::new(),
            scoring_version: ScoringVersion::new("baseline-linear/1.0.0"),
            computed_at: Utc.with_ymd_and_hms(2024, 6, 2, 6, 0, 0).unwrap(),
        }
    }

    fn days(from: u32, to: u32) -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 6, from).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, to).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn query_matches_on_box_and_dates() {
        let near = BoundingBox::new(-70.5, 40.5, -69.5, 41.5).unwrap();
        let far = BoundingBox::new(-60.0, 30.0, -59.0, 31.0).unwrap();

        assert!(RiskQuery::new(near, days(1, 1)).matches(&record()));
        assert!(!RiskQuery::new(far, days(1, 1)).matches(&record()));
        assert!(!RiskQuery::new(near, days(3, 4)).matches(&record()));
    }

    #[test]
    fn selectors_default_to_latest_version_and_all_revisions() {
        let q = RiskQuery::new(BoundingBox::new(-71.0, 40.0, -69.0, 42.0).unwrap(), days(1, 7));
        assert_eq!(q.version, VersionSelector::Latest);
        assert_eq!(q.revisions, RevisionSelector::All);

        let q = q
            .with_version(ScoringVersion::from("gbdt/2"))
            .latest_revision_only();
        assert_eq!(q.version, VersionSelector::Exact(ScoringVersion::new("gbdt/2")));
        assert_eq!(q.revisions, RevisionSelector::Latest);
    }
}
