//! Normalized adapter output.
//!
//! Every source dataset is reduced to one of four record shapes in a common
//! CRS (EPSG:4326), UTC timestamps and SI units. Records carry provenance so
//! any feature or score can be traced back to the batch it came from.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use geo::{LineString, MultiPolygon, Point, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four dataset families fused by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    VesselTracks,
    WhaleSightings,
    Bathymetry,
    ProtectedAreas,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::VesselTracks,
        SourceKind::WhaleSightings,
        SourceKind::Bathymetry,
        SourceKind::ProtectedAreas,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::VesselTracks => "vessel_tracks",
            SourceKind::WhaleSightings => "whale_sightings",
            SourceKind::Bathymetry => "bathymetry",
            SourceKind::ProtectedAreas => "protected_areas",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a record came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: SourceKind,
    pub source_id: String,
    pub ingested_at: DateTime<Utc>,
}

/// Protection level of a marine protected area (NOAA MPA inventory vocabulary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionLevel {
    NoTake,
    NoAccess,
    NoImpact,
    ZonedMultipleUse,
    UniformMultipleUse,
    Other,
}

impl ProtectionLevel {
    /// Parse the inventory's `Prot_Lvl` strings, tolerating case and separators.
    pub fn parse(raw: &str) -> Self {
        let norm: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match norm.as_str() {
            "notake" => ProtectionLevel::NoTake,
            "noaccess" => ProtectionLevel::NoAccess,
            "noimpact" => ProtectionLevel::NoImpact,
            "zonedmultipleuse" | "zonedmultipleusewithnotakeareas" => {
                ProtectionLevel::ZonedMultipleUse
            }
            "uniformmultipleuse" => ProtectionLevel::UniformMultipleUse,
            _ => ProtectionLevel::Other,
        }
    }

    /// Relative restriction strength in [0, 1].
    pub fn restriction(&self) -> f64 {
        match self {
            ProtectionLevel::NoTake | ProtectionLevel::NoAccess => 1.0,
            ProtectionLevel::NoImpact => 0.9,
            ProtectionLevel::ZonedMultipleUse => 0.6,
            ProtectionLevel::UniformMultipleUse => 0.4,
            ProtectionLevel::Other => 0.25,
        }
    }
}

/// A vessel track between two consecutive position reports.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSegment {
    pub vessel_id: String,
    pub geometry: LineString<f64>,
    /// Speed over ground in metres per second.
    pub speed_mps: f64,
    pub heading_deg: Option<f64>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub provenance: Provenance,
}

/// A single whale sighting.
#[derive(Debug, Clone, PartialEq)]
pub struct SightingPoint {
    pub location: Point<f64>,
    pub species: Option<String>,
    pub observed_at: DateTime<Utc>,
    /// Observer confidence in [0, 1].
    pub observer_confidence: f64,
    pub provenance: Provenance,
}

/// Spatial support of a depth value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DepthFootprint {
    Point(Point<f64>),
    Cell(Rect<f64>),
}

/// A bathymetry sample; `depth_m` follows the elevation convention
/// (negative below sea level).
#[derive(Debug, Clone, PartialEq)]
pub struct DepthSample {
    pub footprint: DepthFootprint,
    pub depth_m: f64,
    pub provenance: Provenance,
}

/// A protected-area boundary with its validity window.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtectionPolygon {
    pub zone_id: String,
    pub name: Option<String>,
    pub geometry: MultiPolygon<f64>,
    pub level: ProtectionLevel,
    pub effective_from: Option<NaiveDate>,
    pub effective_to: Option<NaiveDate>,
    pub provenance: Provenance,
}

impl ProtectionPolygon {
    /// Whether the zone is in force at any point of `[start, end)`.
    pub fn is_effective_during(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let from_ok = self
            .effective_from
            .map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)) < end)
            .unwrap_or(true);
        let to_ok = self
            .effective_to
            .and_then(|d| d.succ_opt())
            .map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)) > start)
            .unwrap_or(true);
        from_ok && to_ok
    }
}

/// Borrowed view of a record's geometry.
#[derive(Debug, Clone, Copy)]
pub enum RecordGeometry<'a> {
    Point(&'a Point<f64>),
    Line(&'a LineString<f64>),
    Area(&'a MultiPolygon<f64>),
    Cell(&'a Rect<f64>),
}

/// When a record applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temporal {
    Instant(DateTime<Utc>),
    Span {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Applies to every time bucket (bathymetry, protected areas).
    Static,
}

/// Common record shape produced by every dataset adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedRecord {
    TrackSegment(TrackSegment),
    SightingPoint(SightingPoint),
    DepthSample(DepthSample),
    ProtectionPolygon(ProtectionPolygon),
}

impl NormalizedRecord {
    pub fn source_kind(&self) -> SourceKind {
        self.provenance().source
    }

    pub fn provenance(&self) -> &Provenance {
        match self {
            NormalizedRecord::TrackSegment(r) => &r.provenance,
            NormalizedRecord::SightingPoint(r) => &r.provenance,
            NormalizedRecord::DepthSample(r) => &r.provenance,
            NormalizedRecord::ProtectionPolygon(r) => &r.provenance,
        }
    }

    pub fn geometry(&self) -> RecordGeometry<'_> {
        match self {
            NormalizedRecord::TrackSegment(r) => RecordGeometry::Line(&r.geometry),
            NormalizedRecord::SightingPoint(r) => RecordGeometry::Point(&r.location),
            NormalizedRecord::DepthSample(r) => match &r.footprint {
                DepthFootprint::Point(p) => RecordGeometry::Point(p),
                DepthFootprint::Cell(rect) => RecordGeometry::Cell(rect),
            },
            NormalizedRecord::ProtectionPolygon(r) => RecordGeometry::Area(&r.geometry),
        }
    }

    pub fn temporal(&self) -> Temporal {
        match self {
            NormalizedRecord::TrackSegment(r) => Temporal::Span {
                start: r.start,
                end: r.end,
            },
            NormalizedRecord::SightingPoint(r) => Temporal::Instant(r.observed_at),
            NormalizedRecord::DepthSample(_) | NormalizedRecord::ProtectionPolygon(_) => {
                Temporal::Static
            }
        }
    }

    /// Short label used in logs and violation reports.
    pub fn describe(&self) -> String {
        match self {
            NormalizedRecord::TrackSegment(r) => {
                format!("track {} {}..{}", r.vessel_id, r.start, r.end)
            }
            NormalizedRecord::SightingPoint(r) => format!(
                "sighting {} at {}",
                r.species.as_deref().unwrap_or("<unknown>"),
                r.observed_at
            ),
            NormalizedRecord::DepthSample(r) => format!("depth {} m", r.depth_m),
            NormalizedRecord::ProtectionPolygon(r) => format!("zone {}", r.zone_id),
        }
    }
}

impl From<TrackSegment> for NormalizedRecord {
    fn from(r: TrackSegment) -> Self {
        NormalizedRecord::TrackSegment(r)
    }
}

impl From<SightingPoint> for NormalizedRecord {
    fn from(r: SightingPoint) -> Self {
        NormalizedRecord::SightingPoint(r)
    }
}

impl From<DepthSample> for NormalizedRecord {
    fn from(r: DepthSample) -> Self {
        NormalizedRecord::DepthSample(r)
    }
}

impl From<ProtectionPolygon> for NormalizedRecord {
    fn from(r: ProtectionPolygon) -> Self {
        NormalizedRecord::ProtectionPolygon(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn provenance() -> Provenance {
        Provenance {
            source: SourceKind::ProtectedAreas,
            source_id: "mpa-2023".into(),
            ingested_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn zone(from: Option<NaiveDate>, to: Option<NaiveDate>) -> ProtectionPolygon {
        ProtectionPolygon {
            zone_id: "z1".into(),
            name: None,
            geometry: MultiPolygon::new(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 1.0, y: 0.0),
                (x: 1.0, y: 1.0),
                (x: 0.0, y: 0.0),
            ]]),
            level: ProtectionLevel::NoTake,
            effective_from: from,
            effective_to: to,
            provenance: provenance(),
        }
    }

    #[test]
    fn protection_level_parsing_is_lenient() {
        assert_eq!(ProtectionLevel::parse("No Take"), ProtectionLevel::NoTake);
        assert_eq!(ProtectionLevel::parse("no-take"), ProtectionLevel::NoTake);
        assert_eq!(
            ProtectionLevel::parse("Uniform Multiple Use"),
            ProtectionLevel::UniformMultipleUse
        );
        assert_eq!(ProtectionLevel::parse("???"), ProtectionLevel::Other);
    }

    #[test]
    fn effective_window_is_inclusive_of_end_date() {
        let z = zone(
            NaiveDate::from_ymd_opt(2020, 1, 1),
            NaiveDate::from_ymd_opt(2024, 3, 10),
        );
        let day = |d: u32| Utc.with_ymd_and_hms(2024, 3, d, 0, 0, 0).unwrap();
        assert!(z.is_effective_during(day(10), day(11)));
        assert!(!z.is_effective_during(day(11), day(12)));

        let open = zone(None, None);
        assert!(open.is_effective_during(day(11), day(12)));

        let future = zone(NaiveDate::from_ymd_opt(2025, 1, 1), None);
        assert!(!future.is_effective_during(day(11), day(12)));
    }

    #[test]
    fn static_records_have_no_time() {
        let rec: NormalizedRecord = zone(None, None).into();
        assert_eq!(rec.temporal(), Temporal::Static);
        assert_eq!(rec.source_kind(), SourceKind::ProtectedAreas);
    }
}
