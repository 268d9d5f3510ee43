//! AIS position reports to vessel track segments.

use crate::adapter::{DatasetAdapter, Rejection, RowOutcome, RowStream};
use crate::batch::RawBatch;
use crate::config::{AdapterLimits, VesselTrackConfig};
use crate::time::parse_timestamp;
use chrono::{DateTime, Utc};
use geo::{Coord, HaversineDistance, LineString, Point};
use marine_risk_types::{NormalizedRecord, Provenance, SourceKind, TrackSegment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const KNOTS_TO_MPS: f64 = 0.514_444;

/// Heading value meaning "not available" in AIS.
const HEADING_UNAVAILABLE: f64 = 511.0;

/// MMSI as delivered: numeric in MarineCadastre CSV exports, text elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Mmsi {
    Number(u64),
    Text(String),
}

impl Mmsi {
    fn normalized(&self) -> Option<String> {
        match self {
            Mmsi::Number(n) => Some(n.to_string()),
            Mmsi::Text(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
        }
    }
}

/// One AIS position report.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AisPosition {
    #[serde(alias = "MMSI")]
    pub mmsi: Option<Mmsi>,
    #[serde(alias = "BaseDateTime")]
    pub base_date_time: Option<String>,
    #[serde(alias = "LON")]
    pub lon: Option<f64>,
    #[serde(alias = "LAT")]
    pub lat: Option<f64>,
    /// Speed over ground, knots.
    #[serde(alias = "SOG")]
    pub sog: Option<f64>,
    #[serde(alias = "COG")]
    pub cog: Option<f64>,
    #[serde(alias = "Heading")]
    pub heading: Option<f64>,
    #[serde(alias = "VesselName")]
    pub vessel_name: Option<String>,
    #[serde(alias = "VesselType")]
    pub vessel_type: Option<i64>,
}

#[derive(Debug, Clone)]
struct Fix {
    row: usize,
    at: DateTime<Utc>,
    coord: Coord<f64>,
    sog_mps: Option<f64>,
    heading: Option<f64>,
}

/// Builds track segments from consecutive reports of the same vessel.
#[derive(Debug, Clone, Default)]
pub struct VesselTrackAdapter {
    config: VesselTrackConfig,
}

impl VesselTrackAdapter {
    pub fn new(config: VesselTrackConfig) -> Self {
        Self { config }
    }

    fn parse_row(
        &self,
        row: usize,
        pos: &AisPosition,
        batch: &RawBatch<AisPosition>,
    ) -> Result<(String, Fix), Rejection> {
        let vessel_id = pos
            .mmsi
            .as_ref()
            .and_then(Mmsi::normalized)
            .ok_or_else(|| Rejection::new(row, "missing mmsi"))?;
        let at = pos
            .base_date_time
            .as_deref()
            .and_then(parse_timestamp)
            .ok_or_else(|| Rejection::new(row, "unparseable base_date_time"))?;
        let (lon, lat) = match (pos.lon, pos.lat) {
            (Some(x), Some(y)) => batch
                .crs
                .to_wgs84(x, y)
                .ok_or_else(|| Rejection::new(row, "invalid coordinates"))?,
            _ => return Err(Rejection::new(row, "missing coordinates")),
        };
        let sog_mps = pos
            .sog
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(|knots| knots * KNOTS_TO_MPS);
        let heading = pos
            .heading
            .filter(|h| *h != HEADING_UNAVAILABLE && (0.0..360.0).contains(h))
            .or_else(|| pos.cog.filter(|c| (0.0..360.0).contains(c)));

        Ok((
            vessel_id,
            Fix {
                row,
                at,
                coord: Coord { x: lon, y: lat },
                sog_mps,
                heading,
            },
        ))
    }

    /// Segments for one vessel's time-ordered fixes.
    fn segments(&self, vessel_id: &str, fixes: &[Fix], provenance: &Provenance) -> Vec<RowOutcome> {
        let mut out = Vec::new();
        let Some(first) = fixes.first() else {
            return out;
        };
        let mut prev = first;

        for fix in &fixes[1..] {
            let gap = (fix.at - prev.at).num_milliseconds() as f64 / 1_000.0;
            if gap <= 0.0 {
                out.push(RowOutcome::Rejected(Rejection::new(
                    fix.row,
                    format!("duplicate report for vessel {vessel_id} at {}", fix.at),
                )));
                continue;
            }
            if gap > self.config.max_segment_gap_secs as f64 {
                prev = fix;
                continue;
            }

            let distance = Point::from(prev.coord).haversine_distance(&Point::from(fix.coord));
            let implied = distance / gap;
            if implied > self.config.max_implied_speed_mps {
                out.push(RowOutcome::Rejected(Rejection::new(
                    fix.row,
                    format!("implied speed {implied:.1} m/s exceeds limit"),
                )));
                continue;
            }

            let speed_mps = match (prev.sog_mps, fix.sog_mps) {
                (Some(a), Some(b)) => (a + b) / 2.0,
                (Some(s), None) | (None, Some(s)) => s,
                (None, None) => implied,
            };

            out.push(RowOutcome::Record(NormalizedRecord::TrackSegment(TrackSegment {
                vessel_id: vessel_id.to_string(),
                geometry: LineString::new(vec![prev.coord, fix.coord]),
                speed_mps,
                heading_deg: prev.heading,
                start: prev.at,
                end: fix.at,
                provenance: provenance.clone(),
            })));
            prev = fix;
        }
        out
    }
}

impl DatasetAdapter for VesselTrackAdapter {
    type Row = AisPosition;

    fn source(&self) -> SourceKind {
        SourceKind::VesselTracks
    }

    fn limits(&self) -> &AdapterLimits {
        &self.config.limits
    }

    fn rows<'a>(&'a self, batch: &'a RawBatch<AisPosition>) -> RowStream<'a> {
        let provenance = Provenance {
            source: SourceKind::VesselTracks,
            source_id: batch.source_id.clone(),
            ingested_at: batch.ingested_at,
        };

        // Track building needs every report of a vessel before the first
        // segment can be emitted.
        let mut rejected = Vec::new();
        let mut by_vessel: BTreeMap<String, Vec<Fix>> = BTreeMap::new();
        for (row, pos) in batch.rows.iter().enumerate() {
            match self.parse_row(row, pos, batch) {
                Ok((vessel, fix)) => by_vessel.entry(vessel).or_default().push(fix),
                Err(rejection) => rejected.push(RowOutcome::Rejected(rejection)),
            }
        }
        for fixes in by_vessel.values_mut() {
            fixes.sort_by_key(|f| (f.at, f.row));
        }

        Box::new(rejected.into_iter().chain(
            by_vessel
                .into_iter()
                .flat_map(move |(vessel, fixes)| self.segments(&vessel, &fixes, &provenance)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pos(mmsi: u64, time: &str, lon: f64, lat: f64, sog: Option<f64>) -> AisPosition {
        AisPosition {
            mmsi: Some(Mmsi::Number(mmsi)),
            base_date_time: Some(time.to_string()),
            lon: Some(lon),
            lat: Some(lat),
            sog,
            heading: Some(511.0),
            cog: Some(90.0),
            ..AisPosition::default()
        }
    }

    fn batch(rows: Vec<AisPosition>) -> RawBatch<AisPosition> {
        RawBatch::new(
            "ais-2024-01-01",
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            rows,
        )
    }

    fn segments(out: &[NormalizedRecord]) -> Vec<&TrackSegment> {
        out.iter()
            .filter_map(|r| match r {
                NormalizedRecord::TrackSegment(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn builds_segments_per_vessel_in_time_order() {
        let adapter = VesselTrackAdapter::default();
        let b = batch(vec![
            pos(1, "2024-01-01T00:10:00", -70.01, 40.0, Some(10.0)),
            pos(2, "2024-01-01T00:00:00", -71.0, 41.0, Some(5.0)),
            pos(1, "2024-01-01T00:00:00", -70.0, 40.0, Some(12.0)),
            pos(2, "2024-01-01T00:05:00", -71.0, 41.005, None),
        ]);

        let out: Vec<_> = adapter.normalize(&b).collect();
        let segs = segments(&out);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].vessel_id, "1");
        assert!((segs[0].speed_mps - 11.0 * KNOTS_TO_MPS).abs() < 1e-12);
        assert_eq!(segs[0].heading_deg, Some(90.0));
        assert!(segs[0].start < segs[0].end);
        assert_eq!(segs[1].vessel_id, "2");
        assert!((segs[1].speed_mps - 5.0 * KNOTS_TO_MPS).abs() < 1e-12);
    }

    #[test]
    fn long_gaps_break_tracks() {
        let adapter = VesselTrackAdapter::default();
        let b = batch(vec![
            pos(1, "2024-01-01T00:00:00", -70.0, 40.0, Some(1.0)),
            pos(1, "2024-01-01T02:00:00", -70.0, 40.01, Some(1.0)),
            pos(1, "2024-01-01T02:10:00", -70.0, 40.02, Some(1.0)),
        ]);
        let mut stream = adapter.normalize(&b);
        let out: Vec<_> = stream.by_ref().collect();
        assert_eq!(out.len(), 1);
        assert_eq!(stream.stats().rejected, 0);
    }

    #[test]
    fn gps_jumps_are_rejected() {
        let adapter = VesselTrackAdapter::default();
        let b = batch(vec![
            pos(1, "2024-01-01T00:00:00", -70.0, 40.0, Some(10.0)),
            pos(1, "2024-01-01T00:01:00", -60.0, 40.0, Some(10.0)),
            pos(1, "2024-01-01T00:02:00", -70.0, 40.001, Some(10.0)),
        ]);
        let mut stream = adapter.normalize(&b);
        let out: Vec<_> = stream.by_ref().collect();
        assert_eq!(out.len(), 1);
        assert_eq!(stream.stats().rejected, 1);
        assert_eq!(stream.stats().rejection_reasons[0].row, 1);
    }

    #[test]
    fn missing_implied_speed_fallback() {
        let adapter = VesselTrackAdapter::default();
        let b = batch(vec![
            pos(7, "2024-01-01T00:00:00", -70.0, 40.0, None),
            pos(7, "2024-01-01T00:10:00", -70.0, 40.01, None),
        ]);
        let out: Vec<_> = adapter.normalize(&b).collect();
        let seg = segments(&out)[0];
        let expected = Point::new(-70.0, 40.0).haversine_distance(&Point::new(-70.0, 40.01)) / 600.0;
        assert!((seg.speed_mps - expected).abs() < 1e-9);
    }

    #[test]
    fn malformed_rows_are_counted() {
        let adapter = VesselTrackAdapter::default();
        let bad_time = pos(1, "yesterday", -70.0, 40.0, None);
        let no_mmsi = AisPosition {
            mmsi: None,
            ..pos(1, "2024-01-01T00:00:00", -70.0, 40.0, None)
        };
        let b = batch(vec![bad_time, no_mmsi]);
        let err = adapter.normalize(&b).collect_checked().unwrap_err();
        assert!(matches!(
            err,
            crate::AdapterError::RejectionRateExceeded { rejected: 2, .. }
        ));
    }

    #[test]
    fn normalization_is_restartable() {
        let adapter = VesselTrackAdapter::default();
        let b = batch(vec![
            pos(3, "2024-01-01T00:00:00", -70.0, 40.0, Some(3.0)),
            pos(3, "2024-01-01T00:03:00", -70.0, 40.002, Some(3.0)),
            pos(3, "2024-01-01T00:06:00", -70.0, 40.004, Some(3.0)),
        ]);
        let first: Vec<_> = adapter.normalize(&b).collect();
        let second: Vec<_> = adapter.normalize(&b).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
