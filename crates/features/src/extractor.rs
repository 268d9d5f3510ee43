//! Per cell-time aggregation.
//!
//! Every feature is computed by summing over the input slice in order, so a
//! fixed input order gives bit-identical vectors.

use crate::config::FeatureConfig;
use chrono::{DateTime, Duration, Utc};
use geo::{Area, BooleanOps, MultiPolygon};
use marine_risk_types::{
    BoundingBox, CellKey, DepthSample, FeatureName, FeatureValue, FeatureVector,
    NormalizedRecord, ProtectionPolygon, SightingPoint, SourceKind, TimeBucketSize, TrackSegment,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

pub const EXTRACTOR_VERSION: &str = "features/1.0.0";

/// A record routed to a cell with its assignment weight.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedRecord {
    pub record: Arc<NormalizedRecord>,
    /// Length fraction for tracks, area fraction for depth and zones, 1.0 for
    /// points.
    pub weight: f64,
}

impl WeightedRecord {
    pub fn new(record: Arc<NormalizedRecord>, weight: f64) -> Self {
        Self { record, weight }
    }
}

/// The cell-time being extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct CellWindow {
    pub key: CellKey,
    pub bounds: BoundingBox,
    pub bucket_size: TimeBucketSize,
    /// Time-varying sources that delivered data for this bucket somewhere in
    /// the extent. A surveyed source with nothing in the cell reads as an
    /// observed zero rather than `NoData`.
    pub surveyed: BTreeSet<SourceKind>,
}

impl CellWindow {
    pub fn new(key: CellKey, bounds: BoundingBox, bucket_size: TimeBucketSize) -> Self {
        Self {
            key,
            bounds,
            bucket_size,
            surveyed: BTreeSet::new(),
        }
    }

    pub fn surveyed(mut self, sources: impl IntoIterator<Item = SourceKind>) -> Self {
        self.surveyed.extend(sources);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// How far back sightings must be gathered for recency.
    pub fn lookback(&self) -> Duration {
        Duration::days(self.config.recency_lookback_days as i64)
    }

    /// Build the feature vector for one cell-time.
    ///
    /// `records` holds everything assigned to the cell for this bucket, the
    /// static layers (depth, zones), and earlier sightings within the recency
    /// lookback. Only sources with data inside the bucket count toward
    /// coverage.
    pub fn extract(&self, window: &CellWindow, records: &[WeightedRecord]) -> FeatureVector {
        let key = window.key;
        let start = window.bucket_size.start_of(key.time_bucket);
        let end = window.bucket_size.end_of(key.time_bucket);

        let mut tracks = Vec::new();
        let mut sightings = Vec::new();
        let mut depths = Vec::new();
        let mut zones = Vec::new();
        for wr in records {
            if !(wr.weight > 0.0) {
                continue;
            }
            match wr.record.as_ref() {
                NormalizedRecord::TrackSegment(t) => tracks.push((t, wr.weight)),
                NormalizedRecord::SightingPoint(s) => sightings.push((s, wr.weight)),
                NormalizedRecord::DepthSample(d) => depths.push((d, wr.weight)),
                NormalizedRecord::ProtectionPolygon(z) => zones.push((z, wr.weight)),
            }
        }

        let mut values: BTreeMap<FeatureName, FeatureValue> = FeatureName::ALL
            .iter()
            .map(|name| (*name, FeatureValue::NoData))
            .collect();
        let mut sources = BTreeSet::new();

        if self.vessel_features(&tracks, &mut values) {
            sources.insert(SourceKind::VesselTracks);
        } else if window.surveyed.contains(&SourceKind::VesselTracks) {
            for name in [
                FeatureName::VesselCount,
                FeatureName::VesselDensity,
                FeatureName::VesselHours,
            ] {
                values.insert(name, FeatureValue::Observed(0.0));
            }
        }
        if self.whale_features(&sightings, start, end, &mut values) {
            sources.insert(SourceKind::WhaleSightings);
        } else if window.surveyed.contains(&SourceKind::WhaleSightings) {
            values.insert(FeatureName::WhaleDensity, FeatureValue::Observed(0.0));
        }
        if depth_feature(&depths, &mut values) {
            sources.insert(SourceKind::Bathymetry);
        }
        if self.protection_features(&zones, &window.bounds, start, end, &mut values) {
            sources.insert(SourceKind::ProtectedAreas);
        }

        let fv = FeatureVector::new(key, start, end, values, sources, EXTRACTOR_VERSION);
        debug!(
            key = %key,
            records = records.len(),
            coverage = fv.coverage(),
            "features extracted"
        );
        fv
    }

    fn vessel_features(
        &self,
        tracks: &[(&TrackSegment, f64)],
        values: &mut BTreeMap<FeatureName, FeatureValue>,
    ) -> bool {
        if tracks.is_empty() {
            return false;
        }
        let vessels: BTreeSet<&str> = tracks.iter().map(|(t, _)| t.vessel_id.as_str()).collect();
        let density: f64 = tracks.iter().map(|(_, w)| w).sum();
        let hours: f64 = tracks
            .iter()
            .map(|(t, w)| w * (t.end - t.start).num_milliseconds() as f64 / 3_600_000.0)
            .sum();
        let speed_mean = tracks.iter().map(|(t, w)| w * t.speed_mps).sum::<f64>() / density;
        let speeds: Vec<(f64, f64)> = tracks.iter().map(|(t, w)| (t.speed_mps, *w)).collect();

        values.insert(FeatureName::VesselCount, FeatureValue::Observed(vessels.len() as f64));
        values.insert(FeatureName::VesselDensity, FeatureValue::Observed(density));
        values.insert(FeatureName::VesselHours, FeatureValue::Observed(hours));
        values.insert(FeatureName::VesselSpeedMean, FeatureValue::Observed(speed_mean));
        values.insert(
            FeatureName::VesselSpeedP90,
            weighted_percentile(speeds, self.config.speed_percentile).into(),
        );
        true
    }

    fn whale_features(
        &self,
        sightings: &[(&SightingPoint, f64)],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        values: &mut BTreeMap<FeatureName, FeatureValue>,
    ) -> bool {
        let lookback_start = start - self.lookback();
        let mut current = 0usize;
        let mut density = 0.0;
        let mut latest: Option<DateTime<Utc>> = None;

        for (s, w) in sightings {
            if s.observed_at >= end || s.observed_at < lookback_start {
                continue;
            }
            if s.observed_at >= start {
                current += 1;
                density += w * s.observer_confidence;
            }
            latest = Some(latest.map_or(s.observed_at, |l| l.max(s.observed_at)));
        }

        if let Some(latest) = latest {
            let age_hours = (end - latest).num_milliseconds() as f64 / 3_600_000.0;
            let recency = (-age_hours / self.config.whale_recency_half_life_hours).exp2();
            values.insert(FeatureName::WhaleRecency, FeatureValue::Observed(recency));
        }
        if current == 0 {
            return false;
        }
        values.insert(FeatureName::WhaleDensity, FeatureValue::Observed(density));
        true
    }

    /// Fraction of the cell inside the union of the effective zones, so
    /// nested or duplicated sites count their shared area once.
    fn protection_features(
        &self,
        zones: &[(&ProtectionPolygon, f64)],
        bounds: &BoundingBox,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        values: &mut BTreeMap<FeatureName, FeatureValue>,
    ) -> bool {
        let cell = MultiPolygon::new(vec![bounds.to_rect().to_polygon()]);
        let mut covered: MultiPolygon<f64> = MultiPolygon::new(Vec::new());
        let mut level: Option<f64> = None;
        for (zone, _) in zones {
            if !zone.is_effective_during(start, end) {
                continue;
            }
            let inside = zone.geometry.intersection(&cell);
            covered = if covered.0.is_empty() {
                inside
            } else {
                covered.union(&inside)
            };
            let restriction = zone.level.restriction();
            level = Some(level.map_or(restriction, |l: f64| l.max(restriction)));
        }
        let Some(level) = level else {
            return false;
        };
        let fraction = match bounds.area() {
            a if a > 0.0 => (covered.unsigned_area() / a).clamp(0.0, 1.0),
            _ => 0.0,
        };
        let flag = if fraction >= self.config.protection_fraction_threshold {
            1.0
        } else {
            0.0
        };
        values.insert(FeatureName::ProtectionFraction, FeatureValue::Observed(fraction));
        values.insert(FeatureName::ProtectionFlag, FeatureValue::Observed(flag));
        values.insert(FeatureName::ProtectionLevel, FeatureValue::Observed(level));
        true
    }
}

fn depth_feature(
    depths: &[(&DepthSample, f64)],
    values: &mut BTreeMap<FeatureName, FeatureValue>,
) -> bool {
    let total: f64 = depths.iter().map(|(_, w)| w).sum();
    if depths.is_empty() || !(total > 0.0) {
        return false;
    }
    let mean = depths.iter().map(|(d, w)| w * d.depth_m).sum::<f64>() / total;
    values.insert(FeatureName::DepthM, FeatureValue::Observed(mean));
    true
}

/// Smallest value whose cumulative weight reaches `p` of the total.
fn weighted_percentile(mut samples: Vec<(f64, f64)>, p: f64) -> Option<f64> {
    samples.retain(|(v, w)| v.is_finite() && *w > 0.0);
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    let total: f64 = samples.iter().map(|(_, w)| w).sum();
    let target = p * total;
    let mut cumulative = 0.0;
    for (v, w) in &samples {
        cumulative += w;
        if cumulative >= target - 1e-12 {
            return Some(*v);
        }
    }
    samples.last().map(|(v, _)| *v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_respects_weights() {
        let samples = vec![(10.0, 0.1), (2.0, 0.8), (5.0, 0.1)];
        assert_eq!(weighted_percentile(samples.clone(), 0.5), Some(2.0));
        assert_eq!(weighted_percentile(samples.clone(), 0.9), Some(5.0));
        assert_eq!(weighted_percentile(samples, 1.0), Some(10.0));
        assert_eq!(weighted_percentile(vec![], 0.9), None);
    }
}
