//! Field access for validated values.

use chrono::{DateTime, Utc};
use marine_risk_types::{
    FeatureName, FeatureValue, FeatureVector, NormalizedRecord, RecordGeometry,
};
use std::sync::Arc;

/// A field as seen by contract rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Number(f64),
    Text(&'a str),
    Time(DateTime<Utc>),
    /// The field applies to this value but has no content.
    Missing,
}

/// Track identity and time span used for monotonicity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackSpan<'a> {
    pub track_id: &'a str,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Anything a contract can be applied to.
///
/// `field` returns `None` when the field does not apply to this kind of value,
/// in which case rules on that field pass.
pub trait Validatable {
    fn field(&self, name: &str) -> Option<FieldValue<'_>>;

    fn label(&self) -> String;

    fn geometry(&self) -> Option<RecordGeometry<'_>> {
        None
    }

    fn track_span(&self) -> Option<TrackSpan<'_>> {
        None
    }

    fn feature_values(&self) -> Option<Vec<(FeatureName, FeatureValue)>> {
        None
    }
}

fn text(s: &str) -> FieldValue<'_> {
    if s.trim().is_empty() {
        FieldValue::Missing
    } else {
        FieldValue::Text(s)
    }
}

fn optional_number(v: Option<f64>) -> FieldValue<'static> {
    v.map(FieldValue::Number).unwrap_or(FieldValue::Missing)
}

impl Validatable for NormalizedRecord {
    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        if name == "source_id" {
            return Some(text(&self.provenance().source_id));
        }
        match (self, name) {
            (NormalizedRecord::TrackSegment(t), "vessel_id") => Some(text(&t.vessel_id)),
            (NormalizedRecord::TrackSegment(t), "speed_mps") => Some(FieldValue::Number(t.speed_mps)),
            (NormalizedRecord::TrackSegment(t), "heading_deg") => Some(optional_number(t.heading_deg)),
            (NormalizedRecord::TrackSegment(t), "start") => Some(FieldValue::Time(t.start)),
            (NormalizedRecord::TrackSegment(t), "end") => Some(FieldValue::Time(t.end)),
            (NormalizedRecord::TrackSegment(t), "duration_secs") => Some(FieldValue::Number(
                (t.end - t.start).num_milliseconds() as f64 / 1_000.0,
            )),
            (NormalizedRecord::SightingPoint(s), "species") => {
                Some(s.species.as_deref().map(text).unwrap_or(FieldValue::Missing))
            }
            (NormalizedRecord::SightingPoint(s), "observer_confidence") => {
                Some(FieldValue::Number(s.observer_confidence))
            }
            (NormalizedRecord::SightingPoint(s), "observed_at") => Some(FieldValue::Time(s.observed_at)),
            (NormalizedRecord::DepthSample(d), "depth_m") => Some(FieldValue::Number(d.depth_m)),
            (NormalizedRecord::ProtectionPolygon(z), "zone_id") => Some(text(&z.zone_id)),
            _ => None,
        }
    }

    fn label(&self) -> String {
        self.describe()
    }

    fn geometry(&self) -> Option<RecordGeometry<'_>> {
        Some(NormalizedRecord::geometry(self))
    }

    fn track_span(&self) -> Option<TrackSpan<'_>> {
        match self {
            NormalizedRecord::TrackSegment(t) => Some(TrackSpan {
                track_id: &t.vessel_id,
                start: t.start,
                end: t.end,
            }),
            _ => None,
        }
    }
}

impl Validatable for FeatureVector {
    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        if name == "coverage" {
            return Some(FieldValue::Number(self.coverage()));
        }
        let feature: FeatureName = name.parse().ok()?;
        Some(match self.get(feature) {
            Some(FeatureValue::Observed(v)) => FieldValue::Number(v),
            Some(FeatureValue::NoData) | None => FieldValue::Missing,
        })
    }

    fn label(&self) -> String {
        format!("features {}", self.key())
    }

    fn feature_values(&self) -> Option<Vec<(FeatureName, FeatureValue)>> {
        Some(self.values().iter().map(|(k, v)| (*k, *v)).collect())
    }
}

impl<T: Validatable + ?Sized> Validatable for Arc<T> {
    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        (**self).field(name)
    }

    fn label(&self) -> String {
        (**self).label()
    }

    fn geometry(&self) -> Option<RecordGeometry<'_>> {
        (**self).geometry()
    }

    fn track_span(&self) -> Option<TrackSpan<'_>> {
        (**self).track_span()
    }

    fn feature_values(&self) -> Option<Vec<(FeatureName, FeatureValue)>> {
        (**self).feature_values()
    }
}

impl<T: Validatable + ?Sized> Validatable for &T {
    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        (**self).field(name)
    }

    fn label(&self) -> String {
        (**self).label()
    }

    fn geometry(&self) -> Option<RecordGeometry<'_>> {
        (**self).geometry()
    }

    fn track_span(&self) -> Option<TrackSpan<'_>> {
        (**self).track_span()
    }

    fn feature_values(&self) -> Option<Vec<(FeatureName, FeatureValue)>> {
        (**self).feature_values()
    }
}
