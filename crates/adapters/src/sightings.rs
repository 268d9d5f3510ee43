//! OBIS-style cetacean occurrence records to sighting points.

use crate::adapter::{DatasetAdapter, Rejection, RowOutcome, RowStream};
use crate::batch::RawBatch;
use crate::config::AdapterLimits;
use crate::time::parse_event_date;
use geo::Point;
use marine_risk_types::{NormalizedRecord, Provenance, SightingPoint, SourceKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SightingRow {
    #[serde(alias = "scientificName")]
    pub scientific_name: Option<String>,
    pub species: Option<String>,
    #[serde(alias = "decimalLatitude")]
    pub decimal_latitude: Option<f64>,
    #[serde(alias = "decimalLongitude")]
    pub decimal_longitude: Option<f64>,
    #[serde(alias = "eventDate")]
    pub event_date: Option<String>,
    pub observer_confidence: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct WhaleSightingAdapter {
    limits: AdapterLimits,
}

impl WhaleSightingAdapter {
    pub fn new(limits: AdapterLimits) -> Self {
        Self { limits }
    }
}

fn normalize_row(
    row: usize,
    raw: &SightingRow,
    batch: &RawBatch<SightingRow>,
    provenance: &Provenance,
) -> RowOutcome {
    let (Some(x), Some(y)) = (raw.decimal_longitude, raw.decimal_latitude) else {
        return RowOutcome::Rejected(Rejection::new(row, "missing coordinates"));
    };
    let Some((lon, lat)) = batch.crs.to_wgs84(x, y) else {
        return RowOutcome::Rejected(Rejection::new(row, "invalid coordinates"));
    };
    let Some(observed_at) = raw.event_date.as_deref().and_then(parse_event_date) else {
        return RowOutcome::Rejected(Rejection::new(row, "unparseable event_date"));
    };
    let observer_confidence = raw.observer_confidence.unwrap_or(1.0);
    if !(0.0..=1.0).contains(&observer_confidence) {
        return RowOutcome::Rejected(Rejection::new(
            row,
            format!("observer_confidence {observer_confidence} outside [0, 1]"),
        ));
    }
    let species = raw
        .species
        .clone()
        .or_else(|| raw.scientific_name.clone())
        .filter(|s| !s.trim().is_empty());

    RowOutcome::Record(NormalizedRecord::SightingPoint(SightingPoint {
        location: Point::new(lon, lat),
        species,
        observed_at,
        observer_confidence,
        provenance: provenance.clone(),
    }))
}

impl DatasetAdapter for WhaleSightingAdapter {
    type Row = SightingRow;

    fn source(&self) -> SourceKind {
        SourceKind::WhaleSightings
    }

    fn limits(&self) -> &AdapterLimits {
        &self.limits
    }

    fn rows<'a>(&'a self, batch: &'a RawBatch<SightingRow>) -> RowStream<'a> {
        let provenance = Provenance {
            source: SourceKind::WhaleSightings,
            source_id: batch.source_id.clone(),
            ingested_at: batch.ingested_at,
        };
        Box::new(
            batch
                .rows
                .iter()
                .enumerate()
                .map(move |(row, raw)| normalize_row(row, raw, batch, &provenance)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn batch(json: &str) -> RawBatch<SightingRow> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn obis_field_names_are_accepted() {
        let b = batch(
            r#"{
                "source_id": "obis-2019",
                "ingested_at": "2024-02-01T00:00:00Z",
                "rows": [
                    {"scientificName": "Eubalaena glacialis", "decimalLatitude": 41.5,
                     "decimalLongitude": -69.8, "eventDate": "2019-06-02/2019-06-04"}
                ]
            }"#,
        );
        let out: Vec<_> = WhaleSightingAdapter::default().normalize(&b).collect();
        assert_eq!(out.len(), 1);
        let NormalizedRecord::SightingPoint(s) = &out[0] else {
            panic!("expected sighting");
        };
        assert_eq!(s.species.as_deref(), Some("Eubalaena glacialis"));
        assert_eq!(s.observer_confidence, 1.0);
        assert_eq!(s.observed_at, Utc.with_ymd_and_hms(2019, 6, 2, 0, 0, 0).unwrap());
        assert_eq!(s.provenance.source_id, "obis-2019");
    }

    #[test]
    fn bad_rows_are_rejected_not_fatal() {
        let mut rows = vec![SightingRow {
            decimal_latitude: Some(41.0),
            decimal_longitude: Some(-70.0),
            event_date: Some("2020-01-01".into()),
            ..SightingRow::default()
        }; 40];
        rows.push(SightingRow {
            decimal_latitude: Some(41.0),
            decimal_longitude: Some(-70.0),
            event_date: Some("2020-01-01".into()),
            observer_confidence: Some(3.0),
            ..SightingRow::default()
        });
        let b = RawBatch::new("s", Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap(), rows);
        let out = WhaleSightingAdapter::default()
            .normalize(&b)
            .collect_checked()
            .unwrap();
        assert_eq!(out.records.len(), 40);
        assert_eq!(out.stats.rejected, 1);
    }
}
