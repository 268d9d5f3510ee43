//! NOAA MPA inventory features to protection polygons.

use crate::adapter::{DatasetAdapter, Rejection, RowOutcome, RowStream};
use crate::batch::{Crs, RawBatch};
use crate::config::AdapterLimits;
use chrono::NaiveDate;
use geo::{Coord, LineString, MultiPolygon, Polygon};
use marine_risk_types::{
    NormalizedRecord, ProtectionLevel, ProtectionPolygon, Provenance, SourceKind,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// GeoJSON geometry object (`Polygon` or `MultiPolygon`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoJsonGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpaRow {
    #[serde(alias = "Site_ID")]
    pub site_id: Option<String>,
    #[serde(alias = "Site_Name", default)]
    pub site_name: Option<String>,
    #[serde(alias = "Prot_Lvl", default)]
    pub prot_lvl: Option<String>,
    #[serde(alias = "Estab_Yr", default)]
    pub estab_yr: Option<i32>,
    #[serde(default)]
    pub effective_to: Option<NaiveDate>,
    pub geometry: Option<GeoJsonGeometry>,
}

#[derive(Debug, Clone, Default)]
pub struct ProtectedAreaAdapter {
    limits: AdapterLimits,
}

impl ProtectedAreaAdapter {
    pub fn new(limits: AdapterLimits) -> Self {
        Self { limits }
    }
}

fn parse_ring(value: &Value, crs: Crs) -> Result<LineString<f64>, String> {
    let points = value.as_array().ok_or("ring is not an array")?;
    let mut coords = Vec::with_capacity(points.len());
    for p in points {
        let pair = p.as_array().ok_or("position is not an array")?;
        let (Some(x), Some(y)) = (
            pair.first().and_then(Value::as_f64),
            pair.get(1).and_then(Value::as_f64),
        ) else {
            return Err("position without numeric x/y".into());
        };
        let (lon, lat) = crs
            .to_wgs84(x, y)
            .ok_or_else(|| format!("invalid position [{x}, {y}]"))?;
        coords.push(Coord { x: lon, y: lat });
    }
    if coords.len() < 4 {
        return Err(format!("ring has {} positions, need at least 4", coords.len()));
    }
    Ok(LineString::new(coords))
}

fn parse_polygon(value: &Value, crs: Crs) -> Result<Polygon<f64>, String> {
    let rings = value.as_array().ok_or("polygon is not an array of rings")?;
    let mut rings = rings.iter().map(|r| parse_ring(r, crs));
    let exterior = rings.next().ok_or("polygon has no rings")??;
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

/// Decode a GeoJSON Polygon or MultiPolygon into WGS84.
pub fn parse_geometry(geometry: &GeoJsonGeometry, crs: Crs) -> Result<MultiPolygon<f64>, String> {
    match geometry.kind.as_str() {
        "Polygon" => Ok(MultiPolygon::new(vec![parse_polygon(&geometry.coordinates, crs)?])),
        "MultiPolygon" => {
            let polygons = geometry
                .coordinates
                .as_array()
                .ok_or("multipolygon is not an array")?
                .iter()
                .map(|p| parse_polygon(p, crs))
                .collect::<Result<Vec<_>, _>>()?;
            if polygons.is_empty() {
                return Err("empty multipolygon".into());
            }
            Ok(MultiPolygon::new(polygons))
        }
        other => Err(format!("unsupported geometry type {other}")),
    }
}

fn normalize_row(
    row: usize,
    raw: &MpaRow,
    crs: Crs,
    provenance: &Provenance,
) -> Result<NormalizedRecord, Rejection> {
    let zone_id = raw
        .site_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Rejection::new(row, "missing site_id"))?;
    let geometry = raw
        .geometry
        .as_ref()
        .ok_or_else(|| Rejection::new(row, "missing geometry"))
        .and_then(|g| parse_geometry(g, crs).map_err(|e| Rejection::new(row, e)))?;
    let effective_from = match raw.estab_yr {
        Some(year) => Some(
            NaiveDate::from_ymd_opt(year, 1, 1)
                .ok_or_else(|| Rejection::new(row, format!("invalid estab_yr {year}")))?,
        ),
        None => None,
    };
    if let (Some(from), Some(to)) = (effective_from, raw.effective_to) {
        if to < from {
            return Err(Rejection::new(row, "effective_to precedes establishment"));
        }
    }

    Ok(NormalizedRecord::ProtectionPolygon(ProtectionPolygon {
        zone_id: zone_id.to_string(),
        name: raw.site_name.clone(),
        geometry,
        level: raw
            .prot_lvl
            .as_deref()
            .map(ProtectionLevel::parse)
            .unwrap_or(ProtectionLevel::Other),
        effective_from,
        effective_to: raw.effective_to,
        provenance: provenance.clone(),
    }))
}

impl DatasetAdapter for ProtectedAreaAdapter {
    type Row = MpaRow;

    fn source(&self) -> SourceKind {
        SourceKind::ProtectedAreas
    }

    fn limits(&self) -> &AdapterLimits {
        &self.limits
    }

    fn rows<'a>(&'a self, batch: &'a RawBatch<MpaRow>) -> RowStream<'a> {
        let provenance = Provenance {
            source: SourceKind::ProtectedAreas,
            source_id: batch.source_id.clone(),
            ingested_at: batch.ingested_at,
        };
        Box::new(batch.rows.iter().enumerate().map(move |(row, raw)| {
            match normalize_row(row, raw, batch.crs, &provenance) {
                Ok(record) => RowOutcome::Record(record),
                Err(rejection) => RowOutcome::Rejected(rejection),
            }
        }))
    }
}
