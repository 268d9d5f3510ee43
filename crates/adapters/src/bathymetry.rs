//! Gridded bathymetry to depth samples over raster cells.

use crate::adapter::{DatasetAdapter, Rejection, RowOutcome, RowStream};
use crate::batch::RawBatch;
use crate::config::AdapterLimits;
use geo::{Coord, Rect};
use marine_risk_types::{DepthFootprint, DepthSample, NormalizedRecord, Provenance, SourceKind};
use serde::{Deserialize, Serialize};

const FEET_TO_M: f64 = 0.3048;
const FATHOMS_TO_M: f64 = 1.8288;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthUnits {
    #[default]
    Meters,
    Feet,
    Fathoms,
}

impl DepthUnits {
    fn to_meters(self, v: f64) -> f64 {
        match self {
            DepthUnits::Meters => v,
            DepthUnits::Feet => v * FEET_TO_M,
            DepthUnits::Fathoms => v * FATHOMS_TO_M,
        }
    }
}

/// A raster tile. `values` are row-major starting at the north-west corner;
/// `null` marks no-data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BathymetryGrid {
    /// West edge of the first column.
    pub west: f64,
    /// North edge of the first row.
    pub north: f64,
    pub cell_size: f64,
    pub ncols: usize,
    pub nrows: usize,
    pub values: Vec<Option<f64>>,
    #[serde(default)]
    pub units: DepthUnits,
    /// Values are depths (positive downward) rather than elevations.
    #[serde(default)]
    pub positive_down: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BathymetryAdapter {
    limits: AdapterLimits,
}

impl BathymetryAdapter {
    pub fn new(limits: AdapterLimits) -> Self {
        Self { limits }
    }
}

fn check_shape(grid: &BathymetryGrid) -> Result<(), String> {
    if !grid.cell_size.is_finite() || grid.cell_size <= 0.0 {
        return Err(format!("invalid cell_size {}", grid.cell_size));
    }
    if !grid.west.is_finite() || !grid.north.is_finite() {
        return Err("non-finite origin".into());
    }
    if grid.values.len() != grid.ncols.saturating_mul(grid.nrows) {
        return Err(format!(
            "{} values for a {}x{} grid",
            grid.values.len(),
            grid.ncols,
            grid.nrows
        ));
    }
    Ok(())
}

fn cell_sample(
    index: usize,
    grid: &BathymetryGrid,
    batch: &RawBatch<BathymetryGrid>,
    provenance: &Provenance,
) -> RowOutcome {
    let Some(value) = grid.values[index] else {
        return RowOutcome::Skipped;
    };
    if !value.is_finite() {
        return RowOutcome::Rejected(Rejection::new(index, "non-finite depth value"));
    }
    let col = (index % grid.ncols) as f64;
    let row = (index / grid.ncols) as f64;
    let x0 = grid.west + col * grid.cell_size;
    let x1 = grid.west + (col + 1.0) * grid.cell_size;
    let y1 = grid.north - row * grid.cell_size;
    let y0 = grid.north - (row + 1.0) * grid.cell_size;

    let (Some(sw), Some(ne)) = (batch.crs.to_wgs84(x0, y0), batch.crs.to_wgs84(x1, y1)) else {
        return RowOutcome::Rejected(Rejection::new(index, "cell outside valid coordinates"));
    };

    let meters = grid.units.to_meters(value);
    let depth_m = if grid.positive_down { -meters } else { meters };

    RowOutcome::Record(NormalizedRecord::DepthSample(DepthSample {
        footprint: DepthFootprint::Cell(Rect::new(
            Coord { x: sw.0, y: sw.1 },
            Coord { x: ne.0, y: ne.1 },
        )),
        depth_m,
        provenance: provenance.clone(),
    }))
}

impl DatasetAdapter for BathymetryAdapter {
    type Row = BathymetryGrid;

    fn source(&self) -> SourceKind {
        SourceKind::Bathymetry
    }

    fn limits(&self) -> &AdapterLimits {
        &self.limits
    }

    fn rows<'a>(&'a self, batch: &'a RawBatch<BathymetryGrid>) -> RowStream<'a> {
        let provenance = Provenance {
            source: SourceKind::Bathymetry,
            source_id: batch.source_id.clone(),
            ingested_at: batch.ingested_at,
        };
        Box::new(
            batch
                .rows
                .iter()
                .enumerate()
                .flat_map(move |(tile, grid)| -> RowStream<'a> {
                    if let Err(reason) = check_shape(grid) {
                        return Box::new(std::iter::once(RowOutcome::Rejected(Rejection::new(
                            tile,
                            format!("tile {tile}: {reason}"),
                        ))));
                    }
                    let provenance = provenance.clone();
                    Box::new(
                        (0..grid.values.len())
                            .map(move |i| cell_sample(i, grid, batch, &provenance)),
                    )
                }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn tile(values: Vec<Option<f64>>, units: DepthUnits, positive_down: bool) -> BathymetryGrid {
        BathymetryGrid {
            west: -70.0,
            north: 41.0,
            cell_size: 0.5,
            ncols: 2,
            nrows: 2,
            values,
            units,
            positive_down,
        }
    }

    fn batch(grids: Vec<BathymetryGrid>) -> RawBatch<BathymetryGrid> {
        RawBatch::new("gebco", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), grids)
    }

    #[test]
    fn converts_units_and_sign() {
        let b = batch(vec![tile(
            vec![Some(10.0), None, Some(100.0), Some(-5.0)],
            DepthUnits::Fathoms,
            true,
        )]);
        let adapter = BathymetryAdapter::default();
        let mut stream = adapter.normalize(&b);
        let out: Vec<_> = stream.by_ref().collect();
        assert_eq!(out.len(), 3);
        assert_eq!(stream.stats().skipped_nodata, 1);
        assert_eq!(stream.stats().rejected, 0);

        let NormalizedRecord::DepthSample(first) = &out[0] else {
            panic!("expected depth sample");
        };
        assert!((first.depth_m + 18.288).abs() < 1e-9);
        let DepthFootprint::Cell(rect) = first.footprint else {
            panic!("expected cell footprint");
        };
        assert_eq!(rect.min(), Coord { x: -70.0, y: 40.5 });
        assert_eq!(rect.max(), Coord { x: -69.5, y: 41.0 });

        let NormalizedRecord::DepthSample(third) = &out[2] else {
            panic!("expected depth sample");
        };
        // second row, second column
        let DepthFootprint::Cell(rect) = third.footprint else {
            panic!("expected cell footprint");
        };
        assert_eq!(rect.min(), Coord { x: -69.5, y: 40.0 });
    }

    #[test]
    fn misshapen_tile_is_one_rejection() {
        let mut bad = tile(vec![Some(1.0)], DepthUnits::Meters, false);
        bad.ncols = 3;
        let b = batch(vec![bad, tile(vec![Some(-1.0); 4], DepthUnits::Meters, false)]);
        let adapter = BathymetryAdapter::default();
        let mut stream = adapter.normalize(&b);
        assert_eq!(stream.by_ref().count(), 4);
        assert_eq!(stream.stats().rejected, 1);
    }
}
