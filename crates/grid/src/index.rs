//! Fixed-resolution spatial grid over the run extent.
//!
//! Cells are laid out row by row from the south-west corner. Cell edges are
//! always computed as `origin + index * resolution`, so neighbouring cells share
//! bit-identical edges and cell ids are reproducible across runs.

use crate::clip::clip_segment;
use crate::config::GridConfig;
use crate::error::GridError;
use chrono::{DateTime, Duration, Utc};
use geo::{Area, BooleanOps, BoundingRect, Coord, HaversineDistance, MultiPolygon, Point, Rect};
use marine_risk_types::{
    BoundingBox, GridCell, NormalizedRecord, RecordGeometry, Temporal, TimeBucket, TimeBucketSize,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Weights below this are treated as touching, not overlapping.
const MIN_WEIGHT: f64 = 1e-12;

/// One cell a record contributes to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellAssignment {
    pub cell: GridCell,
    /// `None` for static records, which apply to every bucket of the run.
    pub time_bucket: Option<TimeBucket>,
    /// Length fraction for tracks, area fraction of the cell for areas and
    /// raster cells, 1.0 for points.
    pub weight: f64,
}

/// Skip counters accumulated over the lifetime of an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssignmentStats {
    /// Geometries entirely outside the grid.
    pub outside_extent: u64,
    /// Geometries that were only partly inside the grid.
    pub partially_outside: u64,
}

/// Maps record geometries onto grid cells.
#[derive(Debug)]
pub struct SpatialGridIndex {
    config: GridConfig,
    cols: u32,
    rows: u32,
    outside_extent: AtomicU64,
    partially_outside: AtomicU64,
}

impl SpatialGridIndex {
    pub fn new(config: GridConfig) -> Result<Self, GridError> {
        config.validate()?;
        let (cols, rows) = config.dimensions();
        debug!(
            cols,
            rows,
            resolution_deg = config.resolution_deg,
            "spatial grid initialized"
        );
        Ok(Self {
            cols: cols as u32,
            rows: rows as u32,
            config,
            outside_extent: AtomicU64::new(0),
            partially_outside: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn bucket_size(&self) -> TimeBucketSize {
        self.config.time_bucket
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.cols, self.rows)
    }

    pub fn cell_count(&self) -> u64 {
        self.cols as u64 * self.rows as u64
    }

    /// Area actually covered by cells. The last row and column may extend past
    /// the configured extent when it is not a multiple of the resolution.
    pub fn coverage(&self) -> BoundingBox {
        BoundingBox {
            min_lon: self.lon_edge(0),
            min_lat: self.lat_edge(0),
            max_lon: self.lon_edge(self.cols),
            max_lat: self.lat_edge(self.rows),
        }
    }

    fn lon_edge(&self, col: u32) -> f64 {
        self.config.extent.min_lon + col as f64 * self.config.resolution_deg
    }

    fn lat_edge(&self, row: u32) -> f64 {
        self.config.extent.min_lat + row as f64 * self.config.resolution_deg
    }

    pub fn cell(&self, col: u32, row: u32) -> Option<GridCell> {
        if col >= self.cols || row >= self.rows {
            return None;
        }
        let bounds = BoundingBox {
            min_lon: self.lon_edge(col),
            min_lat: self.lat_edge(row),
            max_lon: self.lon_edge(col + 1),
            max_lat: self.lat_edge(row + 1),
        };
        Some(GridCell::new(col, row, bounds))
    }

    /// Column and row of the cell containing `(lon, lat)`. Cells are
    /// half-open on their east and north edges.
    pub fn locate(&self, lon: f64, lat: f64) -> Option<(u32, u32)> {
        if !lon.is_finite() || !lat.is_finite() {
            return None;
        }
        let cov = self.coverage();
        if lon < cov.min_lon || lon >= cov.max_lon || lat < cov.min_lat || lat >= cov.max_lat {
            return None;
        }
        let col = self.snap(lon, self.cols, |c| self.lon_edge(c));
        let row = self.snap(lat, self.rows, |r| self.lat_edge(r));
        Some((col, row))
    }

    pub fn cell_at(&self, lon: f64, lat: f64) -> Option<GridCell> {
        self.locate(lon, lat).and_then(|(c, r)| self.cell(c, r))
    }

    /// Index of the slot containing `v`, corrected against the exact edges so
    /// rounding in the division never disagrees with `cell()` bounds.
    fn snap(&self, v: f64, count: u32, edge: impl Fn(u32) -> f64) -> u32 {
        let origin = edge(0);
        let raw = ((v - origin) / self.config.resolution_deg).floor();
        let mut idx = raw.clamp(0.0, (count - 1) as f64) as u32;
        while idx > 0 && v < edge(idx) {
            idx -= 1;
        }
        while idx + 1 < count && v >= edge(idx + 1) {
            idx += 1;
        }
        idx
    }

    /// Inclusive column range overlapping `[lo, hi]`.
    fn col_span(&self, lo: f64, hi: f64) -> Option<(u32, u32)> {
        let cov = self.coverage();
        if hi < cov.min_lon || lo > cov.max_lon {
            return None;
        }
        let lo = lo.max(cov.min_lon);
        let hi = hi.min(cov.max_lon);
        Some((
            self.snap(lo, self.cols, |c| self.lon_edge(c)),
            self.snap(hi, self.cols, |c| self.lon_edge(c)),
        ))
    }

    /// Inclusive row range overlapping `[lo, hi]`.
    fn row_span(&self, lo: f64, hi: f64) -> Option<(u32, u32)> {
        let cov = self.coverage();
        if hi < cov.min_lat || lo > cov.max_lat {
            return None;
        }
        let lo = lo.max(cov.min_lat);
        let hi = hi.min(cov.max_lat);
        Some((
            self.snap(lo, self.rows, |r| self.lat_edge(r)),
            self.snap(hi, self.rows, |r| self.lat_edge(r)),
        ))
    }

    /// Cells whose bounds intersect `bbox`, in (row, col) order.
    pub fn cells_overlapping(&self, bbox: &BoundingBox) -> Vec<GridCell> {
        let (Some((c0, c1)), Some((r0, r1))) = (
            self.col_span(bbox.min_lon, bbox.max_lon),
            self.row_span(bbox.min_lat, bbox.max_lat),
        ) else {
            return Vec::new();
        };
        let mut cells = Vec::with_capacity(((c1 - c0 + 1) * (r1 - r0 + 1)) as usize);
        for row in r0..=r1 {
            for col in c0..=c1 {
                if let Some(cell) = self.cell(col, row) {
                    cells.push(cell);
                }
            }
        }
        cells
    }

    pub fn stats(&self) -> AssignmentStats {
        AssignmentStats {
            outside_extent: self.outside_extent.load(Ordering::Relaxed),
            partially_outside: self.partially_outside.load(Ordering::Relaxed),
        }
    }

    /// Assign a normalized record to the cells and time buckets it touches.
    pub fn assign_record(&self, record: &NormalizedRecord) -> Vec<CellAssignment> {
        self.assign(record.geometry(), record.temporal())
    }

    /// Assign a geometry to cells.
    ///
    /// Track weights over all cells sum to 1 when the track is fully inside
    /// the grid; a track crossing several buckets is split by interpolated
    /// time. Geometries entirely outside the grid yield nothing and bump the
    /// skip counter.
    pub fn assign(&self, geometry: RecordGeometry<'_>, temporal: Temporal) -> Vec<CellAssignment> {
        let mut acc = Accumulator::default();
        let complete = match geometry {
            RecordGeometry::Point(p) => self.assign_point(p, temporal, &mut acc),
            RecordGeometry::Line(line) => self.assign_line(&line.0, temporal, &mut acc),
            RecordGeometry::Area(area) => self.assign_area(area, temporal, &mut acc),
            RecordGeometry::Cell(rect) => self.assign_rect(rect, temporal, &mut acc),
        };

        let assignments = acc.finish(self);
        if assignments.is_empty() {
            self.outside_extent.fetch_add(1, Ordering::Relaxed);
        } else if !complete {
            self.partially_outside.fetch_add(1, Ordering::Relaxed);
        }
        assignments
    }

    fn fixed_bucket(&self, temporal: Temporal) -> Option<TimeBucket> {
        match temporal {
            Temporal::Instant(at) => Some(self.config.time_bucket.bucket_of(at)),
            Temporal::Span { start, .. } => Some(self.config.time_bucket.bucket_of(start)),
            Temporal::Static => None,
        }
    }

    fn assign_point(&self, p: &Point<f64>, temporal: Temporal, acc: &mut Accumulator) -> bool {
        match self.locate(p.x(), p.y()) {
            Some((col, row)) => {
                acc.add(self.fixed_bucket(temporal), col, row, 1.0);
                true
            }
            None => false,
        }
    }

    fn assign_line(&self, coords: &[Coord<f64>], temporal: Temporal, acc: &mut Accumulator) -> bool {
        let lengths: Vec<f64> = coords
            .windows(2)
            .map(|w| Point::from(w[0]).haversine_distance(&Point::from(w[1])))
            .collect();
        let total: f64 = lengths.iter().sum();

        if coords.is_empty() {
            return false;
        }
        if !(total > 0.0) {
            return self.assign_point(&Point::from(coords[0]), temporal, acc);
        }

        let mut assigned = 0.0;
        let mut walked = 0.0;
        for (w, &len) in coords.windows(2).zip(&lengths) {
            if len > 0.0 {
                let (a, b) = (w[0], w[1]);
                let cols = self.col_span(a.x.min(b.x), a.x.max(b.x));
                let rows = self.row_span(a.y.min(b.y), a.y.max(b.y));
                if let (Some((c0, c1)), Some((r0, r1))) = (cols, rows) {
                    for row in r0..=r1 {
                        for col in c0..=c1 {
                            let Some(cell) = self.cell(col, row) else {
                                continue;
                            };
                            let Some((t0, t1)) = clip_segment(a, b, &cell.bounds) else {
                                continue;
                            };
                            let weight = (t1 - t0) * len / total;
                            let along = (walked + 0.5 * (t0 + t1) * len) / total;
                            let bucket = self.bucket_along(temporal, along);
                            acc.add(bucket, col, row, weight);
                            assigned += weight;
                        }
                    }
                }
            }
            walked += len;
        }
        (1.0 - assigned).abs() < 1e-9
    }

    /// Bucket at fraction `along` of a span, linearly interpolated in time.
    fn bucket_along(&self, temporal: Temporal, along: f64) -> Option<TimeBucket> {
        match temporal {
            Temporal::Span { start, end } if end > start => {
                let at = interpolate(start, end, along);
                Some(self.config.time_bucket.bucket_of(at))
            }
            other => self.fixed_bucket(other),
        }
    }

    fn assign_area(&self, area: &MultiPolygon<f64>, temporal: Temporal, acc: &mut Accumulator) -> bool {
        let Some(rect) = area.bounding_rect() else {
            return false;
        };
        let bbox = BoundingBox::from_rect(&rect);
        let bucket = self.fixed_bucket(temporal);
        let total_area = area.unsigned_area();
        let mut covered = 0.0;

        for cell in self.cells_overlapping(&bbox) {
            if !cell.bounds.overlaps(&bbox) {
                continue;
            }
            let clip = MultiPolygon::new(vec![cell.polygon()]);
            let inter = area.intersection(&clip).unsigned_area();
            if inter <= 0.0 {
                continue;
            }
            covered += inter;
            let weight = (inter / cell.bounds.area()).min(1.0);
            acc.add(bucket, cell.col, cell.row, weight);
        }
        total_area > 0.0 && (covered - total_area).abs() <= total_area * 1e-9
    }

    fn assign_rect(&self, rect: &Rect<f64>, temporal: Temporal, acc: &mut Accumulator) -> bool {
        let bbox = BoundingBox::from_rect(rect);
        let bucket = self.fixed_bucket(temporal);
        let mut covered = 0.0;
        for cell in self.cells_overlapping(&bbox) {
            let overlap = cell.bounds.overlap_area(&bbox);
            if overlap <= 0.0 {
                continue;
            }
            covered += overlap;
            acc.add(bucket, cell.col, cell.row, (overlap / cell.bounds.area()).min(1.0));
        }
        let total = bbox.area();
        total > 0.0 && (covered - total).abs() <= total * 1e-9
    }
}

fn interpolate(start: DateTime<Utc>, end: DateTime<Utc>, along: f64) -> DateTime<Utc> {
    let span_ms = (end - start).num_milliseconds() as f64;
    let offset = (span_ms * along.clamp(0.0, 1.0)).round() as i64;
    start + Duration::milliseconds(offset)
}

/// Merges pieces that land in the same (bucket, cell) and keeps output order
/// deterministic.
#[derive(Default)]
struct Accumulator {
    weights: BTreeMap<(Option<TimeBucket>, u32, u32), f64>,
}

impl Accumulator {
    fn add(&mut self, bucket: Option<TimeBucket>, col: u32, row: u32, weight: f64) {
        *self.weights.entry((bucket, row, col)).or_insert(0.0) += weight;
    }

    fn finish(self, index: &SpatialGridIndex) -> Vec<CellAssignment> {
        self.weights
            .into_iter()
            .filter(|(_, w)| *w > MIN_WEIGHT)
            .filter_map(|((time_bucket, row, col), weight)| {
                index.cell(col, row).map(|cell| CellAssignment {
                    cell,
                    time_bucket,
                    weight,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use geo::{line_string, point, polygon};

    fn unit_grid() -> SpatialGridIndex {
        SpatialGridIndex::new(GridConfig {
            extent: BoundingBox::new(0.0, 0.0, 4.0, 4.0).unwrap(),
            resolution_deg: 1.0,
            time_bucket: TimeBucketSize::Day,
        })
        .unwrap()
    }

    fn day(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, 0, 0).unwrap()
    }

    #[test]
    fn cells_share_edges() {
        let grid = unit_grid();
        let a = grid.cell(0, 0).unwrap();
        let b = grid.cell(1, 0).unwrap();
        assert_eq!(a.bounds.max_lon, b.bounds.min_lon);
        assert!(grid.cell(4, 0).is_none());
        assert_eq!(grid.cell_count(), 16);
    }

    #[test]
    fn point_lands_in_single_cell() {
        let grid = unit_grid();
        let p = point!(x: 2.5, y: 1.5);
        let out = grid.assign(RecordGeometry::Point(&p), Temporal::Instant(day(1, 12)));
        assert_eq!(out.len(), 1);
        assert_eq!((out[0].cell.col, out[0].cell.row), (2, 1));
        assert_eq!(out[0].weight, 1.0);
        assert!(out[0].time_bucket.is_some());
    }

    #[test]
    fn point_on_shared_edge_goes_east() {
        let grid = unit_grid();
        assert_eq!(grid.locate(1.0, 0.5), Some((1, 0)));
        assert_eq!(grid.locate(4.0, 0.5), None);
    }

    #[test]
    fn outside_point_is_counted() {
        let grid = unit_grid();
        let p = point!(x: 10.0, y: 10.0);
        assert!(grid.assign(RecordGeometry::Point(&p), Temporal::Static).is_empty());
        assert_eq!(grid.stats().outside_extent, 1);
    }

    #[test]
    fn track_weights_partition_to_one() {
        let grid = unit_grid();
        let line = line_string![(x: 0.2, y: 0.3), (x: 2.7, y: 3.1), (x: 3.9, y: 0.5)];
        let out = grid.assign(
            RecordGeometry::Line(&line),
            Temporal::Span {
                start: day(1, 1),
                end: day(1, 2),
            },
        );
        let sum: f64 = out.iter().map(|a| a.weight).sum();
        assert!((sum - 1.0).abs() < 1e-9, "sum = {sum}");
        assert!(out.len() > 3);
        assert_eq!(grid.stats(), AssignmentStats::default());
    }

    #[test]
    fn track_spanning_midnight_splits_buckets() {
        let grid = unit_grid();
        let line = line_string![(x: 0.5, y: 0.5), (x: 0.5, y: 0.9)];
        let out = grid.assign(
            RecordGeometry::Line(&line),
            Temporal::Span {
                start: day(1, 23),
                end: day(2, 1),
            },
        );
        // a piece inside one cell takes the bucket of its midpoint
        assert_eq!(out.len(), 1);
        let line = line_string![(x: 0.5, y: 0.5), (x: 0.5, y: 1.5)];
        let out = grid.assign(
            RecordGeometry::Line(&line),
            Temporal::Span {
                start: day(1, 23),
                end: day(2, 1),
            },
        );
        assert_eq!(out.len(), 2);
        assert_ne!(out[0].time_bucket, out[1].time_bucket);
    }

    #[test]
    fn zero_length_track_is_a_point() {
        let grid = unit_grid();
        let line = line_string![(x: 1.5, y: 1.5), (x: 1.5, y: 1.5)];
        let out = grid.assign(
            RecordGeometry::Line(&line),
            Temporal::Span {
                start: day(1, 1),
                end: day(1, 1),
            },
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].weight, 1.0);
    }

    #[test]
    fn polygon_area_fraction() {
        let grid = unit_grid();
        let zone = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 1.5, y: 0.0),
            (x: 1.5, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ]]);
        let out = grid.assign(RecordGeometry::Area(&zone), Temporal::Static);
        assert_eq!(out.len(), 2);
        assert!((out[0].weight - 1.0).abs() < 1e-9);
        assert!((out[1].weight - 0.5).abs() < 1e-9);
        assert!(out.iter().all(|a| a.time_bucket.is_none()));
    }

    #[test]
    fn raster_cell_overlap() {
        let grid = unit_grid();
        let rect = Rect::new(Coord { x: 0.5, y: 0.5 }, Coord { x: 1.5, y: 1.5 });
        let out = grid.assign(RecordGeometry::Cell(&rect), Temporal::Static);
        assert_eq!(out.len(), 4);
        for a in &out {
            assert!((a.weight - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn partially_outside_track_is_flagged() {
        let grid = unit_grid();
        let line = line_string![(x: 3.5, y: 0.5), (x: 4.5, y: 0.5)];
        let out = grid.assign(RecordGeometry::Line(&line), Temporal::Static);
        assert_eq!(out.len(), 1);
        assert!(out[0].weight < 0.6);
        assert_eq!(grid.stats().partially_outside, 1);
    }
}
