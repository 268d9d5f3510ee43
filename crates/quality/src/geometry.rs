//! Structural geometry checks.

use geo::line_intersection::line_intersection;
use geo::{Coord, Line, LineString, Polygon};
use marine_risk_types::{BoundingBox, RecordGeometry};

fn valid_coord(c: &Coord<f64>) -> bool {
    c.x.is_finite() && c.y.is_finite() && (-180.0..=180.0).contains(&c.x) && (-90.0..=90.0).contains(&c.y)
}

/// Whether a closed ring crosses or touches itself anywhere other than at
/// the shared vertex of neighbouring edges.
fn ring_self_intersects(ring: &LineString<f64>) -> bool {
    let edges: Vec<Line<f64>> = ring.lines().collect();
    let n = edges.len();
    (0..n).any(|i| {
        ((i + 1)..n)
            .filter(|&j| !(j == i + 1 || (i == 0 && j == n - 1)))
            .any(|j| line_intersection(edges[i], edges[j]).is_some())
    })
}

fn check_ring(ring: &LineString<f64>, what: &str) -> Result<(), String> {
    if ring.0.len() < 4 {
        return Err(format!("{what} has fewer than 4 positions"));
    }
    if !ring.0.iter().all(valid_coord) {
        return Err(format!("{what} has an invalid coordinate"));
    }
    if !ring.is_closed() {
        return Err(format!("{what} is not closed"));
    }
    if ring_self_intersects(ring) {
        return Err(format!("{what} self-intersects"));
    }
    Ok(())
}

fn check_polygon(polygon: &Polygon<f64>, index: usize) -> Result<(), String> {
    check_ring(polygon.exterior(), &format!("polygon {index} exterior"))?;
    for (k, interior) in polygon.interiors().iter().enumerate() {
        check_ring(interior, &format!("polygon {index} hole {k}"))?;
    }
    Ok(())
}

/// Structural validity: finite in-range coordinates, enough vertices,
/// non-degenerate extents and no self-intersecting rings.
pub fn check_geometry(geometry: RecordGeometry<'_>) -> Result<(), String> {
    match geometry {
        RecordGeometry::Point(p) => {
            if valid_coord(&p.0) {
                Ok(())
            } else {
                Err("point coordinate out of range".into())
            }
        }
        RecordGeometry::Line(line) => {
            if line.0.len() < 2 {
                return Err("track has fewer than 2 positions".into());
            }
            if line.0.iter().all(valid_coord) {
                Ok(())
            } else {
                Err("track coordinate out of range".into())
            }
        }
        RecordGeometry::Area(area) => {
            if area.0.is_empty() {
                return Err("empty multipolygon".into());
            }
            area.0
                .iter()
                .enumerate()
                .try_for_each(|(i, polygon)| check_polygon(polygon, i))
        }
        RecordGeometry::Cell(rect) => {
            if !valid_coord(&rect.min()) || !valid_coord(&rect.max()) {
                return Err("raster cell out of range".into());
            }
            if rect.width() <= 0.0 || rect.height() <= 0.0 {
                return Err("raster cell has no area".into());
            }
            Ok(())
        }
    }
}

/// Whether every coordinate of the geometry lies inside `extent`.
pub fn within_extent(geometry: RecordGeometry<'_>, extent: &BoundingBox) -> bool {
    let inside = |c: &Coord<f64>| extent.contains(c.x, c.y);
    match geometry {
        RecordGeometry::Point(p) => inside(&p.0),
        RecordGeometry::Line(line) => line.0.iter().all(inside),
        RecordGeometry::Area(area) => area
            .0
            .iter()
            .all(|p| p.exterior().0.iter().all(inside)),
        RecordGeometry::Cell(rect) => inside(&rect.min()) && inside(&rect.max()),
    }
}
