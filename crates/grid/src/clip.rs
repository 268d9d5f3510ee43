//! Segment clipping against axis-aligned cells (Liang-Barsky).
//!
//! Cells are treated as half-open on their max edges so a segment running
//! exactly along a shared edge lands in exactly one cell.

use geo::Coord;
use marine_risk_types::BoundingBox;

/// Parametric interval `[t0, t1]` of segment `a -> b` inside `cell`, or `None`
/// when the overlap has zero length.
pub(crate) fn clip_segment(a: Coord<f64>, b: Coord<f64>, cell: &BoundingBox) -> Option<(f64, f64)> {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;

    // (p, q, is_max_edge)
    let constraints = [
        (-dx, a.x - cell.min_lon, false),
        (dx, cell.max_lon - a.x, true),
        (-dy, a.y - cell.min_lat, false),
        (dy, cell.max_lat - a.y, true),
    ];

    for (p, q, is_max_edge) in constraints {
        if p == 0.0 {
            let outside = if is_max_edge { q <= 0.0 } else { q < 0.0 };
            if outside {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            if r > t0 {
                t0 = r;
            }
        } else {
            if r < t0 {
                return None;
            }
            if r < t1 {
                t1 = r;
            }
        }
    }

    if t1 > t0 {
        Some((t0, t1))
    } else {
        None
    }
}
