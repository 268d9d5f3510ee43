use chrono::{Duration, TimeZone, Utc};
use geo::{Coord, LineString, HaversineDistance, Point};
use marine_risk_grid::{GridConfig, SpatialGridIndex};
use marine_risk_types::{BoundingBox, RecordGeometry, Temporal, TimeBucketSize};
use proptest::prelude::*;

fn test_grid() -> SpatialGridIndex {
    SpatialGridIndex::new(GridConfig {
        extent: BoundingBox::new(-71.0, 40.0, -69.0, 42.0).unwrap(),
        resolution_deg: 0.1,
        time_bucket: TimeBucketSize::Hour,
    })
    .unwrap()
}

fn inside_coord() -> impl Strategy<Value = Coord<f64>> {
    (-70.999f64..-69.001, 40.001f64..41.999).prop_map(|(x, y)| Coord { x, y })
}

fn track_strategy() -> impl Strategy<Value = LineString<f64>> {
    prop::collection::vec(inside_coord(), 2..8).prop_map(LineString::new)
}

#[test]
fn three_km_one_km_track_splits_three_to_one() {
    let grid = test_grid();
    // 1 km of latitude along a meridian
    let one_km_deg = (1_000.0 / 6_371_008.8f64).to_degrees();
    let edge = 40.1;
    let line = LineString::new(vec![
        Coord {
            x: -70.95,
            y: edge - 3.0 * one_km_deg,
        },
        Coord {
            x: -70.95,
            y: edge + one_km_deg,
        },
    ]);
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

    let out = grid.assign(
        RecordGeometry::Line(&line),
        Temporal::Span {
            start,
            end: start + Duration::minutes(10),
        },
    );

    assert_eq!(out.len(), 2);
    assert!(out[0].cell.bounds.max_lat <= out[1].cell.bounds.min_lat);
    assert!((out[0].weight - 0.75).abs() < 1e-9, "south = {}", out[0].weight);
    assert!((out[1].weight - 0.25).abs() < 1e-9, "north = {}", out[1].weight);

    let length = Point::new(-70.95, edge - 3.0 * one_km_deg)
        .haversine_distance(&Point::new(-70.95, edge + one_km_deg));
    assert!((length - 4_000.0).abs() < 1e-3);
}

proptest! {
    #[test]
    fn track_weights_sum_to_one(line in track_strategy(), minutes in 0i64..600) {
        let grid = test_grid();
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let temporal = Temporal::Span { start, end: start + Duration::minutes(minutes) };

        let out = grid.assign(RecordGeometry::Line(&line), temporal);
        let sum: f64 = out.iter().map(|a| a.weight).sum();
        prop_assert!((sum - 1.0).abs() < 1e-9, "weights sum to {}", sum);
        prop_assert!(out.iter().all(|a| a.weight > 0.0 && a.weight <= 1.0 + 1e-12));
    }
}

proptest! {
    #[test]
    fn assignment_is_deterministic(line in track_strategy()) {
        let grid = test_grid();
        let first = grid.assign(RecordGeometry::Line(&line), Temporal::Static);
        let second = grid.assign(RecordGeometry::Line(&line), Temporal::Static);
        prop_assert_eq!(first, second);
    }
}

proptest! {
    #[test]
    fn located_cell_contains_point(c in inside_coord()) {
        let grid = test_grid();
        let cell = grid.cell_at(c.x, c.y).unwrap();
        prop_assert!(cell.bounds.contains(c.x, c.y));
        prop_assert!(c.x < cell.bounds.max_lon && c.y < cell.bounds.max_lat);
    }
}
