//! Behaviour shared by every store backend.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use marine_risk_storage::{MemoryRiskStore, RiskStore, SledRiskStore};
use marine_risk_types::{
    BoundingBox, CellId, DateRange, RiskQuery, RiskRecord, ScoringVersion, TimeBucket,
    TimeBucketSize,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

fn record(col: i32, day: u32, score: f64, version: &str) -> RiskRecord {
    let bounds = BoundingBox::new(
        -70.0 + col as f64 * 0.1,
        41.0,
        -70.0 + (col + 1) as f64 * 0.1,
        41.1,
    )
    .unwrap();
    let start = Utc.from_utc_datetime(&date(day).and_hms_opt(0, 0, 0).unwrap());
    let [lon, lat] = [
        (bounds.min_lon + bounds.max_lon) / 2.0,
        (bounds.min_lat + bounds.max_lat) / 2.0,
    ];
    RiskRecord {
        cell_id: CellId::from_bounds(&bounds),
        time_bucket: TimeBucketSize::Day.bucket_of(start),
        bucket_start: start,
        bucket_end: start + Duration::days(1),
        cell_bounds: bounds,
        centroid: [lon, lat],
        score,
        confidence: 0.5,
        coverage: 0.5,
        degraded: false,
        features: BTreeMap::new(),
        scoring_version: ScoringVersion::new(version),
        computed_at: Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap(),
    }
}

fn whole_area(from: u32, to: u32) -> RiskQuery {
    RiskQuery::new(
        BoundingBox::new(-71.0, 40.0, -69.0, 42.0).unwrap(),
        DateRange::new(date(from), date(to)).unwrap(),
    )
}

fn append_only(store: &dyn RiskStore) {
    store.upsert(record(0, 1, 0.2, "v1")).unwrap();
    store.upsert(record(0, 1, 0.7, "v1")).unwrap();

    let all = store.query(&whole_area(1, 1)).unwrap();
    let scores: Vec<f64> = all.iter().map(|r| r.score).collect();
    assert_eq!(scores, vec![0.2, 0.7]);

    let latest = store.query(&whole_area(1, 1).latest_revision_only()).unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].score, 0.7);
    assert_eq!(store.len().unwrap(), 2);
}

fn ordered_by_bucket_then_cell(store: &dyn RiskStore) {
    let mut expected = Vec::new();
    for day in [3, 1, 2] {
        for col in [4, 0, 9] {
            let r = record(col, day, 0.1, "v1");
            expected.push((r.time_bucket, r.cell_id));
            store.upsert(r).unwrap();
        }
    }
    expected.sort();

    let got: Vec<(TimeBucket, CellId)> = store
        .query(&whole_area(1, 3))
        .unwrap()
        .iter()
        .map(|r| (r.time_bucket, r.cell_id))
        .collect();
    assert_eq!(got, expected);
}

fn filters_by_box_and_dates(store: &dyn RiskStore) {
    store.upsert(record(0, 1, 0.1, "v1")).unwrap();
    store.upsert(record(5, 1, 0.1, "v1")).unwrap();
    store.upsert(record(0, 3, 0.1, "v1")).unwrap();

    let west = RiskQuery::new(
        BoundingBox::new(-70.05, 41.0, -69.95, 41.1).unwrap(),
        DateRange::new(date(1), date(2)).unwrap(),
    );
    let hits = store.query(&west).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].bucket_start.date_naive(), date(1));

    // partial coverage: days without records are simply absent
    assert!(store.query(&whole_area(10, 12)).unwrap().is_empty());
}

fn versions_coexist(store: &dyn RiskStore) {
    assert_eq!(store.latest_version().unwrap(), None);
    assert!(store.query(&whole_area(1, 1)).unwrap().is_empty());

    store.upsert(record(0, 1, 0.2, "baseline/1")).unwrap();
    store.upsert(record(0, 1, 0.9, "gbdt/2")).unwrap();
    store.upsert(record(1, 1, 0.3, "baseline/1")).unwrap();

    assert_eq!(
        store.versions().unwrap(),
        vec![ScoringVersion::new("baseline/1"), ScoringVersion::new("gbdt/2")]
    );
    assert_eq!(
        store.latest_version().unwrap(),
        Some(ScoringVersion::new("baseline/1"))
    );

    let gbdt = store
        .query(&whole_area(1, 1).with_version(ScoringVersion::new("gbdt/2")))
        .unwrap();
    assert_eq!(gbdt.len(), 1);
    assert_eq!(gbdt[0].score, 0.9);
    assert_eq!(store.query(&whole_area(1, 1)).unwrap().len(), 2);
}

fn concurrent_appends(store: Arc<dyn RiskStore>) {
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = store.clone();
            std::thread::spawn(move || {
                for col in 0..10 {
                    store.upsert(record(worker * 10 + col, 1, 0.5, "v1")).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let query = RiskQuery::new(
        BoundingBox::new(-71.0, 40.0, -60.0, 42.0).unwrap(),
        DateRange::new(date(1), date(1)).unwrap(),
    );
    assert_eq!(store.query(&query).unwrap().len(), 40);
}

fn sled_store() -> (TempDir, SledRiskStore) {
    let dir = TempDir::new().unwrap();
    let store = SledRiskStore::open(dir.path()).unwrap();
    (dir, store)
}

macro_rules! backend_suite {
    ($($name:ident),* $(,)?) => {
        mod memory {
            use super::*;
            $(
                #[test]
                fn $name() {
                    super::$name(&MemoryRiskStore::new());
                }
            )*
        }

        mod sled_backend {
            use super::*;
            $(
                #[test]
                fn $name() {
                    let (_dir, store) = sled_store();
                    super::$name(&store);
                }
            )*
        }
    };
}

backend_suite!(
    append_only,
    ordered_by_bucket_then_cell,
    filters_by_box_and_dates,
    versions_coexist,
);

#[test]
fn memory_store_accepts_concurrent_appends() {
    concurrent_appends(Arc::new(MemoryRiskStore::new()));
}

#[test]
fn sled_store_accepts_concurrent_appends() {
    let (_dir, store) = sled_store();
    concurrent_appends(Arc::new(store));
}

#[test]
fn sled_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = SledRiskStore::open(dir.path()).unwrap();
        store.upsert(record(0, 1, 0.4, "v1")).unwrap();
        store.upsert(record(0, 1, 0.6, "v2")).unwrap();
        store.flush().unwrap();
    }
    let store = SledRiskStore::open(dir.path()).unwrap();
    assert_eq!(store.len().unwrap(), 2);
    assert_eq!(store.latest_version().unwrap(), Some(ScoringVersion::new("v2")));
    assert_eq!(
        store.versions().unwrap(),
        vec![ScoringVersion::new("v1"), ScoringVersion::new("v2")]
    );
    let records = store.query(&whole_area(1, 1)).unwrap();
    let expected = record(0, 1, 0.6, "v2");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key(), expected.key());
    assert_eq!(records[0].score, 0.6);
    assert_eq!(records[0].computed_at, expected.computed_at);
}
