use crate::{resolve_version, select_revisions, Result, RiskStore};
use marine_risk_types::{RiskQuery, RiskRecord, ScoringVersion};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// (time bucket, cell id, append sequence)
type RecordKey = (i64, u64, u64);

#[derive(Default)]
struct Inner {
    records: BTreeMap<ScoringVersion, BTreeMap<RecordKey, RiskRecord>>,
    versions: Vec<ScoringVersion>,
    latest: Option<ScoringVersion>,
}

/// In-memory backend for tests and one-shot runs.
#[derive(Default)]
pub struct MemoryRiskStore {
    inner: RwLock<Inner>,
    seq: AtomicU64,
}

impl MemoryRiskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RiskStore for MemoryRiskStore {
    fn upsert(&self, record: RiskRecord) -> Result<()> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let key = (record.time_bucket.0, record.cell_id.0, seq);
        let version = record.scoring_version.clone();

        let mut inner = self.inner.write();
        if !inner.versions.contains(&version) {
            inner.versions.push(version.clone());
        }
        inner.latest = Some(version.clone());
        inner.records.entry(version).or_default().insert(key, record);
        Ok(())
    }

    fn query(&self, query: &RiskQuery) -> Result<Vec<RiskRecord>> {
        let Some(version) = resolve_version(self, &query.version)? else {
            return Ok(Vec::new());
        };
        let matching: Vec<RiskRecord> = {
            let inner = self.inner.read();
            match inner.records.get(&version) {
                Some(records) => records
                    .values()
                    .filter(|r| query.matches(r))
                    .cloned()
                    .collect(),
                None => Vec::new(),
            }
        };
        Ok(select_revisions(matching, query.revisions))
    }

    fn versions(&self) -> Result<Vec<ScoringVersion>> {
        Ok(self.inner.read().versions.clone())
    }

    fn latest_version(&self) -> Result<Option<ScoringVersion>> {
        Ok(self.inner.read().latest.clone())
    }

    fn len(&self) -> Result<u64> {
        Ok(self
            .inner
            .read()
            .records
            .values()
            .map(|r| r.len() as u64)
            .sum())
    }
}
