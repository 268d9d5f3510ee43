use crate::{resolve_version, select_revisions, Result, RiskStore, StorageError};
use marine_risk_types::{RiskQuery, RiskRecord, ScoringVersion};
use sled::{Db, Tree};
use std::path::Path;
use tracing::{debug, info};

const LATEST_VERSION: &[u8] = b"latest_version";

/// Sled-backed implementation
///
/// Record keys are `len(version) | version | bucket | cell | seq`, all
/// big-endian, with the bucket's sign bit flipped so that a prefix scan per
/// version yields (bucket, cell, append order). Values are JSON.
pub struct SledRiskStore {
    db: Db,
    records: Tree,
    versions: Tree,
    metadata: Tree,
}

impl SledRiskStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        let records = db.open_tree("risk_records")?;
        let versions = db.open_tree("versions")?;
        let metadata = db.open_tree("metadata")?;
        info!(path = %path.display(), records = records.len(), "opened risk store");
        Ok(Self {
            db,
            records,
            versions,
            metadata,
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn version_prefix(version: &ScoringVersion) -> Vec<u8> {
    let bytes = version.as_str().as_bytes();
    let mut prefix = Vec::with_capacity(2 + bytes.len());
    prefix.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    prefix.extend_from_slice(bytes);
    prefix
}

fn record_key(record: &RiskRecord, seq: u64) -> Vec<u8> {
    let mut key = version_prefix(&record.scoring_version);
    let bucket = (record.time_bucket.0 as u64) ^ (1 << 63);
    key.extend_from_slice(&bucket.to_be_bytes());
    key.extend_from_slice(&record.cell_id.0.to_be_bytes());
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

fn decode_seq(value: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = value
        .try_into()
        .map_err(|_| StorageError::Corrupt(format!("sequence of {} bytes", value.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

impl RiskStore for SledRiskStore {
    fn upsert(&self, record: RiskRecord) -> Result<()> {
        let seq = self.db.generate_id()?;
        let version = record.scoring_version.as_str().as_bytes().to_vec();
        let data = serde_json::to_vec(&record)?;
        self.records.insert(record_key(&record, seq), data)?;

        // Only the first append of a version records its position.
        let _ = self
            .versions
            .compare_and_swap(&version, None as Option<&[u8]>, Some(&seq.to_be_bytes()[..]))?;
        self.metadata.insert(LATEST_VERSION, version)?;
        debug!(key = %record.key(), version = %record.scoring_version, seq, "appended risk record");
        Ok(())
    }

    fn query(&self, query: &RiskQuery) -> Result<Vec<RiskRecord>> {
        let Some(version) = resolve_version(self, &query.version)? else {
            return Ok(Vec::new());
        };
        let mut matching = Vec::new();
        for entry in self.records.scan_prefix(version_prefix(&version)) {
            let (_, value) = entry?;
            let record: RiskRecord = serde_json::from_slice(&value)?;
            if query.matches(&record) {
                matching.push(record);
            }
        }
        Ok(select_revisions(matching, query.revisions))
    }

    fn versions(&self) -> Result<Vec<ScoringVersion>> {
        let mut versions = Vec::new();
        for entry in self.versions.iter() {
            let (name, seq) = entry?;
            let name = String::from_utf8(name.to_vec())
                .map_err(|e| StorageError::Corrupt(format!("version tag: {e}")))?;
            versions.push((decode_seq(&seq)?, ScoringVersion::new(name)));
        }
        versions.sort();
        Ok(versions.into_iter().map(|(_, v)| v).collect())
    }

    fn latest_version(&self) -> Result<Option<ScoringVersion>> {
        self.metadata
            .get(LATEST_VERSION)?
            .map(|v| {
                String::from_utf8(v.to_vec())
                    .map(ScoringVersion::new)
                    .map_err(|e| StorageError::Corrupt(format!("latest version: {e}")))
            })
            .transpose()
    }

    fn len(&self) -> Result<u64> {
        Ok(self.records.len() as u64)
    }
}
