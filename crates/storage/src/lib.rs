//! Risk record storage.
//!
//! Records are append-only: every `upsert` adds a new revision, even for a
//! (cell, bucket, version) that already has one. Queries return records
//! ordered by time bucket, then cell id, then append order.

use marine_risk_types::{RevisionSelector, RiskQuery, RiskRecord, ScoringVersion, VersionSelector};

mod memory;
mod persistent;

pub use memory::MemoryRiskStore;
pub use persistent::SledRiskStore;

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Stored bytes do not decode to the expected layout
    #[error("Corrupt entry: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Append-safe store shared by all pipeline workers.
pub trait RiskStore: Send + Sync {
    /// Append a record. Never replaces an earlier revision.
    fn upsert(&self, record: RiskRecord) -> Result<()>;

    /// Records matching the query's box and dates for the selected version.
    /// Cells without a record are absent, never reported as zero risk.
    fn query(&self, query: &RiskQuery) -> Result<Vec<RiskRecord>>;

    /// Stored scoring versions in the order they were first written.
    fn versions(&self) -> Result<Vec<ScoringVersion>>;

    /// The most recently written scoring version.
    fn latest_version(&self) -> Result<Option<ScoringVersion>>;

    fn len(&self) -> Result<u64>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Resolve a version selector against a store.
pub(crate) fn resolve_version(
    store: &dyn RiskStore,
    selector: &VersionSelector,
) -> Result<Option<ScoringVersion>> {
    match selector {
        VersionSelector::Exact(version) => Ok(Some(version.clone())),
        VersionSelector::Latest => store.latest_version(),
    }
}

/// Apply the revision selector to records already sorted by
/// (bucket, cell, append order).
pub(crate) fn select_revisions(
    records: Vec<RiskRecord>,
    revisions: RevisionSelector,
) -> Vec<RiskRecord> {
    match revisions {
        RevisionSelector::All => records,
        RevisionSelector::Latest => {
            let mut out: Vec<RiskRecord> = Vec::with_capacity(records.len());
            for record in records {
                match out.last_mut() {
                    Some(last) if last.key() == record.key() => *last = record,
                    _ => out.push(record),
                }
            }
            out
        }
    }
}
