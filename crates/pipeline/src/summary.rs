//! Run-level result returned alongside the stored records.

use marine_risk_types::{CellKey, ScoringVersion};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Finished, but the violation rate exceeded the degraded ceiling; every
    /// record of the run carries reduced confidence.
    Degraded,
    /// Halted before scoring.
    Failed,
    /// Stopped dispatching on request; dispatched work was persisted.
    Cancelled,
}

/// What happened to one cell-time in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellOutcome {
    /// A record was stored; its score may well be low.
    Scored,
    /// No input data touched the cell-time.
    NoData,
    Failed(String),
    NotDispatched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedCell {
    pub key: CellKey,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub scoring_version: ScoringVersion,
    pub records_read: u64,
    pub records_normalized: u64,
    pub records_rejected: u64,
    pub records_skipped_nodata: u64,
    pub skipped_outside_extent: u64,
    pub input_violations: u64,
    pub output_violations: u64,
    pub violations_by_reason: BTreeMap<String, u64>,
    pub violation_rate: f64,
    pub cells_scored: u64,
    pub cells_degraded: u64,
    pub failed_cells: Vec<FailedCell>,
    pub cells_not_dispatched: u64,
    /// Why a failed run stopped.
    pub failure: Option<String>,
    #[serde(skip)]
    scored: BTreeSet<CellKey>,
    #[serde(skip)]
    not_dispatched: BTreeSet<CellKey>,
}

impl RunSummary {
    pub(crate) fn new(run_id: Uuid, scoring_version: ScoringVersion) -> Self {
        Self {
            run_id,
            status: RunStatus::Completed,
            scoring_version,
            records_read: 0,
            records_normalized: 0,
            records_rejected: 0,
            records_skipped_nodata: 0,
            skipped_outside_extent: 0,
            input_violations: 0,
            output_violations: 0,
            violations_by_reason: BTreeMap::new(),
            violation_rate: 0.0,
            cells_scored: 0,
            cells_degraded: 0,
            failed_cells: Vec::new(),
            cells_not_dispatched: 0,
            failure: None,
            scored: BTreeSet::new(),
            not_dispatched: BTreeSet::new(),
        }
    }

    pub(crate) fn mark_scored(&mut self, key: CellKey, degraded: bool) {
        self.scored.insert(key);
        self.cells_scored += 1;
        if degraded {
            self.cells_degraded += 1;
        }
    }

    pub(crate) fn mark_failed(&mut self, key: CellKey, reason: String) {
        self.failed_cells.push(FailedCell { key, reason });
    }

    pub(crate) fn mark_not_dispatched(&mut self, key: CellKey) {
        self.not_dispatched.insert(key);
        self.cells_not_dispatched += 1;
    }

    pub(crate) fn add_violations(&mut self, by_rule: &BTreeMap<String, u64>) {
        for (rule, count) in by_rule {
            *self.violations_by_reason.entry(rule.clone()).or_insert(0) += count;
        }
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.failure = Some(reason.into());
    }

    /// Distinguishes a scored cell-time from one without data and from one
    /// whose computation failed.
    pub fn outcome(&self, key: &CellKey) -> CellOutcome {
        if self.scored.contains(key) {
            return CellOutcome::Scored;
        }
        if let Some(failed) = self.failed_cells.iter().find(|f| f.key == *key) {
            return CellOutcome::Failed(failed.reason.clone());
        }
        if self.not_dispatched.contains(key) {
            return CellOutcome::NotDispatched;
        }
        CellOutcome::NoData
    }

    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::Failed
    }
}
