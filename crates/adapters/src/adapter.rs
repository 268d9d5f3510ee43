//! The adapter contract and the lazy normalization stream.

use crate::batch::RawBatch;
use crate::config::AdapterLimits;
use crate::error::{AdapterError, Result};
use marine_risk_types::{NormalizedRecord, SourceKind};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of normalizing one raw row (or one derived unit such as a pair
/// of AIS positions).
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Record(NormalizedRecord),
    Rejected(Rejection),
    /// Explicit no-data value, neither a record nor a defect.
    Skipped,
}

/// A malformed row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub row: usize,
    pub reason: String,
}

impl Rejection {
    pub fn new(row: usize, reason: impl Into<String>) -> Self {
        Self {
            row,
            reason: reason.into(),
        }
    }
}

pub type RowStream<'a> = Box<dyn Iterator<Item = RowOutcome> + 'a>;

/// Per-source normalization into the common record shape.
///
/// `rows` must be restartable: calling it twice on the same batch yields
/// the same sequence.
pub trait DatasetAdapter: Send + Sync {
    type Row;

    fn source(&self) -> SourceKind;

    fn limits(&self) -> &AdapterLimits;

    fn rows<'a>(&'a self, batch: &'a RawBatch<Self::Row>) -> RowStream<'a>;

    /// Lazily normalize a batch, counting rejections and enforcing the batch
    /// timeout. The timeout clock starts before `rows` is called, so eager
    /// work an adapter does to set up its stream counts against it.
    fn normalize<'a>(&'a self, batch: &'a RawBatch<Self::Row>) -> Normalized<'a> {
        let started = Instant::now();
        Normalized::new(
            self.source(),
            batch.source_id.clone(),
            self.rows(batch),
            self.limits().clone(),
            started,
        )
    }
}

/// Counters for one normalized batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdapterStats {
    pub emitted: u64,
    pub rejected: u64,
    pub skipped_nodata: u64,
    pub timed_out: bool,
    pub rejection_reasons: Vec<Rejection>,
}

impl AdapterStats {
    pub fn examined(&self) -> u64 {
        self.emitted + self.rejected
    }

    pub fn rejection_rate(&self) -> f64 {
        match self.examined() {
            0 => 0.0,
            n => self.rejected as f64 / n as f64,
        }
    }
}

/// Lazy sequence of normalized records for one batch.
pub struct Normalized<'a> {
    source: SourceKind,
    source_id: String,
    inner: RowStream<'a>,
    limits: AdapterLimits,
    started: Instant,
    deadline: Instant,
    stats: AdapterStats,
}

impl<'a> Normalized<'a> {
    fn new(
        source: SourceKind,
        source_id: String,
        inner: RowStream<'a>,
        limits: AdapterLimits,
        started: Instant,
    ) -> Self {
        let deadline = started + limits.batch_timeout();
        Self {
            source,
            source_id,
            inner,
            limits,
            started,
            deadline,
            stats: AdapterStats::default(),
        }
    }

    /// Override the batch timeout, still measured from when normalization
    /// started.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.limits.batch_timeout_secs = timeout.as_secs();
        self.deadline = self.started + timeout;
        self
    }

    pub fn stats(&self) -> &AdapterStats {
        &self.stats
    }

    /// Drain the stream and fail if the rejection rate is above the
    /// configured threshold.
    pub fn collect_checked(mut self) -> Result<AdapterOutput> {
        let records: Vec<NormalizedRecord> = self.by_ref().collect();
        let stats = self.stats;

        info!(
            source = %self.source,
            source_id = %self.source_id,
            emitted = stats.emitted,
            rejected = stats.rejected,
            skipped_nodata = stats.skipped_nodata,
            timed_out = stats.timed_out,
            "batch normalized"
        );

        let rate = stats.rejection_rate();
        if rate > self.limits.max_rejection_rate {
            warn!(
                source = %self.source,
                source_id = %self.source_id,
                rate,
                threshold = self.limits.max_rejection_rate,
                "rejection rate above threshold"
            );
            return Err(AdapterError::RejectionRateExceeded {
                kind: self.source,
                source_id: self.source_id,
                rejected: stats.rejected,
                examined: stats.examined(),
                rate,
                threshold: self.limits.max_rejection_rate,
            });
        }

        Ok(AdapterOutput {
            source: self.source,
            source_id: self.source_id,
            records,
            stats,
        })
    }
}

impl Iterator for Normalized<'_> {
    type Item = NormalizedRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stats.timed_out {
            return None;
        }
        loop {
            if Instant::now() >= self.deadline {
                warn!(
                    source = %self.source,
                    source_id = %self.source_id,
                    timeout_secs = self.limits.batch_timeout_secs,
                    "batch normalization timed out"
                );
                self.stats.timed_out = true;
                return None;
            }
            match self.inner.next()? {
                RowOutcome::Record(record) => {
                    self.stats.emitted += 1;
                    return Some(record);
                }
                RowOutcome::Rejected(rejection) => {
                    debug!(
                        source = %self.source,
                        row = rejection.row,
                        reason = %rejection.reason,
                        "row rejected"
                    );
                    self.stats.rejected += 1;
                    self.stats.rejection_reasons.push(rejection);
                }
                RowOutcome::Skipped => self.stats.skipped_nodata += 1,
            }
        }
    }
}

/// Fully drained batch.
#[derive(Debug, Clone)]
pub struct AdapterOutput {
    pub source: SourceKind,
    pub source_id: String,
    pub records: Vec<NormalizedRecord>,
    pub stats: AdapterStats,
}
