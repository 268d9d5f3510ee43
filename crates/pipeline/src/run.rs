//! One pipeline run.
//!
//! adapters -> input contract -> grid assignment -> per cell-time
//! extraction -> output contract -> scoring -> store.
//!
//! Input validation runs before assignment so that only well-formed
//! geometry is clipped against the grid.

use crate::cancel::CancellationToken;
use crate::config::RunConfig;
use crate::error::{PipelineError, Result};
use crate::inputs::RunInputs;
use crate::summary::{RunStatus, RunSummary};
use chrono::{DateTime, Utc};
use marine_risk_adapters::{
    AdapterError, BathymetryAdapter, DatasetAdapter, ProtectedAreaAdapter, RawBatch,
    VesselTrackAdapter, WhaleSightingAdapter,
};
use marine_risk_features::{CellWindow, FeatureExtractor, WeightedRecord};
use marine_risk_grid::SpatialGridIndex;
use marine_risk_quality::{Contract, Validator, TIMEOUT_KEY};
use marine_risk_scoring::{score_checked, RiskScorer, ScorerRegistry};
use marine_risk_storage::RiskStore;
use marine_risk_types::{
    CellId, CellKey, FeatureVector, GridCell, NormalizedRecord, RiskRecord, ScoringVersion,
    SourceKind, TimeBucket,
};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Everything routed to one grid cell.
struct CellData {
    cell: GridCell,
    /// Tracks and sightings by the bucket they fall in.
    current: BTreeMap<TimeBucket, Vec<WeightedRecord>>,
    /// Sightings again, for the recency lookback of later buckets.
    sightings: Vec<(TimeBucket, WeightedRecord)>,
    /// Depth samples and protection zones.
    statics: Vec<WeightedRecord>,
}

impl CellData {
    fn new(cell: GridCell) -> Self {
        Self {
            cell,
            current: BTreeMap::new(),
            sightings: Vec::new(),
            statics: Vec::new(),
        }
    }
}

enum CellResult {
    Stored { degraded: bool },
    Failed(String),
    NotDispatched,
}

pub struct Pipeline {
    config: RunConfig,
    grid: SpatialGridIndex,
    extractor: FeatureExtractor,
    validator: Validator,
    scorer: Arc<dyn RiskScorer>,
    store: Arc<dyn RiskStore>,
}

impl Pipeline {
    /// Validate `config` and resolve its scorer from the built-in and
    /// configured models.
    pub fn new(config: RunConfig, store: Arc<dyn RiskStore>) -> Result<Self> {
        config.validate()?;
        let registry = ScorerRegistry::from_config(&config.scoring)?;
        Self::with_registry(config, store, &registry)
    }

    /// Like [`Pipeline::new`] with a caller-provided registry.
    pub fn with_registry(
        config: RunConfig,
        store: Arc<dyn RiskStore>,
        registry: &ScorerRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let scorer = registry.resolve(&ScoringVersion::new(config.scoring.version.as_str()))?;
        let grid = SpatialGridIndex::new(config.grid.clone())?;
        Ok(Self {
            extractor: FeatureExtractor::new(config.features.clone()),
            validator: Validator::new(config.quality.validation_timeout()),
            grid,
            scorer,
            store,
            config,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn scoring_version(&self) -> &ScoringVersion {
        self.scorer.version()
    }

    /// Execute one run. Configuration problems surface as errors; data
    /// problems, including systemic ones, are reported in the summary.
    pub fn run(&self, inputs: &RunInputs, cancel: &CancellationToken) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let computed_at = self
            .config
            .run
            .computed_at
            .or_else(|| inputs.latest_ingestion())
            .unwrap_or_default();
        let mut summary = RunSummary::new(run_id, self.scorer.version().clone());
        info!(
            run_id = %run_id,
            scoring_version = %self.scorer.version(),
            batches = inputs.batch_count(),
            workers = self.config.workers(),
            computed_at = %computed_at,
            "run started"
        );

        let mut checked = 0u64;
        let records = match self.normalize_all(inputs, &mut summary, &mut checked) {
            Ok(records) => records,
            Err(e @ AdapterError::RejectionRateExceeded { .. }) => {
                error!(run_id = %run_id, error = %e, "systemic input defect");
                summary.fail(e.to_string());
                log_finished(&summary);
                return Ok(summary);
            }
            Err(e) => return Err(e.into()),
        };

        let input = self
            .validator
            .validate(records, &Contract::input(self.config.quality.max_speed_mps));
        checked += input.stats.checked;
        summary.input_violations += input.stats.failed;
        summary.add_violations(&input.stats.by_rule);
        for v in &input.violations {
            debug!(rule = %v.rule, reason = %v.reason, "input record rejected by contract");
        }

        let before = self.grid.stats();
        let cells = self.assign(input.valid);
        let skipped = self.grid.stats().outside_extent - before.outside_extent;
        summary.skipped_outside_extent = skipped;
        if skipped > 0 {
            warn!(run_id = %run_id, skipped, "records outside the grid extent skipped");
        }

        let keys = self.cell_times(&cells);
        let surveyed = surveyed_sources(&cells);
        info!(run_id = %run_id, cells = cells.len(), cell_times = keys.len(), "records assigned");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers())
            .thread_name(|i| format!("marine-risk-{i}"))
            .build()
            .map_err(|e| PipelineError::WorkerPool(e.to_string()))?;

        let extracted: Vec<Option<FeatureVector>> = pool.install(|| {
            keys.par_iter()
                .map(|key| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    cells
                        .get(&key.cell_id)
                        .map(|data| self.extract(*key, data, surveyed.get(&key.time_bucket)))
                })
                .collect()
        });
        let mut vectors = Vec::with_capacity(extracted.len());
        for (key, vector) in keys.iter().zip(extracted) {
            match vector {
                Some(fv) => vectors.push(fv),
                None => summary.mark_not_dispatched(*key),
            }
        }

        let output = self.validator.validate(vectors, &Contract::output());
        checked += output.stats.checked;
        summary.output_violations += output.stats.failed;
        summary.add_violations(&output.stats.by_rule);
        for v in output.violations {
            summary.mark_failed(v.record.key(), format!("{}: {}", v.rule, v.reason));
        }

        let violations = summary.input_violations + summary.output_violations;
        summary.violation_rate = match checked {
            0 => 0.0,
            n => violations as f64 / n as f64,
        };
        let quality = &self.config.quality;
        if summary.violation_rate > quality.failed_violation_rate {
            error!(
                run_id = %run_id,
                rate = summary.violation_rate,
                ceiling = quality.failed_violation_rate,
                "violation rate above failure ceiling; nothing scored"
            );
            summary.fail(format!(
                "violation rate {:.4} exceeds failure ceiling {}",
                summary.violation_rate, quality.failed_violation_rate
            ));
            log_finished(&summary);
            return Ok(summary);
        }
        let degraded = summary.violation_rate > quality.degraded_violation_rate;
        if degraded {
            warn!(
                run_id = %run_id,
                rate = summary.violation_rate,
                ceiling = quality.degraded_violation_rate,
                "run degraded; confidence reduced"
            );
            summary.status = RunStatus::Degraded;
        }

        let results: Vec<(CellKey, CellResult)> = pool.install(|| {
            output
                .valid
                .par_iter()
                .map(|fv| {
                    let result = match cells.get(&fv.key().cell_id) {
                        Some(data) => self.score_and_store(fv, &data.cell, degraded, computed_at, cancel),
                        None => CellResult::Failed("cell missing from assignment".into()),
                    };
                    (fv.key(), result)
                })
                .collect()
        });
        for (key, result) in results {
            match result {
                CellResult::Stored { degraded } => summary.mark_scored(key, degraded),
                CellResult::Failed(reason) => summary.mark_failed(key, reason),
                CellResult::NotDispatched => summary.mark_not_dispatched(key),
            }
        }

        if cancel.is_cancelled() && summary.cells_not_dispatched > 0 {
            warn!(
                run_id = %run_id,
                not_dispatched = summary.cells_not_dispatched,
                "run cancelled; remaining cell-times were not dispatched"
            );
            summary.status = RunStatus::Cancelled;
        }
        log_finished(&summary);
        Ok(summary)
    }

    fn normalize_all(
        &self,
        inputs: &RunInputs,
        summary: &mut RunSummary,
        checked: &mut u64,
    ) -> std::result::Result<Vec<NormalizedRecord>, AdapterError> {
        let adapters = &self.config.adapters;
        let mut records = Vec::new();
        normalize_source(
            &VesselTrackAdapter::new(adapters.vessel_tracks.clone()),
            &inputs.vessel_tracks,
            summary,
            checked,
            &mut records,
        )?;
        normalize_source(
            &WhaleSightingAdapter::new(adapters.whale_sightings.clone()),
            &inputs.whale_sightings,
            summary,
            checked,
            &mut records,
        )?;
        normalize_source(
            &BathymetryAdapter::new(adapters.bathymetry.clone()),
            &inputs.bathymetry,
            summary,
            checked,
            &mut records,
        )?;
        normalize_source(
            &ProtectedAreaAdapter::new(adapters.protected_areas.clone()),
            &inputs.protected_areas,
            summary,
            checked,
            &mut records,
        )?;
        Ok(records)
    }

    fn assign(&self, records: Vec<NormalizedRecord>) -> BTreeMap<CellId, CellData> {
        let mut cells: BTreeMap<CellId, CellData> = BTreeMap::new();
        for record in records {
            let record = Arc::new(record);
            let is_sighting = matches!(record.as_ref(), NormalizedRecord::SightingPoint(_));
            for assignment in self.grid.assign_record(&record) {
                let data = cells
                    .entry(assignment.cell.id)
                    .or_insert_with(|| CellData::new(assignment.cell.clone()));
                let weighted = WeightedRecord::new(record.clone(), assignment.weight);
                match assignment.time_bucket {
                    Some(bucket) => {
                        if is_sighting {
                            data.sightings.push((bucket, weighted.clone()));
                        }
                        data.current.entry(bucket).or_default().push(weighted);
                    }
                    None => data.statics.push(weighted),
                }
            }
        }
        cells
    }

    /// Cell-times to score, ordered by bucket then cell.
    ///
    /// With a configured date range every touched cell is scored for each
    /// bucket in it; otherwise for each bucket that holds time-stamped data.
    fn cell_times(&self, cells: &BTreeMap<CellId, CellData>) -> Vec<CellKey> {
        let buckets: BTreeSet<TimeBucket> = match &self.config.run.date_range {
            Some(range) => self.grid.bucket_size().buckets_in(range).into_iter().collect(),
            None => cells
                .values()
                .flat_map(|data| data.current.keys().copied())
                .collect(),
        };
        let mut keys: Vec<CellKey> = buckets
            .iter()
            .flat_map(|bucket| cells.keys().map(|id| CellKey::new(*id, *bucket)))
            .collect();
        keys.sort();
        keys
    }

    fn extract(
        &self,
        key: CellKey,
        data: &CellData,
        surveyed: Option<&BTreeSet<SourceKind>>,
    ) -> FeatureVector {
        let size = self.grid.bucket_size();
        let start = size.start_of(key.time_bucket);
        let lookback_from = size.bucket_of(start - self.extractor.lookback());

        let mut records: Vec<WeightedRecord> = data
            .current
            .get(&key.time_bucket)
            .cloned()
            .unwrap_or_default();
        records.extend(
            data.sightings
                .iter()
                .filter(|(bucket, _)| *bucket < key.time_bucket && *bucket >= lookback_from)
                .map(|(_, w)| w.clone()),
        );
        records.extend(data.statics.iter().cloned());
        let window = CellWindow::new(key, data.cell.bounds, size)
            .surveyed(surveyed.into_iter().flatten().copied());
        self.extractor.extract(&window, &records)
    }

    fn score_and_store(
        &self,
        features: &FeatureVector,
        cell: &GridCell,
        degraded: bool,
        computed_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> CellResult {
        if cancel.is_cancelled() {
            return CellResult::NotDispatched;
        }
        let key = features.key();
        let out = match score_checked(self.scorer.as_ref(), features) {
            Ok(out) => out,
            Err(e) => return CellResult::Failed(e.to_string()),
        };
        let confidence = if degraded {
            out.confidence * self.config.scoring.degraded_confidence_factor
        } else {
            out.confidence
        };
        let centroid = cell.centroid();
        let record = RiskRecord {
            cell_id: key.cell_id,
            time_bucket: key.time_bucket,
            bucket_start: features.bucket_start(),
            bucket_end: features.bucket_end(),
            cell_bounds: cell.bounds,
            centroid: [centroid.x(), centroid.y()],
            score: out.score,
            confidence,
            coverage: features.coverage(),
            degraded,
            features: features.values().clone(),
            scoring_version: self.scorer.version().clone(),
            computed_at,
        };
        match self.store.upsert(record) {
            Ok(()) => CellResult::Stored { degraded },
            Err(e) => {
                error!(key = %key, error = %e, "failed to persist risk record");
                CellResult::Failed(format!("store: {e}"))
            }
        }
    }
}

/// Time-varying sources with at least one record assigned in each bucket,
/// anywhere in the extent.
fn surveyed_sources(cells: &BTreeMap<CellId, CellData>) -> BTreeMap<TimeBucket, BTreeSet<SourceKind>> {
    let mut surveyed: BTreeMap<TimeBucket, BTreeSet<SourceKind>> = BTreeMap::new();
    for data in cells.values() {
        for (bucket, records) in &data.current {
            surveyed
                .entry(*bucket)
                .or_default()
                .extend(records.iter().map(|w| w.record.source_kind()));
        }
    }
    surveyed
}

fn normalize_source<A: DatasetAdapter>(
    adapter: &A,
    batches: &[RawBatch<A::Row>],
    summary: &mut RunSummary,
    checked: &mut u64,
    records: &mut Vec<NormalizedRecord>,
) -> std::result::Result<(), AdapterError> {
    for batch in batches {
        summary.records_read += batch.len() as u64;
        let out = match adapter.normalize(batch).collect_checked() {
            Ok(out) => out,
            Err(e) => {
                if let AdapterError::RejectionRateExceeded { rejected, .. } = &e {
                    summary.records_rejected += rejected;
                }
                return Err(e);
            }
        };
        summary.records_normalized += out.stats.emitted;
        summary.records_rejected += out.stats.rejected;
        summary.records_skipped_nodata += out.stats.skipped_nodata;
        if out.stats.timed_out {
            *checked += 1;
            summary.input_violations += 1;
            *summary
                .violations_by_reason
                .entry(TIMEOUT_KEY.to_string())
                .or_insert(0) += 1;
        }
        records.extend(out.records);
    }
    Ok(())
}

fn log_finished(summary: &RunSummary) {
    info!(
        run_id = %summary.run_id,
        status = ?summary.status,
        records_read = summary.records_read,
        records_normalized = summary.records_normalized,
        records_rejected = summary.records_rejected,
        input_violations = summary.input_violations,
        output_violations = summary.output_violations,
        violation_rate = summary.violation_rate,
        cells_scored = summary.cells_scored,
        cells_degraded = summary.cells_degraded,
        failed_cells = summary.failed_cells.len(),
        cells_not_dispatched = summary.cells_not_dispatched,
        "run finished"
    );
}
