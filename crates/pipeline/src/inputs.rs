//! Raw batches handed to a run.

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use marine_risk_adapters::{AisPosition, BathymetryGrid, MpaRow, RawBatch, SightingRow};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const VESSEL_DIR: &str = "ais";
pub const SIGHTINGS_DIR: &str = "sightings";
pub const BATHYMETRY_DIR: &str = "bathymetry";
pub const PROTECTED_AREAS_DIR: &str = "mpa";

#[derive(Debug, Clone, Default)]
pub struct RunInputs {
    pub vessel_tracks: Vec<RawBatch<AisPosition>>,
    pub whale_sightings: Vec<RawBatch<SightingRow>>,
    pub bathymetry: Vec<RawBatch<BathymetryGrid>>,
    pub protected_areas: Vec<RawBatch<MpaRow>>,
}

impl RunInputs {
    /// Load `<dir>/{ais,sightings,bathymetry,mpa}/*.json`. Missing
    /// subdirectories are treated as empty sources; files load in name order.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let inputs = Self {
            vessel_tracks: read_batches(&dir.join(VESSEL_DIR))?,
            whale_sightings: read_batches(&dir.join(SIGHTINGS_DIR))?,
            bathymetry: read_batches(&dir.join(BATHYMETRY_DIR))?,
            protected_areas: read_batches(&dir.join(PROTECTED_AREAS_DIR))?,
        };
        info!(
            dir = %dir.display(),
            vessel_batches = inputs.vessel_tracks.len(),
            sighting_batches = inputs.whale_sightings.len(),
            bathymetry_batches = inputs.bathymetry.len(),
            protected_area_batches = inputs.protected_areas.len(),
            "input batches loaded"
        );
        Ok(inputs)
    }

    pub fn batch_count(&self) -> usize {
        self.vessel_tracks.len()
            + self.whale_sightings.len()
            + self.bathymetry.len()
            + self.protected_areas.len()
    }

    /// Latest ingestion timestamp across every batch.
    pub fn latest_ingestion(&self) -> Option<DateTime<Utc>> {
        let stamps = self
            .vessel_tracks
            .iter()
            .map(|b| b.ingested_at)
            .chain(self.whale_sightings.iter().map(|b| b.ingested_at))
            .chain(self.bathymetry.iter().map(|b| b.ingested_at))
            .chain(self.protected_areas.iter().map(|b| b.ingested_at));
        stamps.max()
    }
}

fn read_batches<T: DeserializeOwned>(dir: &Path) -> Result<Vec<RawBatch<T>>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|e| PipelineError::Input {
        path: dir.display().to_string(),
        message: e.to_string(),
    })?;
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::Input {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    paths
        .iter()
        .map(|path| RawBatch::read_json(path).map_err(PipelineError::from))
        .collect()
}
