//! Run configuration.
//!
//! Every key has a default. Values come from an optional TOML file layered
//! with `MARINE_RISK__<SECTION>__<KEY>` environment variables.

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use config::{Config, Environment, File as ConfigFile};
use marine_risk_adapters::AdaptersConfig;
use marine_risk_features::FeatureConfig;
use marine_risk_grid::GridConfig;
use marine_risk_quality::QualityConfig;
use marine_risk_scoring::ScoringConfig;
use marine_risk_types::DateRange;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub const ENV_PREFIX: &str = "MARINE_RISK";

/// Per-run settings that are not owned by a single component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Restrict scored cell-times to these dates. Without it the run covers
    /// every bucket that has vessel or sighting data.
    pub date_range: Option<DateRange>,
    /// Logical timestamp written on every record. Defaults to the latest
    /// ingestion time among the input batches.
    pub computed_at: Option<DateTime<Utc>>,
    /// Worker threads; defaults to the CPU count.
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub grid: GridConfig,
    pub adapters: AdaptersConfig,
    pub quality: QualityConfig,
    pub features: FeatureConfig,
    pub scoring: ScoringConfig,
    pub run: RunSettings,
}

impl RunConfig {
    /// Load from an optional file plus the environment, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            if !path.exists() {
                return Err(PipelineError::Config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            builder = builder.add_source(ConfigFile::from(path));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: RunConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        info!(
            file = ?path.map(|p| p.display().to_string()),
            scoring_version = %config.scoring.version,
            resolution_deg = config.grid.resolution_deg,
            time_bucket = %config.grid.time_bucket,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Reject invalid settings. Nothing is silently defaulted.
    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        self.adapters.validate()?;
        self.quality.validate()?;
        self.features.validate()?;
        self.scoring.validate()?;
        if self.run.workers == Some(0) {
            return Err(PipelineError::Config("run.workers must be non-zero".into()));
        }
        Ok(())
    }

    pub fn workers(&self) -> usize {
        self.run.workers.unwrap_or_else(num_cpus::get).max(1)
    }
}
