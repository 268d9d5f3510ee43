//! Scorers by version tag.

use crate::config::ScoringConfig;
use crate::error::{Result, ScoringError};
use crate::linear::LinearRiskModel;
use crate::scorer::RiskScorer;
use crate::tree::TreeEnsembleModel;
use marine_risk_types::ScoringVersion;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Registered scorers. Registering a tag twice replaces the earlier scorer.
#[derive(Clone, Default)]
pub struct ScorerRegistry {
    scorers: BTreeMap<ScoringVersion, Arc<dyn RiskScorer>>,
}

impl std::fmt::Debug for ScorerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScorerRegistry")
            .field("versions", &self.versions())
            .finish()
    }
}

impl ScorerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in baseline model.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(LinearRiskModel::baseline()))?;
        Ok(registry)
    }

    /// Built-in models plus the configured tree ensemble, checked to contain
    /// the configured version.
    pub fn from_config(config: &ScoringConfig) -> Result<Self> {
        config.validate()?;
        let mut registry = Self::with_defaults()?;
        if let Some(path) = &config.model_path {
            let model = TreeEnsembleModel::from_json_file(path)?;
            registry.register(Arc::new(model))?;
        }
        registry.resolve(&ScoringVersion::new(config.version.as_str()))?;
        Ok(registry)
    }

    /// Validate and register a scorer under its version tag.
    pub fn register(&mut self, scorer: Arc<dyn RiskScorer>) -> Result<()> {
        scorer.validate()?;
        let version = scorer.version().clone();
        if self.scorers.insert(version.clone(), scorer).is_some() {
            warn!(version = %version, "replaced registered scorer");
        } else {
            info!(version = %version, "registered scorer");
        }
        Ok(())
    }

    pub fn resolve(&self, version: &ScoringVersion) -> Result<Arc<dyn RiskScorer>> {
        self.scorers
            .get(version)
            .cloned()
            .ok_or_else(|| ScoringError::UnknownVersion(version.to_string()))
    }

    pub fn versions(&self) -> Vec<ScoringVersion> {
        self.scorers.keys().cloned().collect()
    }
}
