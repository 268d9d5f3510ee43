//! Gradient-boosted tree ensemble loaded from JSON.
//!
//! Trees are evaluated in file order and leaf values are summed before the
//! logistic link, so predictions are reproducible bit for bit on any host.

use crate::calibration::FeatureRange;
use crate::error::{Result, ScoringError};
use crate::scorer::{RiskScorer, ScoreOutput};
use marine_risk_types::{FeatureName, FeatureVector, ScoringVersion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fs, path::Path};
use tracing::{info, warn};

fn default_true() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

/// Decision node. A node with `value` is a leaf.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DecisionNode {
    /// Index into [`TreeEnsembleModel::features`].
    #[serde(default)]
    pub feature: usize,
    #[serde(default)]
    pub threshold: f64,
    pub left: Option<usize>,
    pub right: Option<usize>,
    #[serde(default)]
    pub value: Option<f64>,
    /// Branch taken when the feature is NoData.
    #[serde(default = "default_true")]
    pub missing_left: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Tree {
    pub nodes: Vec<DecisionNode>,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TreeEnsembleModel {
    pub version: ScoringVersion,
    /// Feature order used by node indices.
    pub features: Vec<FeatureName>,
    pub trees: Vec<Tree>,
    #[serde(default)]
    pub base_score: f64,
    /// Ranges the model was trained on; values outside lower confidence.
    #[serde(default)]
    pub calibration: BTreeMap<FeatureName, FeatureRange>,
}

impl TreeEnsembleModel {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .map_err(|e| ScoringError::ModelLoad(format!("{}: {e}", path.display())))?;
        let model: Self = serde_json::from_str(&data)
            .map_err(|e| ScoringError::ModelLoad(format!("{}: {e}", path.display())))?;
        model.validate()?;
        info!(
            path = %path.display(),
            version = %model.version,
            trees = model.trees.len(),
            hash = %model.model_hash()?,
            "loaded tree ensemble"
        );
        Ok(model)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ScoringError::InvalidModel(e.to_string()))
    }

    /// Content hash of the model, logged alongside its version tag.
    pub fn model_hash(&self) -> Result<String> {
        Ok(blake3::hash(self.to_json()?.as_bytes()).to_hex().to_string())
    }

    /// Raw margin before the logistic link.
    pub fn margin(&self, features: &FeatureVector) -> f64 {
        let inputs: Vec<Option<f64>> = self.features.iter().map(|n| features.value(*n)).collect();
        let mut margin = self.base_score;

        for tree in &self.trees {
            let mut node_idx = 0usize;
            loop {
                let Some(node) = tree.nodes.get(node_idx) else {
                    warn!(node = node_idx, "invalid node index");
                    break;
                };
                if let Some(value) = node.value {
                    margin += tree.weight * value;
                    break;
                }
                let go_left = match inputs.get(node.feature).copied().flatten() {
                    Some(v) => v <= node.threshold,
                    None => node.missing_left,
                };
                let next = if go_left { node.left } else { node.right };
                match next {
                    Some(next) if next > node_idx => node_idx = next,
                    _ => {
                        warn!(node = node_idx, "tree traversal stopped at a dangling node");
                        break;
                    }
                }
            }
        }
        margin
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl RiskScorer for TreeEnsembleModel {
    fn version(&self) -> &ScoringVersion {
        &self.version
    }

    fn validate(&self) -> Result<()> {
        if self.version.as_str().is_empty() {
            return Err(ScoringError::InvalidModel("empty version tag".into()));
        }
        if self.trees.is_empty() {
            return Err(ScoringError::InvalidModel("model has no trees".into()));
        }
        if !self.base_score.is_finite() {
            return Err(ScoringError::InvalidModel("non-finite base score".into()));
        }
        for (name, range) in &self.calibration {
            if !range.is_valid() {
                return Err(ScoringError::InvalidModel(format!(
                    "invalid calibration range for {name}"
                )));
            }
        }

        for (t_idx, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(ScoringError::InvalidModel(format!("tree {t_idx} has no nodes")));
            }
            if !tree.weight.is_finite() {
                return Err(ScoringError::InvalidModel(format!(
                    "tree {t_idx} has a non-finite weight"
                )));
            }
            for (n_idx, node) in tree.nodes.iter().enumerate() {
                let bad = ScoringError::InvalidNodeReference {
                    tree: t_idx,
                    node: n_idx,
                };
                if let Some(value) = node.value {
                    if !value.is_finite() {
                        return Err(ScoringError::InvalidModel(format!(
                            "tree {t_idx} node {n_idx} has a non-finite leaf"
                        )));
                    }
                    continue;
                }
                if node.feature >= self.features.len() || !node.threshold.is_finite() {
                    return Err(bad);
                }
                // Children after their parent rule out cycles.
                match (node.left, node.right) {
                    (Some(l), Some(r))
                        if l > n_idx && r > n_idx && l < tree.nodes.len() && r < tree.nodes.len() => {}
                    _ => return Err(bad),
                }
            }
        }
        Ok(())
    }

    fn score(&self, features: &FeatureVector) -> ScoreOutput {
        let extrapolation: f64 = self
            .calibration
            .iter()
            .filter_map(|(name, range)| features.value(*name).map(|v| range.extrapolation(v)))
            .sum();
        ScoreOutput {
            score: sigmoid(self.margin(features)).clamp(0.0, 1.0),
            confidence: (features.coverage() * (-extrapolation).exp()).clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(value: f64) -> DecisionNode {
        DecisionNode {
            feature: 0,
            threshold: 0.0,
            left: None,
            right: None,
            value: Some(value),
            missing_left: true,
        }
    }

    fn split(feature: usize, threshold: f64, left: usize, right: usize) -> DecisionNode {
        DecisionNode {
            feature,
            threshold,
            left: Some(left),
            right: Some(right),
            value: None,
            missing_left: true,
        }
    }

    fn model(nodes: Vec<DecisionNode>) -> TreeEnsembleModel {
        TreeEnsembleModel {
            version: ScoringVersion::new("gbdt/test"),
            features: vec![FeatureName::VesselDensity],
            trees: vec![Tree { nodes, weight: 1.0 }],
            base_score: 0.0,
            calibration: BTreeMap::new(),
        }
    }

    #[test]
    fn rejects_back_references() {
        let m = model(vec![split(0, 1.0, 1, 0), leaf(1.0)]);
        assert!(matches!(
            m.validate(),
            Err(ScoringError::InvalidNodeReference { tree: 0, node: 0 })
        ));
    }

    #[test]
    fn rejects_unknown_feature_index() {
        let m = model(vec![split(3, 1.0, 1, 2), leaf(1.0), leaf(-1.0)]);
        assert!(m.validate().is_err());
    }

    #[test]
    fn sigmoid_is_centered() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(40.0) <= 1.0);
        assert!(sigmoid(-40.0) >= 0.0);
    }
}
