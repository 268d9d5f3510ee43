//! Risk scoring.
//!
//! A scorer maps one feature vector to a risk score and a confidence, both
//! in [0, 1]. Scorers are pure and carry a version tag that is written on
//! every record they produce, so several versions can coexist in the store.

pub mod calibration;
pub mod config;
pub mod error;
pub mod linear;
pub mod registry;
pub mod scorer;
pub mod tree;

pub use calibration::FeatureRange;
pub use config::ScoringConfig;
pub use error::{Result, ScoringError};
pub use linear::{LinearRiskModel, LinearTerm, BASELINE_VERSION};
pub use registry::ScorerRegistry;
pub use scorer::{score_checked, RiskScorer, ScoreOutput};
pub use tree::{DecisionNode, Tree, TreeEnsembleModel};
