//! Feature extraction.
//!
//! Turns the weighted records assigned to one (cell, time bucket) into an
//! immutable [`FeatureVector`](marine_risk_types::FeatureVector). Features
//! whose source delivered nothing for the bucket are `NoData`; a source that
//! was surveyed but had nothing in the cell yields an observed zero.

pub mod config;
pub mod extractor;

pub use config::{FeatureConfig, FeatureError};
pub use extractor::{CellWindow, FeatureExtractor, WeightedRecord, EXTRACTOR_VERSION};
