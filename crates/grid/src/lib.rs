//! Spatial grid index.
//!
//! Partitions the configured extent into fixed-resolution cells and assigns
//! record geometries to them:
//! - points go to the single containing cell
//! - tracks are clipped per cell and weighted by length fraction
//! - areas and raster cells are weighted by the fraction of the cell covered

mod clip;
pub mod config;
pub mod error;
pub mod index;

pub use config::{GridConfig, MAX_CELLS};
pub use error::GridError;
pub use index::{AssignmentStats, CellAssignment, SpatialGridIndex};
