//! Grid cell identity.

use crate::error::TypesError;
use crate::geometry::BoundingBox;
use crate::time_bucket::TimeBucket;
use geo::{Point, Polygon};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bounds are quantized to micro-degrees before hashing.
const QUANTUM: f64 = 1_000_000.0;
const CELL_ID_DOMAIN: &[u8] = b"marine-risk/cell/v1";

/// Deterministic identifier derived from a cell's quantized bounds.
///
/// Two grids with the same resolution and extent always produce the same ids;
/// changing either invalidates every downstream record keyed by the old ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(pub u64);

impl CellId {
    pub fn from_bounds(bounds: &BoundingBox) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(CELL_ID_DOMAIN);
        for v in [bounds.min_lon, bounds.min_lat, bounds.max_lon, bounds.max_lat] {
            let q = (v * QUANTUM).round() as i64;
            hasher.update(&q.to_le_bytes());
        }
        let digest = hasher.finalize();
        let mut id = [0u8; 8];
        id.copy_from_slice(&digest.as_bytes()[..8]);
        CellId(u64::from_be_bytes(id))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_be_bytes())
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for CellId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 8];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| TypesError::Parse(format!("cell id {s:?}: {e}")))?;
        Ok(CellId(u64::from_be_bytes(bytes)))
    }
}

/// A (cell, time bucket) pair: the unit of aggregation and scoring.
///
/// Orders by time bucket first, then cell id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellKey {
    pub time_bucket: TimeBucket,
    pub cell_id: CellId,
}

impl CellKey {
    pub fn new(cell_id: CellId, time_bucket: TimeBucket) -> Self {
        Self {
            time_bucket,
            cell_id,
        }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.cell_id, self.time_bucket)
    }
}

/// A fixed-resolution grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub id: CellId,
    pub col: u32,
    pub row: u32,
    pub bounds: BoundingBox,
}

impl GridCell {
    pub fn new(col: u32, row: u32, bounds: BoundingBox) -> Self {
        Self {
            id: CellId::from_bounds(&bounds),
            col,
            row,
            bounds,
        }
    }

    pub fn polygon(&self) -> Polygon<f64> {
        self.bounds.to_rect().to_polygon()
    }

    pub fn centroid(&self) -> Point<f64> {
        Point::from(self.bounds.center())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_id_is_stable_and_bounds_sensitive() {
        let a = BoundingBox::new(-70.0, 40.0, -69.9, 40.1).unwrap();
        let b = BoundingBox::new(-70.0, 40.0, -69.9, 40.1).unwrap();
        let c = BoundingBox::new(-69.9, 40.0, -69.8, 40.1).unwrap();
        assert_eq!(CellId::from_bounds(&a), CellId::from_bounds(&b));
        assert_ne!(CellId::from_bounds(&a), CellId::from_bounds(&c));
    }

    #[test]
    fn cell_id_ignores_sub_quantum_noise() {
        let a = BoundingBox::new(-70.0, 40.0, -69.9, 40.1).unwrap();
        let b = BoundingBox::new(-70.000_000_01, 40.0, -69.9, 40.100_000_01).unwrap();
        assert_eq!(CellId::from_bounds(&a), CellId::from_bounds(&b));
    }

    #[test]
    fn cell_id_hex_round_trips() {
        let id = CellId(0x00ab_cdef_0123_4567);
        assert_eq!(id.to_hex(), "00abcdef01234567");
        assert_eq!(id.to_hex().parse::<CellId>().unwrap(), id);
    }

    #[test]
    fn cell_keys_order_by_bucket_then_cell() {
        let early = CellKey::new(CellId(9), TimeBucket(1));
        let late = CellKey::new(CellId(1), TimeBucket(2));
        let same_bucket = CellKey::new(CellId(2), TimeBucket(1));
        let mut keys = vec![late, early, same_bucket];
        keys.sort();
        assert_eq!(keys, vec![same_bucket, early, late]);
    }
}
