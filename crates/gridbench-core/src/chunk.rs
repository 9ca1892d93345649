// SPDX-License-Identifier: MIT OR Apache-2.0
//! Chunk geometry, chunk identifiers, and hyper-rectangular regions.
//!
//! A geometry partitions an axis of length `n` with block size `b` into
//! `ceil(n / b)` blocks. The trailing block is truncated to the remainder;
//! no encoding pads edge blocks.

use crate::error::{BenchError, Result};
use crate::grid::GridSpec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Extent of a 3-D `(time, lat, lon)` array
pub type Shape3 = [usize; 3];

/// Axis names in storage order
pub const AXIS_NAMES: [&str; 3] = ["time", "lat", "lon"];

/// Deterministic artifact key derived from a chunk geometry, e.g. `10x18x36`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    /// Borrow the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Block sizes along `(time, lat, lon)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChunkGeometry {
    /// Block size along the time axis
    pub time: usize,
    /// Block size along the latitude axis
    pub lat: usize,
    /// Block size along the longitude axis
    pub lon: usize,
}

impl ChunkGeometry {
    /// Create a geometry. Use [`validate`] before relying on it.
    #[must_use]
    pub const fn new(time: usize, lat: usize, lon: usize) -> Self {
        Self { time, lat, lon }
    }

    /// Geometry with one block covering the whole shape.
    #[must_use]
    pub const fn whole(shape: Shape3) -> Self {
        Self::new(shape[0], shape[1], shape[2])
    }

    /// Block sizes as an array in axis order.
    #[must_use]
    pub const fn as_array(&self) -> Shape3 {
        [self.time, self.lat, self.lon]
    }

    /// Deterministic identifier; equal triples give equal identifiers.
    #[must_use]
    pub fn chunk_id(&self) -> ChunkId {
        ChunkId(format!("{}x{}x{}", self.time, self.lat, self.lon))
    }

    /// Check every block against an arbitrary array shape.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::InvalidChunkGeometry`] when a block is zero or
    /// exceeds its axis.
    pub fn validate_shape(self, shape: Shape3) -> Result<Self> {
        for ((block, len), name) in self.as_array().into_iter().zip(shape).zip(AXIS_NAMES) {
            if block == 0 {
                return Err(self.invalid(format!("{name} block size must be positive")));
            }
            if block > len {
                return Err(self.invalid(format!(
                    "{name} block size {block} exceeds axis length {len}"
                )));
            }
        }
        Ok(self)
    }

    fn invalid(self, reason: String) -> BenchError {
        BenchError::InvalidChunkGeometry {
            geometry: self.to_string(),
            reason,
        }
    }

    /// Number of blocks along each axis for `shape`.
    #[must_use]
    pub fn blocks_per_axis(&self, shape: Shape3) -> Shape3 {
        let blocks = self.as_array();
        std::array::from_fn(|axis| shape[axis].div_ceil(blocks[axis].max(1)))
    }

    /// Total number of blocks covering `shape`.
    #[must_use]
    pub fn block_count(&self, shape: Shape3) -> usize {
        self.blocks_per_axis(shape).iter().product()
    }

    /// Region covered by the block at `index`, truncated at the array edge.
    #[must_use]
    pub fn block_region(&self, index: Shape3, shape: Shape3) -> Region {
        let blocks = self.as_array();
        let start: Shape3 = std::array::from_fn(|axis| index[axis] * blocks[axis]);
        let end: Shape3 =
            std::array::from_fn(|axis| (start[axis] + blocks[axis]).min(shape[axis]));
        Region::new(start, end)
    }

    /// Block index containing element coordinate `point`.
    #[must_use]
    pub fn block_of(&self, point: Shape3) -> Shape3 {
        let blocks = self.as_array();
        std::array::from_fn(|axis| point[axis] / blocks[axis].max(1))
    }

    /// Every block in row-major block order.
    pub fn blocks(&self, shape: Shape3) -> impl Iterator<Item = (Shape3, Region)> + '_ {
        self.blocks_within(shape, Region::full(shape))
    }

    /// Blocks overlapping `window`, paired with the overlap.
    pub fn blocks_within(
        &self,
        shape: Shape3,
        window: Region,
    ) -> impl Iterator<Item = (Shape3, Region)> + '_ {
        let (first, last) = if window.is_empty() {
            ([0; 3], [0; 3])
        } else {
            let first = self.block_of(window.start);
            let last_elem: Shape3 = std::array::from_fn(|axis| window.end[axis] - 1);
            let last = self.block_of(last_elem);
            (first, std::array::from_fn(|axis| last[axis] + 1))
        };
        (first[0]..last[0]).flat_map(move |t| {
            (first[1]..last[1]).flat_map(move |y| {
                (first[2]..last[2]).filter_map(move |x| {
                    let index = [t, y, x];
                    self.block_region(index, shape)
                        .intersect(&window)
                        .map(|overlap| (index, overlap))
                })
            })
        })
    }
}

impl fmt::Display for ChunkGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.time, self.lat, self.lon)
    }
}

impl FromStr for ChunkGeometry {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(['x', 'X', ',']).collect();
        let [t, y, x] = parts.as_slice() else {
            return Err(format!("expected TIMExLATxLON, got {s:?}"));
        };
        let parse = |part: &str, name: &str| {
            part.trim()
                .parse::<usize>()
                .map_err(|e| format!("invalid {name} block {part:?}: {e}"))
        };
        Ok(Self::new(parse(t, "time")?, parse(y, "lat")?, parse(x, "lon")?))
    }
}

impl TryFrom<String> for ChunkGeometry {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChunkGeometry> for String {
    fn from(geometry: ChunkGeometry) -> Self {
        geometry.to_string()
    }
}

/// Validate a candidate geometry against the grid it will partition.
///
/// Succeeds iff every block size lies in `(0, axis length]`; the geometry is
/// returned unchanged.
///
/// # Errors
///
/// Returns [`BenchError::InvalidChunkGeometry`] naming the offending axis.
pub fn validate(geometry: ChunkGeometry, spec: &GridSpec) -> Result<ChunkGeometry> {
    geometry.validate_shape(spec.shape())
}

/// Half-open hyper-rectangle `[start, end)` in element coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    /// Inclusive lower corner
    pub start: Shape3,
    /// Exclusive upper corner
    pub end: Shape3,
}

impl Region {
    /// Create a region from its corners.
    #[must_use]
    pub const fn new(start: Shape3, end: Shape3) -> Self {
        Self { start, end }
    }

    /// Region covering a whole array.
    #[must_use]
    pub const fn full(shape: Shape3) -> Self {
        Self::new([0; 3], shape)
    }

    /// Extent along each axis.
    #[must_use]
    pub fn shape(&self) -> Shape3 {
        std::array::from_fn(|axis| self.end[axis].saturating_sub(self.start[axis]))
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    /// Whether the region holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `other` lies entirely inside `self`.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        (0..3).all(|axis| self.start[axis] <= other.start[axis] && other.end[axis] <= self.end[axis])
    }

    /// Overlap with `other`, or `None` when disjoint.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let start: Shape3 = std::array::from_fn(|axis| self.start[axis].max(other.start[axis]));
        let end: Shape3 = std::array::from_fn(|axis| self.end[axis].min(other.end[axis]));
        let region = Self::new(start, end);
        (0..3)
            .all(|axis| start[axis] < end[axis])
            .then_some(region)
    }

    /// This region expressed relative to `origin`.
    #[must_use]
    pub fn relative_to(&self, origin: Shape3) -> Self {
        Self::new(
            std::array::from_fn(|axis| self.start[axis] - origin[axis]),
            std::array::from_fn(|axis| self.end[axis] - origin[axis]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_is_idempotent() {
        let a = ChunkGeometry::new(10, 18, 36);
        let b = ChunkGeometry::new(10, 18, 36);
        assert_eq!(a.chunk_id(), b.chunk_id());
        assert_eq!(a.chunk_id().as_str(), "10x18x36");
    }

    #[test]
    fn test_parse_geometry() {
        assert_eq!("365x1x1".parse(), Ok(ChunkGeometry::new(365, 1, 1)));
        assert_eq!(" 1, 180, 360 ".parse(), Ok(ChunkGeometry::new(1, 180, 360)));
        assert!("10x18".parse::<ChunkGeometry>().is_err());
        assert!("ax1x1".parse::<ChunkGeometry>().is_err());
    }

    #[test]
    fn test_validate_boundaries() {
        let spec = GridSpec::default();
        assert!(validate(ChunkGeometry::new(365, 180, 360), &spec).is_ok());
        assert!(validate(ChunkGeometry::new(0, 18, 36), &spec).is_err());
        assert!(validate(ChunkGeometry::new(10, 181, 36), &spec).is_err());
        let err = validate(ChunkGeometry::new(10, 18, 361), &spec).unwrap_err();
        assert!(err.to_string().contains("lon block size 361"));
    }

    #[test]
    fn test_edge_blocks_are_truncated() {
        let geometry = ChunkGeometry::new(100, 45, 90);
        let shape = [365, 180, 360];
        assert_eq!(geometry.blocks_per_axis(shape), [4, 4, 4]);
        let last = geometry.block_region([3, 3, 3], shape);
        assert_eq!(last.shape(), [65, 45, 90]);
        let total: usize = geometry.blocks(shape).map(|(_, r)| r.len()).sum();
        assert_eq!(total, 365 * 180 * 360);
    }

    #[test]
    fn test_blocks_within_window() {
        let geometry = ChunkGeometry::new(10, 18, 36);
        let shape = [365, 180, 360];
        let window = Region::new([0, 45, 90], [365, 90, 180]);
        let blocks: Vec<_> = geometry.blocks_within(shape, window).collect();
        // lat blocks 2..=4, lon blocks 2..=4
        assert_eq!(blocks.len(), 37 * 3 * 3);
        let covered: usize = blocks.iter().map(|(_, r)| r.len()).sum();
        assert_eq!(covered, window.len());
        assert!(blocks.iter().all(|(_, r)| window.contains(r)));
    }

    #[test]
    fn test_region_intersection() {
        let a = Region::new([0, 0, 0], [4, 4, 4]);
        let b = Region::new([2, 2, 2], [6, 6, 6]);
        assert_eq!(a.intersect(&b), Some(Region::new([2, 2, 2], [4, 4, 4])));
        let c = Region::new([4, 0, 0], [5, 1, 1]);
        assert_eq!(a.intersect(&c), None);
        assert_eq!(b.relative_to([2, 2, 2]), Region::new([0; 3], [4, 4, 4]));
    }

    #[test]
    fn test_geometry_serde_as_string() {
        let json = serde_json::to_string(&ChunkGeometry::new(1, 2, 3)).unwrap();
        assert_eq!(json, "\"1x2x3\"");
        let back: ChunkGeometry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ChunkGeometry::new(1, 2, 3));
    }
}
