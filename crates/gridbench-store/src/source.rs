// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lazily chunked datasets backed by any region reader.

use crate::layout;
use chrono::NaiveDate;
use gridbench_core::{ChunkGeometry, Dataset, GridSpec, Region, Shape3};
use std::fmt;
use std::io;
use std::sync::Arc;

/// Reads arbitrary regions of a stored field, from any thread
pub trait ChunkSource: Send + Sync + fmt::Debug {
    /// Read `region` as a dense row-major buffer of `region.len()` values.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the backing storage is missing or corrupt.
    fn read_region(&self, region: &Region) -> io::Result<Vec<f32>>;
}

/// Region reader over an in-memory dataset
#[derive(Debug, Clone)]
pub struct MemorySource {
    dataset: Arc<Dataset>,
}

impl MemorySource {
    /// Wrap a dataset.
    #[must_use]
    pub const fn new(dataset: Arc<Dataset>) -> Self {
        Self { dataset }
    }
}

impl ChunkSource for MemorySource {
    fn read_region(&self, region: &Region) -> io::Result<Vec<f32>> {
        Ok(layout::extract(
            self.dataset.values(),
            self.dataset.shape(),
            region,
        ))
    }
}

/// A dataset whose coordinates are loaded and whose field is read on demand,
/// one block of its chunk geometry at a time
#[derive(Clone)]
pub struct LazyDataset {
    spec: GridSpec,
    time: Vec<NaiveDate>,
    lat: Vec<f64>,
    lon: Vec<f64>,
    chunks: ChunkGeometry,
    source: Arc<dyn ChunkSource>,
}

impl fmt::Debug for LazyDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyDataset")
            .field("shape", &self.shape())
            .field("chunks", &self.chunks)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl LazyDataset {
    /// Assemble from loaded coordinates and a field reader.
    #[must_use]
    pub fn new(
        spec: GridSpec,
        time: Vec<NaiveDate>,
        lat: Vec<f64>,
        lon: Vec<f64>,
        chunks: ChunkGeometry,
        source: Arc<dyn ChunkSource>,
    ) -> Self {
        Self {
            spec,
            time,
            lat,
            lon,
            chunks,
            source,
        }
    }

    /// Chunk an in-memory dataset.
    #[must_use]
    pub fn in_memory(dataset: Dataset, chunks: ChunkGeometry) -> Self {
        let spec = dataset.spec().clone();
        let time = dataset.time().to_vec();
        let lat = dataset.lat().to_vec();
        let lon = dataset.lon().to_vec();
        let source = Arc::new(MemorySource::new(Arc::new(dataset)));
        Self::new(spec, time, lat, lon, chunks, source)
    }

    /// Grid description recovered from the artifact.
    #[must_use]
    pub const fn spec(&self) -> &GridSpec {
        &self.spec
    }

    /// Field shape `(time, lat, lon)`.
    #[must_use]
    pub const fn shape(&self) -> Shape3 {
        self.spec.shape()
    }

    /// Chunk geometry used for parallel access.
    #[must_use]
    pub const fn chunks(&self) -> ChunkGeometry {
        self.chunks
    }

    /// Time coordinate.
    #[must_use]
    pub fn time(&self) -> &[NaiveDate] {
        &self.time
    }

    /// Latitude coordinate.
    #[must_use]
    pub fn lat(&self) -> &[f64] {
        &self.lat
    }

    /// Longitude coordinate.
    #[must_use]
    pub fn lon(&self) -> &[f64] {
        &self.lon
    }

    /// Shared handle to the field reader, for graph tasks.
    #[must_use]
    pub fn source(&self) -> Arc<dyn ChunkSource> {
        Arc::clone(&self.source)
    }

    /// Read `region` of the field.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::InvalidInput`] if the region leaves the
    /// field, or the reader's error.
    pub fn read_region(&self, region: &Region) -> io::Result<Vec<f32>> {
        if !Region::full(self.shape()).contains(region) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("region {region:?} outside shape {:?}", self.shape()),
            ));
        }
        self.source.read_region(region)
    }

    /// Materialize the whole field.
    ///
    /// # Errors
    ///
    /// Returns the reader's error, or [`io::ErrorKind::InvalidData`] if the
    /// stored coordinates disagree with the field.
    pub fn load(&self) -> io::Result<Dataset> {
        let shape = self.shape();
        let mut values = vec![0.0; shape.iter().product()];
        for (_, block) in self.chunks.blocks(shape) {
            let data = self.source.read_region(&block)?;
            layout::copy_box_from(&data, block.shape(), block.start, &block, &mut values, shape, [0; 3]);
        }
        Dataset::from_parts(
            self.spec.clone(),
            self.time.clone(),
            self.lat.clone(),
            self.lon.clone(),
            values,
        )
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridbench_core::synthesize;

    #[test]
    fn test_in_memory_load_round_trip() {
        let ds = synthesize(&GridSpec::with_shape(5, 6, 7), Some(3)).unwrap();
        let lazy = LazyDataset::in_memory(ds.clone(), ChunkGeometry::new(2, 4, 3));
        assert_eq!(lazy.shape(), [5, 6, 7]);
        assert_eq!(lazy.load().unwrap(), ds);
    }

    #[test]
    fn test_read_region_bounds() {
        let ds = synthesize(&GridSpec::with_shape(2, 3, 4), Some(3)).unwrap();
        let lazy = LazyDataset::in_memory(ds.clone(), ChunkGeometry::new(1, 1, 1));
        let region = Region::new([1, 2, 3], [2, 3, 4]);
        assert_eq!(lazy.read_region(&region).unwrap(), vec![ds.get(1, 2, 3).unwrap()]);
        let outside = Region::new([0, 0, 0], [3, 3, 4]);
        let err = lazy.read_region(&outside).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
