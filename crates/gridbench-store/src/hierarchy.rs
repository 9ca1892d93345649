// SPDX-License-Identifier: MIT OR Apache-2.0
//! Hierarchical chunked array store.
//!
//! ```text
//! temp_<ChunkID>.store/
//!   .group.json             group metadata and grid description
//!   temperature/.array.json shape, chunks, dtype, attrs, compressor
//!   temperature/0.0.0       one file per chunk, truncated at the edges
//!   time/.array.json, time/0
//!   lat/.array.json,  lat/0
//!   lon/.array.json,  lon/0
//! ```
//!
//! Unlike the columnar file, the store records its own chunk geometry.

use crate::atomic;
use crate::layout;
use crate::source::{ChunkSource, LazyDataset};
use crate::{ArrayEncoding, OpenError};
use chrono::NaiveDate;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use gridbench_core::{AXIS_NAMES, ChunkGeometry, Dataset, GridSpec, Region, Shape3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Store format identifier written to `.group.json`
pub const FORMAT: &str = "gridbench-store";
/// Current store format version
pub const VERSION: u32 = 1;
const GROUP_META: &str = ".group.json";
const ARRAY_META: &str = ".array.json";

/// Root metadata of a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMeta {
    /// Always [`FORMAT`]
    pub format: String,
    /// Store format version
    pub version: u32,
    /// Grid the data was synthesized from
    pub grid: GridSpec,
    /// Name of the data variable
    pub data_var: String,
    /// Every variable in the group
    pub variables: Vec<String>,
}

/// Chunk compressor recorded in array metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "lowercase")]
pub enum Compressor {
    /// zlib stream at the given level
    Zlib {
        /// Compression level 0-9
        level: u32,
    },
}

/// Metadata of one array variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayMeta {
    /// Array extent
    pub shape: Vec<usize>,
    /// Chunk extent
    pub chunks: Vec<usize>,
    /// Element type: `<f4`, `<f8`, or `<i8`
    pub dtype: String,
    /// Dimension names
    pub dimensions: Vec<String>,
    /// Free-form attributes
    #[serde(default)]
    pub attrs: Map<String, Value>,
    /// Chunk compressor, if any
    pub compressor: Option<Compressor>,
}

/// Hierarchical chunked store encoding
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreEncoding {
    compressor: Option<Compressor>,
}

impl StoreEncoding {
    /// Store chunks uncompressed.
    #[must_use]
    pub const fn uncompressed() -> Self {
        Self { compressor: None }
    }

    /// Store chunks as zlib streams at `level` (clamped to 9).
    #[must_use]
    pub fn zlib(level: u32) -> Self {
        Self {
            compressor: Some(Compressor::Zlib {
                level: level.min(9),
            }),
        }
    }

    /// Build from an optional zlib level.
    #[must_use]
    pub fn with_level(level: Option<u32>) -> Self {
        level.map_or_else(Self::uncompressed, Self::zlib)
    }

    fn write_tree(&self, dataset: &Dataset, geometry: ChunkGeometry, root: &Path) -> io::Result<()> {
        let spec = dataset.spec();
        let shape = dataset.shape();
        let field = spec.field.as_str();

        let days: Vec<i64> = dataset
            .time()
            .iter()
            .map(|d| (*d - spec.start).num_days())
            .collect();
        let time_attrs = attrs([
            ("units", json!(format!("days since {}", spec.start))),
            ("calendar", json!("proleptic_gregorian")),
        ]);
        self.write_coord(root, "time", "<i8", time_attrs, &to_le_bytes(&days, i64::to_le_bytes))?;
        let lat_attrs = attrs([("units", json!("degrees_north"))]);
        self.write_coord(root, "lat", "<f8", lat_attrs, &to_le_bytes(dataset.lat(), f64::to_le_bytes))?;
        let lon_attrs = attrs([("units", json!("degrees_east"))]);
        self.write_coord(root, "lon", "<f8", lon_attrs, &to_le_bytes(dataset.lon(), f64::to_le_bytes))?;

        let var_dir = root.join(field);
        fs::create_dir_all(&var_dir)?;
        let meta = ArrayMeta {
            shape: shape.to_vec(),
            chunks: geometry.as_array().to_vec(),
            dtype: "<f4".to_string(),
            dimensions: AXIS_NAMES.iter().map(ToString::to_string).collect(),
            attrs: attrs([("units", json!(spec.units))]),
            compressor: self.compressor,
        };
        write_json(&var_dir.join(ARRAY_META), &meta)?;

        let blocks: Vec<(Shape3, Region)> = geometry.blocks(shape).collect();
        blocks.par_iter().try_for_each(|(index, region)| {
            let values = layout::extract(dataset.values(), shape, region);
            let bytes = to_le_bytes(&values, f32::to_le_bytes);
            self.write_chunk(&var_dir.join(chunk_key(*index)), &bytes)
        })?;

        let group = GroupMeta {
            format: FORMAT.to_string(),
            version: VERSION,
            grid: spec.clone(),
            data_var: field.to_string(),
            variables: vec![
                field.to_string(),
                "time".to_string(),
                "lat".to_string(),
                "lon".to_string(),
            ],
        };
        write_json(&root.join(GROUP_META), &group)
    }

    fn write_coord(
        &self,
        root: &Path,
        name: &str,
        dtype: &str,
        attrs: Map<String, Value>,
        bytes: &[u8],
    ) -> io::Result<()> {
        let dir = root.join(name);
        fs::create_dir_all(&dir)?;
        let len = bytes.len() / 8;
        let meta = ArrayMeta {
            shape: vec![len],
            chunks: vec![len],
            dtype: dtype.to_string(),
            dimensions: vec![name.to_string()],
            attrs,
            compressor: self.compressor,
        };
        write_json(&dir.join(ARRAY_META), &meta)?;
        self.write_chunk(&dir.join("0"), bytes)
    }

    fn write_chunk(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        match self.compressor {
            None => fs::write(path, bytes),
            Some(Compressor::Zlib { level }) => {
                let file = fs::File::create(path)?;
                let mut encoder = ZlibEncoder::new(io::BufWriter::new(file), Compression::new(level));
                encoder.write_all(bytes)?;
                encoder.finish()?.flush()
            }
        }
    }
}

impl ArrayEncoding for StoreEncoding {
    fn write(&self, dataset: &Dataset, geometry: ChunkGeometry, path: &Path) -> io::Result<()> {
        atomic::write_dir(path, |staging| self.write_tree(dataset, geometry, staging))
    }

    fn open(&self, path: &Path, chunks: Option<ChunkGeometry>) -> Result<LazyDataset, OpenError> {
        let group: GroupMeta = read_json(&path.join(GROUP_META))?;
        if group.format != FORMAT || group.version != VERSION {
            return Err(OpenError::Corrupt(format!(
                "unsupported store {} v{}",
                group.format, group.version
            )));
        }
        group
            .grid
            .validate()
            .map_err(|e| OpenError::Corrupt(e.to_string()))?;
        let shape = group.grid.shape();

        let var_dir = path.join(&group.data_var);
        let meta: ArrayMeta = read_json(&var_dir.join(ARRAY_META))?;
        let stored = match (meta.shape.as_slice(), meta.chunks.as_slice()) {
            (&[t, y, x], &[bt, by, bx]) if [t, y, x] == shape && meta.dtype == "<f4" => {
                ChunkGeometry::new(bt, by, bx)
            }
            _ => {
                return Err(OpenError::Corrupt(format!(
                    "{} metadata does not describe a {shape:?} <f4 array",
                    group.data_var
                )));
            }
        };
        stored
            .validate_shape(shape)
            .map_err(|e| OpenError::Corrupt(e.to_string()))?;
        let chunks = chunks.unwrap_or(stored);
        chunks
            .validate_shape(shape)
            .map_err(|e| OpenError::Chunks(e.to_string()))?;

        let days: Vec<i64> = read_coord(path, "time", "<i8", shape[0], i64::from_le_bytes)?;
        let time = days
            .iter()
            .map(|&d| {
                chrono::TimeDelta::try_days(d)
                    .and_then(|delta| group.grid.start.checked_add_signed(delta))
                    .ok_or_else(|| OpenError::Corrupt(format!("time offset {d} out of range")))
            })
            .collect::<Result<Vec<NaiveDate>, _>>()?;
        let lat = read_coord(path, "lat", "<f8", shape[1], f64::from_le_bytes)?;
        let lon = read_coord(path, "lon", "<f8", shape[2], f64::from_le_bytes)?;

        let source = StoreSource {
            dir: var_dir,
            shape,
            stored,
            compressor: meta.compressor,
        };
        Ok(LazyDataset::new(group.grid, time, lat, lon, chunks, Arc::new(source)))
    }
}

/// Region reader over the chunk files of one store variable
#[derive(Debug, Clone)]
pub struct StoreSource {
    dir: PathBuf,
    shape: Shape3,
    stored: ChunkGeometry,
    compressor: Option<Compressor>,
}

impl StoreSource {
    fn read_chunk(&self, index: Shape3) -> io::Result<Vec<f32>> {
        let region = self.stored.block_region(index, self.shape);
        let bytes = read_chunk_bytes(&self.dir.join(chunk_key(index)), self.compressor)?;
        if bytes.len() != region.len() * 4 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "chunk {} holds {} bytes, expected {}",
                    chunk_key(index),
                    bytes.len(),
                    region.len() * 4
                ),
            ));
        }
        Ok(from_le_bytes(&bytes, f32::from_le_bytes))
    }
}

impl ChunkSource for StoreSource {
    fn read_region(&self, region: &Region) -> io::Result<Vec<f32>> {
        let mut out = vec![0.0; region.len()];
        for (index, overlap) in self.stored.blocks_within(self.shape, *region) {
            let block = self.stored.block_region(index, self.shape);
            let data = self.read_chunk(index)?;
            layout::copy_box_from(
                &data,
                block.shape(),
                block.start,
                &overlap,
                &mut out,
                region.shape(),
                region.start,
            );
        }
        Ok(out)
    }
}

/// Chunk file name `t.y.x`.
#[must_use]
pub fn chunk_key(index: Shape3) -> String {
    format!("{}.{}.{}", index[0], index[1], index[2])
}

fn attrs<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(path, bytes)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, OpenError> {
    let bytes = fs::read(path).map_err(OpenError::from_io)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| OpenError::Corrupt(format!("{}: {e}", path.display())))
}

fn read_chunk_bytes(path: &Path, compressor: Option<Compressor>) -> io::Result<Vec<u8>> {
    let raw = fs::read(path)?;
    match compressor {
        None => Ok(raw),
        Some(Compressor::Zlib { .. }) => {
            let mut out = Vec::new();
            ZlibDecoder::new(raw.as_slice()).read_to_end(&mut out)?;
            Ok(out)
        }
    }
}

fn read_coord<T, const W: usize>(
    root: &Path,
    name: &str,
    dtype: &str,
    len: usize,
    decode: fn([u8; W]) -> T,
) -> Result<Vec<T>, OpenError> {
    let dir = root.join(name);
    let meta: ArrayMeta = read_json(&dir.join(ARRAY_META))?;
    if meta.shape != [len] || meta.dtype != dtype {
        return Err(OpenError::Corrupt(format!(
            "coordinate {name} is {:?} {}, expected [{len}] {dtype}",
            meta.shape, meta.dtype
        )));
    }
    let bytes = read_chunk_bytes(&dir.join("0"), meta.compressor).map_err(OpenError::from_io)?;
    if bytes.len() != len * W {
        return Err(OpenError::Corrupt(format!("coordinate {name} is truncated")));
    }
    Ok(from_le_bytes(&bytes, decode))
}

fn to_le_bytes<T: Copy, const W: usize>(values: &[T], encode: fn(T) -> [u8; W]) -> Vec<u8> {
    values.iter().flat_map(|&v| encode(v)).collect()
}

fn from_le_bytes<T, const W: usize>(bytes: &[u8], decode: fn([u8; W]) -> T) -> Vec<T> {
    bytes
        .chunks_exact(W)
        .map(|chunk| {
            let mut buf = [0u8; W];
            buf.copy_from_slice(chunk);
            decode(buf)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridbench_core::synthesize;

    fn dataset() -> Dataset {
        synthesize(&GridSpec::with_shape(7, 9, 10), Some(5)).unwrap()
    }

    #[test]
    fn test_store_round_trip_uncompressed_and_zlib() {
        let ds = dataset();
        for encoding in [StoreEncoding::uncompressed(), StoreEncoding::zlib(6)] {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("temp_3x4x5.store");
            encoding.write(&ds, ChunkGeometry::new(3, 4, 5), &path).unwrap();
            let lazy = encoding.open(&path, None).unwrap();
            assert_eq!(lazy.chunks(), ChunkGeometry::new(3, 4, 5));
            assert_eq!(lazy.load().unwrap(), ds);
        }
    }

    #[test]
    fn test_edge_chunks_are_truncated_on_disk() {
        let ds = dataset();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.store");
        StoreEncoding::uncompressed()
            .write(&ds, ChunkGeometry::new(3, 4, 5), &path)
            .unwrap();
        let edge = fs::metadata(path.join("temperature").join("2.2.1")).unwrap();
        // time 6..7, lat 8..9, lon 5..10
        assert_eq!(edge.len(), 5 * 4);
        assert!(!path.join("temperature").join("3.0.0").exists());
    }

    #[test]
    fn test_region_spanning_chunks() {
        let ds = dataset();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.store");
        let encoding = StoreEncoding::zlib(1);
        encoding.write(&ds, ChunkGeometry::new(2, 2, 2), &path).unwrap();
        let lazy = encoding.open(&path, Some(ChunkGeometry::new(7, 9, 10))).unwrap();
        let region = Region::new([1, 3, 1], [6, 8, 9]);
        assert_eq!(
            lazy.read_region(&region).unwrap(),
            layout::extract(ds.values(), ds.shape(), &region)
        );
    }

    #[test]
    fn test_missing_chunk_fails_read() {
        let ds = dataset();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.store");
        let encoding = StoreEncoding::uncompressed();
        encoding.write(&ds, ChunkGeometry::new(7, 9, 10), &path).unwrap();
        fs::remove_file(path.join("temperature").join("0.0.0")).unwrap();
        let lazy = encoding.open(&path, None).unwrap();
        assert!(lazy.load().is_err());
    }

    #[test]
    fn test_open_rejects_missing_group() {
        let dir = tempfile::tempdir().unwrap();
        let err = StoreEncoding::default()
            .open(&dir.path().join("nope.store"), None)
            .unwrap_err();
        assert!(matches!(err, OpenError::Missing(_)), "{err}");
    }

    #[test]
    fn test_group_metadata_contents() {
        let ds = dataset();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.store");
        StoreEncoding::zlib(1)
            .write(&ds, ChunkGeometry::new(7, 9, 10), &path)
            .unwrap();
        let group: GroupMeta = read_json(&path.join(GROUP_META)).unwrap();
        assert_eq!(group.data_var, "temperature");
        let meta: ArrayMeta = read_json(&path.join("temperature").join(ARRAY_META)).unwrap();
        assert_eq!(meta.attrs.get("units"), Some(&json!("celsius")));
        assert_eq!(meta.compressor, Some(Compressor::Zlib { level: 1 }));
    }
}
