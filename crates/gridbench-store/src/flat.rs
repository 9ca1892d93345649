// SPDX-License-Identifier: MIT OR Apache-2.0
//! Single-file columnar encoding.
//!
//! Layout:
//!
//! | offset | size | content |
//! |--------|------|---------|
//! | 0 | 8 | magic `GRIDFLAT` |
//! | 8 | 4 | format version, u32 LE |
//! | 12 | 4 | header length `h`, u32 LE |
//! | 16 | h | JSON [`FlatHeader`] |
//! | aligned to 8 | 4·n | field values, f32 LE, row-major |
//!
//! The file records the array shape but not a chunking; readers choose one.

use crate::atomic;
use crate::layout;
use crate::source::{ChunkSource, LazyDataset};
use crate::{ArrayEncoding, OpenError};
use chrono::NaiveDate;
use gridbench_core::{AXIS_NAMES, ChunkGeometry, Dataset, GridSpec, Region, Shape3};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File magic
pub const MAGIC: &[u8; 8] = b"GRIDFLAT";
/// Current format version
pub const VERSION: u32 = 1;
const PREFIX_LEN: usize = 16;
const ALIGN: usize = 8;
const DTYPE: &str = "<f4";

/// Self-describing header preceding the value block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatHeader {
    /// Grid the data was synthesized from
    pub grid: GridSpec,
    /// Dimension names in storage order
    pub dimensions: Vec<String>,
    /// Array shape
    pub shape: Shape3,
    /// Element type, always `<f4`
    pub dtype: String,
    /// Time coordinate
    pub time: Vec<NaiveDate>,
    /// Latitude coordinate
    pub lat: Vec<f64>,
    /// Longitude coordinate
    pub lon: Vec<f64>,
}

impl FlatHeader {
    fn for_dataset(dataset: &Dataset) -> Self {
        Self {
            grid: dataset.spec().clone(),
            dimensions: AXIS_NAMES.iter().map(ToString::to_string).collect(),
            shape: dataset.shape(),
            dtype: DTYPE.to_string(),
            time: dataset.time().to_vec(),
            lat: dataset.lat().to_vec(),
            lon: dataset.lon().to_vec(),
        }
    }

    /// Serialize the prefix, header, and alignment padding.
    ///
    /// # Errors
    ///
    /// Returns an error if the header does not fit the length field.
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = u32::try_from(json.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "header too large"))?;
        let mut out = Vec::with_capacity(PREFIX_LEN + json.len() + ALIGN);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&json);
        out.resize(data_offset(json.len()), 0);
        Ok(out)
    }

    /// Parse a header from the start of a file.
    ///
    /// Returns the header and the byte offset of the value block.
    ///
    /// # Errors
    ///
    /// Returns [`OpenError::Corrupt`] on a bad magic, unknown version,
    /// truncated prefix, or a header inconsistent with its coordinates.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), OpenError> {
        if bytes.len() < PREFIX_LEN {
            return Err(OpenError::Corrupt("truncated header prefix".to_string()));
        }
        if &bytes[..8] != MAGIC {
            return Err(OpenError::Corrupt("bad magic".to_string()));
        }
        let version = read_u32(&bytes[8..12]);
        if version != VERSION {
            return Err(OpenError::Corrupt(format!("unsupported version {version}")));
        }
        let len = read_u32(&bytes[12..16]) as usize;
        let json = bytes
            .get(PREFIX_LEN..PREFIX_LEN.saturating_add(len))
            .ok_or_else(|| OpenError::Corrupt("truncated header".to_string()))?;
        let header: Self = serde_json::from_slice(json)
            .map_err(|e| OpenError::Corrupt(format!("header: {e}")))?;
        header.check()?;
        Ok((header, data_offset(len)))
    }

    fn check(&self) -> Result<(), OpenError> {
        if self.dtype != DTYPE {
            return Err(OpenError::Corrupt(format!("unsupported dtype {}", self.dtype)));
        }
        if self.shape != self.grid.shape() {
            return Err(OpenError::Corrupt(format!(
                "shape {:?} disagrees with grid {:?}",
                self.shape,
                self.grid.shape()
            )));
        }
        if [self.time.len(), self.lat.len(), self.lon.len()] != self.shape {
            return Err(OpenError::Corrupt("coordinate lengths disagree with shape".to_string()));
        }
        self.grid
            .validate()
            .map_err(|e| OpenError::Corrupt(e.to_string()))
    }
}

const fn data_offset(header_len: usize) -> usize {
    (PREFIX_LEN + header_len).div_ceil(ALIGN) * ALIGN
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

/// Columnar single-file encoding
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatEncoding;

impl ArrayEncoding for FlatEncoding {
    fn write(&self, dataset: &Dataset, geometry: ChunkGeometry, path: &Path) -> io::Result<()> {
        let header = FlatHeader::for_dataset(dataset).encode()?;
        let shape = dataset.shape();
        atomic::write_file(path, |file| {
            let mut out = BufWriter::with_capacity(1 << 20, file);
            out.write_all(&header)?;
            // One time-block per write keeps the conversion buffer bounded.
            let mut bytes = Vec::new();
            for t0 in (0..shape[0]).step_by(geometry.time.max(1)) {
                let t1 = (t0 + geometry.time.max(1)).min(shape[0]);
                let slab = &dataset.values()[layout::offset(shape, [t0, 0, 0])..layout::offset(shape, [t1, 0, 0])];
                bytes.clear();
                bytes.extend(slab.iter().flat_map(|v| v.to_le_bytes()));
                out.write_all(&bytes)?;
            }
            out.flush()
        })
    }

    fn open(&self, path: &Path, chunks: Option<ChunkGeometry>) -> Result<LazyDataset, OpenError> {
        let mut file = File::open(path).map_err(OpenError::from_io)?;
        let file_len = file.metadata().map_err(OpenError::from_io)?.len();

        let mut prefix = [0u8; PREFIX_LEN];
        file.read_exact(&mut prefix)
            .map_err(|_| OpenError::Corrupt("truncated header prefix".to_string()))?;
        let header_len = read_u32(&prefix[12..16]) as usize;
        let total = data_offset(header_len);
        if total as u64 > file_len {
            return Err(OpenError::Corrupt("truncated header".to_string()));
        }
        let mut head = vec![0u8; total];
        head[..PREFIX_LEN].copy_from_slice(&prefix);
        file.read_exact(&mut head[PREFIX_LEN..])
            .map_err(|_| OpenError::Corrupt("truncated header".to_string()))?;
        let (header, offset) = FlatHeader::decode(&head)?;

        let elements: usize = header.shape.iter().product();
        let expected = offset as u64 + elements as u64 * 4;
        if file_len != expected {
            return Err(OpenError::Corrupt(format!(
                "file is {file_len} bytes, expected {expected}"
            )));
        }

        let chunks = chunks.unwrap_or_else(|| ChunkGeometry::whole(header.shape));
        chunks
            .validate_shape(header.shape)
            .map_err(|e| OpenError::Chunks(e.to_string()))?;
        let source = FlatSource {
            path: path.to_path_buf(),
            shape: header.shape,
            data_offset: offset as u64,
        };
        Ok(LazyDataset::new(
            header.grid,
            header.time,
            header.lat,
            header.lon,
            chunks,
            Arc::new(source),
        ))
    }
}

/// Region reader over a columnar file; each read opens its own handle
#[derive(Debug, Clone)]
pub struct FlatSource {
    path: PathBuf,
    shape: Shape3,
    data_offset: u64,
}

impl ChunkSource for FlatSource {
    fn read_region(&self, region: &Region) -> io::Result<Vec<f32>> {
        let mut file = File::open(&self.path)?;
        let mut out = Vec::with_capacity(region.len());
        let mut buf = Vec::new();
        for (start, len) in layout::runs(self.shape, region) {
            buf.resize(len * 4, 0);
            file.seek(SeekFrom::Start(self.data_offset + start as u64 * 4))?;
            file.read_exact(&mut buf)?;
            out.extend(
                buf.chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridbench_core::synthesize;

    #[test]
    fn test_header_round_trip() {
        let ds = synthesize(&GridSpec::with_shape(3, 4, 5), Some(1)).unwrap();
        let header = FlatHeader::for_dataset(&ds);
        let bytes = header.encode().unwrap();
        assert_eq!(bytes.len() % ALIGN, 0);
        let (decoded, offset) = FlatHeader::decode(&bytes).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(offset, bytes.len());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(FlatHeader::decode(b"short").is_err());
        assert!(FlatHeader::decode(b"NOTMAGIC\x01\0\0\0\0\0\0\0").is_err());
        let mut bytes = Vec::from(&MAGIC[..]);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        assert!(FlatHeader::decode(&bytes).is_err());
    }

    #[test]
    fn test_write_and_read_region() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp_2x3x4.flat");
        let ds = synthesize(&GridSpec::with_shape(5, 6, 8), Some(9)).unwrap();
        FlatEncoding.write(&ds, ChunkGeometry::new(2, 3, 4), &path).unwrap();

        let lazy = FlatEncoding.open(&path, Some(ChunkGeometry::new(2, 3, 4))).unwrap();
        assert_eq!(lazy.chunks(), ChunkGeometry::new(2, 3, 4));
        let region = Region::new([1, 2, 3], [4, 5, 7]);
        assert_eq!(
            lazy.read_region(&region).unwrap(),
            layout::extract(ds.values(), ds.shape(), &region)
        );
        assert_eq!(lazy.load().unwrap(), ds);
    }

    #[test]
    fn test_open_without_chunks_uses_one_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.flat");
        let ds = synthesize(&GridSpec::with_shape(2, 2, 2), Some(9)).unwrap();
        FlatEncoding.write(&ds, ChunkGeometry::new(1, 1, 1), &path).unwrap();
        let lazy = FlatEncoding.open(&path, None).unwrap();
        assert_eq!(lazy.chunks(), ChunkGeometry::new(2, 2, 2));
    }

    #[test]
    fn test_open_rejects_truncated_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.flat");
        let ds = synthesize(&GridSpec::with_shape(2, 2, 2), Some(9)).unwrap();
        FlatEncoding.write(&ds, ChunkGeometry::new(1, 1, 1), &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        let err = FlatEncoding.open(&path, None).unwrap_err();
        assert!(matches!(err, OpenError::Corrupt(_)), "{err}");
    }
}
