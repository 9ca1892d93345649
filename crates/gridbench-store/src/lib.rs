// SPDX-License-Identifier: MIT OR Apache-2.0
//! Storage encodings for gridbench
//!
//! Persists one dataset into two encodings under a shared chunk identifier and
//! reopens either as a lazily chunked dataset:
//! - [`flat`] - single-file columnar array, chunking supplied by the reader
//! - [`hierarchy`] - directory tree of chunk files with self-describing metadata
//! - [`source`] - lazily chunked datasets over any region reader
//! - [`atomic`] - rename-on-completion writes

#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]

/// Rename-on-completion writes
pub mod atomic;
/// Single-file columnar encoding
pub mod flat;
/// Hierarchical chunked store
pub mod hierarchy;
/// Region copies between dense arrays
pub mod layout;
/// Lazily chunked datasets
pub mod source;

pub use flat::FlatEncoding;
pub use hierarchy::StoreEncoding;
pub use source::{ChunkSource, LazyDataset, MemorySource};

use gridbench_core::{BenchError, ChunkGeometry, ChunkId, Dataset, EncodingKind, Result};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Reasons an artifact cannot be opened
#[derive(Error, Debug)]
pub enum OpenError {
    /// Nothing exists at the artifact path
    #[error("not found: {0}")]
    Missing(io::Error),
    /// Reading the artifact failed
    #[error("I/O error: {0}")]
    Io(io::Error),
    /// The artifact exists but does not decode
    #[error("corrupt: {0}")]
    Corrupt(String),
    /// The requested chunking does not fit the stored array
    #[error("unusable chunks: {0}")]
    Chunks(String),
}

impl OpenError {
    /// Classify an I/O error.
    #[must_use]
    pub fn from_io(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::NotFound {
            Self::Missing(e)
        } else {
            Self::Io(e)
        }
    }
}

/// A storage encoding: writes a dataset under a chunk geometry and reopens it lazily
pub trait ArrayEncoding: Send + Sync + fmt::Debug {
    /// Persist `dataset` at `path`, partitioned by `geometry`, all-or-nothing.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error; no readable artifact is left behind
    /// by a failed write.
    fn write(&self, dataset: &Dataset, geometry: ChunkGeometry, path: &Path) -> io::Result<()>;

    /// Open the artifact at `path` as a lazily chunked dataset.
    ///
    /// `chunks` overrides the access chunking; when absent the encoding's own
    /// chunking is used (one whole-array block if it records none).
    ///
    /// # Errors
    ///
    /// Returns [`OpenError`] when the artifact is missing, corrupt, or the
    /// chunking does not fit.
    fn open(&self, path: &Path, chunks: Option<ChunkGeometry>) -> std::result::Result<LazyDataset, OpenError>;
}

/// Location of one persisted artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    /// Encoding of the artifact
    pub encoding: EncodingKind,
    /// Chunk identifier shared by both encodings
    pub chunk_id: ChunkId,
    /// Filesystem path
    pub path: PathBuf,
}

/// Writes and reopens artifacts below a fixed root directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    columnar: FlatEncoding,
    hierarchical: StoreEncoding,
}

impl ArtifactStore {
    /// Store below `root` with zlib level-1 hierarchical chunks.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_store(root, StoreEncoding::zlib(1))
    }

    /// Store below `root` with an explicit hierarchical encoding.
    #[must_use]
    pub fn with_store(root: impl Into<PathBuf>, hierarchical: StoreEncoding) -> Self {
        Self {
            root: root.into(),
            columnar: FlatEncoding,
            hierarchical,
        }
    }

    /// Artifact root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The encoding implementation for `kind`.
    #[must_use]
    pub fn encoding(&self, kind: EncodingKind) -> &dyn ArrayEncoding {
        match kind {
            EncodingKind::ColumnarArray => &self.columnar,
            EncodingKind::HierarchicalArrayStore => &self.hierarchical,
        }
    }

    /// Path of the artifact for `(chunk_id, kind)`.
    #[must_use]
    pub fn path(&self, kind: EncodingKind, chunk_id: &ChunkId) -> PathBuf {
        kind.artifact_path(&self.root, chunk_id)
    }

    /// Persist `dataset` into both encodings, columnar first.
    ///
    /// Creates the root directory if absent and overwrites artifacts of an
    /// earlier run with the same chunk identifier.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::InvalidChunkGeometry`] if `geometry` does not fit
    /// the dataset, [`BenchError::ArtifactRoot`] if the root cannot be
    /// created, or [`BenchError::Write`] naming the encoding whose write failed.
    pub fn persist(
        &self,
        dataset: &Dataset,
        geometry: ChunkGeometry,
    ) -> Result<(ArtifactRef, ArtifactRef)> {
        let geometry = geometry.validate_shape(dataset.shape())?;
        std::fs::create_dir_all(&self.root).map_err(|source| BenchError::ArtifactRoot {
            path: self.root.clone(),
            source,
        })?;
        let columnar = self.persist_one(EncodingKind::ColumnarArray, dataset, geometry)?;
        let hierarchical = self.persist_one(EncodingKind::HierarchicalArrayStore, dataset, geometry)?;
        Ok((columnar, hierarchical))
    }

    fn persist_one(
        &self,
        kind: EncodingKind,
        dataset: &Dataset,
        geometry: ChunkGeometry,
    ) -> Result<ArtifactRef> {
        let chunk_id = geometry.chunk_id();
        let path = self.path(kind, &chunk_id);
        let start = std::time::Instant::now();
        self.encoding(kind)
            .write(dataset, geometry, &path)
            .map_err(|source| BenchError::Write {
                chunk_id: chunk_id.clone(),
                encoding: kind,
                path: path.clone(),
                source,
            })?;
        info!(
            chunk_id = %chunk_id,
            encoding = %kind,
            path = %path.display(),
            elapsed_s = start.elapsed().as_secs_f64(),
            "wrote artifact"
        );
        Ok(ArtifactRef {
            encoding: kind,
            chunk_id,
            path,
        })
    }

    /// Open the artifact for `(chunk_id, kind)`.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::ArtifactUnavailable`] naming the encoding when
    /// the artifact is missing, corrupt, or cannot take `chunks`.
    pub fn open(
        &self,
        kind: EncodingKind,
        chunk_id: &ChunkId,
        chunks: Option<ChunkGeometry>,
    ) -> Result<LazyDataset> {
        let path = self.path(kind, chunk_id);
        let lazy = self
            .encoding(kind)
            .open(&path, chunks)
            .map_err(|e| BenchError::ArtifactUnavailable {
                chunk_id: chunk_id.clone(),
                encoding: kind,
                path: path.clone(),
                reason: e.to_string(),
            })?;
        debug!(chunk_id = %chunk_id, encoding = %kind, chunks = %lazy.chunks(), "opened artifact");
        Ok(lazy)
    }

    /// Delete the artifact for `(chunk_id, kind)` if present.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::Write`] if removal fails.
    pub fn remove(&self, kind: EncodingKind, chunk_id: &ChunkId) -> Result<()> {
        let path = self.path(kind, chunk_id);
        atomic::remove_any(&path).map_err(|source| BenchError::Write {
            chunk_id: chunk_id.clone(),
            encoding: kind,
            path,
            source,
        })
    }
}
