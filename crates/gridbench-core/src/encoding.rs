// SPDX-License-Identifier: MIT OR Apache-2.0
//! Storage encoding identifiers and artifact naming.

use crate::chunk::ChunkId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Physical storage format of a persisted grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EncodingKind {
    /// Single-file flat array, chunk geometry supplied by the reader
    ColumnarArray,
    /// Directory tree of independently stored chunks with self-describing metadata
    HierarchicalArrayStore,
}

impl EncodingKind {
    /// Every encoding, in benchmark order.
    pub const ALL: [Self; 2] = [Self::ColumnarArray, Self::HierarchicalArrayStore];

    /// File extension distinguishing the artifact on disk.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::ColumnarArray => "flat",
            Self::HierarchicalArrayStore => "store",
        }
    }

    /// Short lowercase label used in trace file names and reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ColumnarArray => "columnar",
            Self::HierarchicalArrayStore => "hierarchical",
        }
    }

    /// Artifact name `temp_<ChunkID>.<ext>`.
    #[must_use]
    pub fn artifact_name(self, chunk_id: &ChunkId) -> String {
        format!("temp_{chunk_id}.{}", self.extension())
    }

    /// Full artifact path below `root`.
    #[must_use]
    pub fn artifact_path(self, root: &Path, chunk_id: &ChunkId) -> PathBuf {
        root.join(self.artifact_name(chunk_id))
    }
}

impl fmt::Display for EncodingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ColumnarArray => "ColumnarArray",
            Self::HierarchicalArrayStore => "HierarchicalArrayStore",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkGeometry;

    #[test]
    fn test_artifact_names() {
        let id = ChunkGeometry::new(10, 18, 36).chunk_id();
        assert_eq!(
            EncodingKind::ColumnarArray.artifact_name(&id),
            "temp_10x18x36.flat"
        );
        assert_eq!(
            EncodingKind::HierarchicalArrayStore.artifact_name(&id),
            "temp_10x18x36.store"
        );
        assert_eq!(
            EncodingKind::ColumnarArray.artifact_path(Path::new("data"), &id),
            PathBuf::from("data/temp_10x18x36.flat")
        );
    }

    #[test]
    fn test_benchmark_order() {
        assert!(EncodingKind::ColumnarArray < EncodingKind::HierarchicalArrayStore);
        assert_eq!(EncodingKind::ALL[0], EncodingKind::ColumnarArray);
    }
}
