// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error taxonomy shared by every gridbench crate.

use crate::chunk::ChunkId;
use crate::encoding::EncodingKind;
use std::path::PathBuf;
use thiserror::Error;

/// Boxed error produced by the execution engine.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while synthesizing, persisting, or benchmarking a grid
#[derive(Error, Debug)]
pub enum BenchError {
    /// The grid description has a non-positive axis or unusable bounds
    #[error("invalid grid spec: {0}")]
    InvalidSpec(String),

    /// A chunk block size is zero or larger than its axis
    #[error("invalid chunk geometry {geometry}: {reason}")]
    InvalidChunkGeometry {
        /// The rejected geometry, rendered as `TxYxX`
        geometry: String,
        /// What made it invalid
        reason: String,
    },

    /// Persisting one encoding failed
    #[error("failed to write {encoding} artifact for chunks {chunk_id} at {}: {source}", path.display())]
    Write {
        /// Chunk identifier of the artifact
        chunk_id: ChunkId,
        /// Encoding being written
        encoding: EncodingKind,
        /// Target path of the artifact
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The directory holding both encodings could not be created
    #[error("failed to create artifact root {}: {source}", path.display())]
    ArtifactRoot {
        /// Artifact root directory
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// An artifact is missing or cannot be decoded
    #[error("{encoding} artifact for chunks {chunk_id} unavailable at {}: {reason}", path.display())]
    ArtifactUnavailable {
        /// Chunk identifier of the artifact
        chunk_id: ChunkId,
        /// Encoding that could not be opened
        encoding: EncodingKind,
        /// Path that was checked
        path: PathBuf,
        /// Why the artifact is unusable
        reason: String,
    },

    /// The execution engine failed to evaluate a computation graph
    #[error("computation failed for {encoding} chunks {chunk_id}: {source}")]
    Computation {
        /// Chunk identifier of the benchmarked artifact
        chunk_id: ChunkId,
        /// Encoding being benchmarked
        encoding: EncodingKind,
        /// Engine failure
        #[source]
        source: BoxError,
    },
}

impl BenchError {
    /// Caller or configuration errors that are surfaced immediately and never retried.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSpec(_) | Self::InvalidChunkGeometry { .. }
        )
    }

    /// Encoding attached to an operational failure, if any.
    #[must_use]
    pub const fn encoding(&self) -> Option<EncodingKind> {
        match self {
            Self::Write { encoding, .. }
            | Self::ArtifactUnavailable { encoding, .. }
            | Self::Computation { encoding, .. } => Some(*encoding),
            Self::InvalidSpec(_) | Self::InvalidChunkGeometry { .. } | Self::ArtifactRoot { .. } => {
                None
            }
        }
    }
}

/// Result type alias for gridbench operations
pub type Result<T> = std::result::Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkGeometry;

    #[test]
    fn test_config_errors() {
        let err = BenchError::InvalidSpec("lat count is 0".to_string());
        assert!(err.is_config_error());
        assert_eq!(err.encoding(), None);
        assert_eq!(err.to_string(), "invalid grid spec: lat count is 0");
    }

    #[test]
    fn test_operational_errors_carry_encoding() {
        let err = BenchError::ArtifactUnavailable {
            chunk_id: ChunkGeometry::new(10, 18, 36).chunk_id(),
            encoding: EncodingKind::HierarchicalArrayStore,
            path: PathBuf::from("data/temp_10x18x36.store"),
            reason: "not found".to_string(),
        };
        assert!(!err.is_config_error());
        assert_eq!(err.encoding(), Some(EncodingKind::HierarchicalArrayStore));
        let msg = err.to_string();
        assert!(msg.contains("10x18x36"));
        assert!(msg.contains("HierarchicalArrayStore"));
    }

    #[test]
    fn test_write_error_source() {
        use std::error::Error as _;
        let err = BenchError::Write {
            chunk_id: ChunkGeometry::new(1, 2, 3).chunk_id(),
            encoding: EncodingKind::ColumnarArray,
            path: PathBuf::from("x"),
            source: std::io::Error::other("disk full"),
        };
        assert_eq!(err.source().map(ToString::to_string), Some("disk full".to_string()));
    }

    #[test]
    fn test_artifact_root_names_no_encoding() {
        let err = BenchError::ArtifactRoot {
            path: PathBuf::from("data"),
            source: std::io::Error::other("read-only"),
        };
        assert!(!err.is_config_error());
        assert_eq!(err.encoding(), None);
        assert_eq!(err.to_string(), "failed to create artifact root data: read-only");
    }
}
