// SPDX-License-Identifier: MIT OR Apache-2.0
//! Benchmark configuration, loadable from TOML.
//!
//! ```toml
//! artifact_root = "./data"
//! workers = 4
//! threads_per_worker = 2
//! memory_limit_bytes = 4000000000
//! strategies = ["365x1x1", { name = "tiny", chunks = "10x18x36" }]
//!
//! [grid]
//! time_len = 365
//! ```

use crate::chunk::ChunkGeometry;
use crate::grid::GridSpec;
use crate::window::SliceWindow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors loading or validating a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        /// Config file path
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`BenchConfig`]
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// The base configuration could not be layered under the file
    #[error("failed to layer config: {0}")]
    Layer(#[from] toml::ser::Error),
    /// A value is out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A named chunking strategy
///
/// In TOML either a bare `"TxYxX"` string, named after its chunk
/// identifier, or a `{ name, chunks }` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StrategyRepr")]
pub struct Strategy {
    /// Human label, e.g. `balanced`
    pub name: String,
    /// Block sizes
    pub chunks: ChunkGeometry,
}

impl Strategy {
    /// Create a named strategy.
    #[must_use]
    pub fn new(name: impl Into<String>, chunks: ChunkGeometry) -> Self {
        Self {
            name: name.into(),
            chunks,
        }
    }
}

impl From<ChunkGeometry> for Strategy {
    fn from(chunks: ChunkGeometry) -> Self {
        Self::new(chunks.to_string(), chunks)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == self.chunks.chunk_id().as_str() {
            write!(f, "{}", self.chunks)
        } else {
            write!(f, "{} ({})", self.name, self.chunks)
        }
    }
}

/// Parses `NAME=TxYxX` or a bare `TxYxX`.
impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((name, chunks)) if !name.trim().is_empty() => {
                Ok(Self::new(name.trim(), chunks.parse()?))
            }
            Some(_) => Err(format!("empty strategy name in {s:?}")),
            None => s.parse::<ChunkGeometry>().map(Self::from),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StrategyRepr {
    Bare(ChunkGeometry),
    Named { name: String, chunks: ChunkGeometry },
}

impl From<StrategyRepr> for Strategy {
    fn from(repr: StrategyRepr) -> Self {
        match repr {
            StrategyRepr::Bare(chunks) => chunks.into(),
            StrategyRepr::Named { name, chunks } => Self::new(name, chunks),
        }
    }
}

/// Default sweep: time-optimized, spatial-optimized, balanced, tiny-chunks.
#[must_use]
pub fn default_strategies() -> Vec<Strategy> {
    vec![
        Strategy::new("time-optimized", ChunkGeometry::new(365, 1, 1)),
        Strategy::new("spatial-optimized", ChunkGeometry::new(1, 180, 360)),
        Strategy::new("balanced", ChunkGeometry::new(100, 45, 90)),
        Strategy::new("tiny-chunks", ChunkGeometry::new(10, 18, 36)),
    ]
}

/// Everything a benchmark session needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Shape and metadata of the synthetic grid
    pub grid: GridSpec,
    /// Directory holding `temp_<ChunkID>.<ext>` artifacts
    pub artifact_root: PathBuf,
    /// Directory receiving performance traces
    pub trace_dir: PathBuf,
    /// Worker count of the execution context
    pub workers: usize,
    /// Threads per worker
    pub threads_per_worker: usize,
    /// Total memory budget shared by the workers
    pub memory_limit_bytes: Option<u64>,
    /// Seed for field values; fresh draws when absent
    pub seed: Option<u64>,
    /// Per-graph timeout in seconds
    pub timeout_secs: Option<f64>,
    /// Stop the sweep at the first failing strategy
    pub fail_fast: bool,
    /// zlib level for hierarchical store chunks; uncompressed when absent
    pub compression_level: Option<u32>,
    /// Spatial window reduced by the benchmark
    pub window: SliceWindow,
    /// Strategies swept by default
    pub strategies: Vec<Strategy>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            grid: GridSpec::default(),
            artifact_root: PathBuf::from("./data"),
            trace_dir: PathBuf::from("."),
            workers: 4,
            threads_per_worker: 2,
            memory_limit_bytes: Some(4_000_000_000),
            seed: None,
            timeout_secs: None,
            fail_fast: false,
            compression_level: Some(1),
            window: SliceWindow::default(),
            strategies: default_strategies(),
        }
    }
}

impl BenchConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on malformed TOML or out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document over `base`: keys present in `text` win, every
    /// other value, including nested `[grid]` keys, comes from `base`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on malformed TOML or out-of-range values.
    pub fn from_toml_str_over(text: &str, base: &Self) -> Result<Self, ConfigError> {
        let overlay: toml::Table = toml::from_str(text)?;
        let mut merged = match toml::Value::try_from(base)? {
            toml::Value::Table(table) => table,
            _ => toml::Table::new(),
        };
        merge_tables(&mut merged, overlay);
        let config: Self = toml::Value::Table(merged).try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Read a TOML file over `base`, see [`Self::from_toml_str_over`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or is invalid.
    pub fn load_over(path: &Path, base: &Self) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str_over(&text, base)?;
        tracing::debug!(path = %path.display(), "loaded config over base");
        Ok(config)
    }

    /// Per-graph deadline, if one is configured and representable.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// Check execution parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for zero workers or threads, a pool
    /// too large to count, a zero memory budget, a zlib level above 9, or a
    /// timeout that is not a positive representable duration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        if self.threads_per_worker == 0 {
            return Err(ConfigError::Invalid(
                "threads_per_worker must be at least 1".to_string(),
            ));
        }
        if self.workers.checked_mul(self.threads_per_worker).is_none() {
            return Err(ConfigError::Invalid(format!(
                "{} workers x {} threads overflows the thread count",
                self.workers, self.threads_per_worker
            )));
        }
        if self.memory_limit_bytes == Some(0) {
            return Err(ConfigError::Invalid(
                "memory_limit_bytes must be positive".to_string(),
            ));
        }
        if self.compression_level.is_some_and(|level| level > 9) {
            return Err(ConfigError::Invalid(
                "compression_level must be between 0 and 9".to_string(),
            ));
        }
        if let Some(secs) = self
            .timeout_secs
            .filter(|&secs| !(secs > 0.0 && Duration::try_from_secs_f64(secs).is_ok()))
        {
            return Err(ConfigError::Invalid(format!(
                "timeout_secs must be a positive representable duration, got {secs}"
            )));
        }
        Ok(())
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(inner)), toml::Value::Table(patch)) => {
                merge_tables(inner, patch);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_sweep() {
        let config = BenchConfig::default();
        assert_eq!(config.artifact_root, PathBuf::from("./data"));
        assert_eq!(config.workers, 4);
        assert_eq!(config.threads_per_worker, 2);
        assert_eq!(config.strategies.len(), 4);
        assert_eq!(config.strategies[3].name, "tiny-chunks");
        assert_eq!(config.strategies[3].chunks, ChunkGeometry::new(10, 18, 36));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = BenchConfig::from_toml_str(
            r#"
            workers = 2
            strategies = ["50x25x25", { name = "slab", chunks = "1x100x360" }]

            [grid]
            time_len = 30
            lat = { count = 100, min = -89.5, max = 89.5 }
            "#,
        )
        .unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.threads_per_worker, 2);
        assert_eq!(config.grid.shape(), [30, 100, 360]);
        assert_eq!(config.grid.field, "temperature");
        assert_eq!(
            config.strategies,
            vec![
                Strategy::from(ChunkGeometry::new(50, 25, 25)),
                Strategy::new("slab", ChunkGeometry::new(1, 100, 360)),
            ]
        );
    }

    #[test]
    fn test_rejects_zero_workers() {
        let err = BenchConfig::from_toml_str("workers = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_bad_strategy() {
        let err = BenchConfig::from_toml_str(r#"strategies = ["10x18"]"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_rejects_unrepresentable_timeout() {
        let config = BenchConfig {
            timeout_secs: Some(1e20),
            ..BenchConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(config.timeout(), None);
        let err = BenchConfig::from_toml_str("timeout_secs = -1.0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let ok = BenchConfig::from_toml_str("timeout_secs = 2.5").unwrap();
        assert_eq!(ok.timeout(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_rejects_overflowing_pool() {
        let config = BenchConfig {
            workers: usize::MAX,
            threads_per_worker: 2,
            ..BenchConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_strategy_parsing_and_display() {
        let named: Strategy = "balanced=100x45x90".parse().unwrap();
        assert_eq!(named, Strategy::new("balanced", ChunkGeometry::new(100, 45, 90)));
        assert_eq!(named.to_string(), "balanced (100x45x90)");
        let bare: Strategy = "10x18x36".parse().unwrap();
        assert_eq!(bare.name, "10x18x36");
        assert_eq!(bare.to_string(), "10x18x36");
        assert!("=10x18x36".parse::<Strategy>().is_err());
        assert!("tiny=10x18".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_file_layers_over_base() {
        let base = BenchConfig {
            grid: GridSpec::with_shape(365, 100, 100),
            workers: 2,
            threads_per_worker: 1,
            ..BenchConfig::default()
        };
        let config = BenchConfig::from_toml_str_over(
            "threads_per_worker = 3\n\n[grid]\ntime_len = 12\n",
            &base,
        )
        .unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.threads_per_worker, 3);
        assert_eq!(config.grid.shape(), [12, 100, 100]);
        assert_eq!(config.strategies, default_strategies());
        assert_eq!(config.memory_limit_bytes, Some(4_000_000_000));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.toml");
        std::fs::write(&path, "seed = 11\nfail_fast = true\n").unwrap();
        let config = BenchConfig::load(&path).unwrap();
        assert_eq!(config.seed, Some(11));
        assert!(config.fail_fast);
        assert!(BenchConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
