// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timed windowed reductions over both encodings of one chunk geometry.

use crate::graph::window_time_sum;
use gridbench_core::{BenchConfig, BenchError, ChunkGeometry, ChunkId, EncodingKind, Result, SliceWindow};
use gridbench_exec::{ExecConfig, ExecError, ExecutionContext, TraceHandle};
use gridbench_store::{ArtifactStore, StoreEncoding};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Measurements of one encoding
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingRun {
    /// Seconds from graph submission to materialized result
    pub elapsed_secs: f64,
    /// Trace written for the run
    pub trace: TraceHandle,
    /// Sum of the reduced window, for cross-encoding comparison
    pub checksum: f64,
}

/// Both encodings' measurements for one geometry
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkResult {
    /// Geometry benchmarked
    pub geometry: ChunkGeometry,
    /// One entry per encoding
    pub runs: BTreeMap<EncodingKind, EncodingRun>,
}

impl BenchmarkResult {
    /// Identifier of the benchmarked artifacts.
    #[must_use]
    pub fn chunk_id(&self) -> ChunkId {
        self.geometry.chunk_id()
    }

    /// Elapsed seconds for `kind`, if it ran.
    #[must_use]
    pub fn elapsed(&self, kind: EncodingKind) -> Option<f64> {
        self.runs.get(&kind).map(|run| run.elapsed_secs)
    }
}

/// Benchmarks persisted artifacts of one store
#[derive(Debug, Clone)]
pub struct BenchmarkRunner {
    store: ArtifactStore,
    trace_dir: PathBuf,
    window: SliceWindow,
    exec: ExecConfig,
}

impl BenchmarkRunner {
    /// Runner over `store` writing traces into `trace_dir`, with the default
    /// window and execution configuration.
    #[must_use]
    pub fn new(store: ArtifactStore, trace_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            trace_dir: trace_dir.into(),
            window: SliceWindow::default(),
            exec: ExecConfig::default(),
        }
    }

    /// Runner configured from a [`BenchConfig`].
    ///
    /// A timeout too large to represent runs without a deadline;
    /// [`BenchConfig::validate`] rejects it up front.
    #[must_use]
    pub fn from_config(config: &BenchConfig) -> Self {
        let store = ArtifactStore::with_store(
            &config.artifact_root,
            StoreEncoding::with_level(config.compression_level),
        );
        let exec = ExecConfig::new(config.workers, config.threads_per_worker)
            .with_memory_limit(config.memory_limit_bytes)
            .with_timeout(config.timeout());
        Self::new(store, &config.trace_dir).with_window(config.window).with_exec(exec)
    }

    /// Replace the reduced window.
    #[must_use]
    pub const fn with_window(mut self, window: SliceWindow) -> Self {
        self.window = window;
        self
    }

    /// Replace the execution configuration used by [`Self::benchmark`].
    #[must_use]
    pub const fn with_exec(mut self, exec: ExecConfig) -> Self {
        self.exec = exec;
        self
    }

    /// Artifact store being benchmarked.
    #[must_use]
    pub const fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Directory receiving traces.
    #[must_use]
    pub fn trace_dir(&self) -> &Path {
        &self.trace_dir
    }

    /// Trace file of one encoding's run.
    #[must_use]
    pub fn trace_path(&self, kind: EncodingKind, chunk_id: &ChunkId) -> PathBuf {
        self.trace_dir
            .join(format!("gridbench-report-{}-{chunk_id}.json", kind.label()))
    }

    /// Benchmark both encodings of `geometry` on a fresh execution context,
    /// released before returning.
    ///
    /// # Errors
    ///
    /// See [`Self::benchmark_with`]; a context that cannot be acquired is a
    /// [`BenchError::Computation`] against the first encoding.
    pub fn benchmark(&self, geometry: ChunkGeometry) -> Result<BenchmarkResult> {
        ExecutionContext::scoped(self.exec, |ctx| self.benchmark_with(ctx, geometry))
            .map_err(|e| computation(geometry.chunk_id(), EncodingKind::ColumnarArray, e))?
    }

    /// Benchmark both encodings of `geometry` on a caller-owned context.
    ///
    /// Encodings run in order columnar, then hierarchical. Only graph
    /// evaluation is timed; opening the artifact and building the window
    /// reduction happen before the clock starts.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::ArtifactUnavailable`] naming the encoding whose
    /// artifact is missing or unreadable, or [`BenchError::Computation`] if
    /// the engine fails.
    pub fn benchmark_with(
        &self,
        ctx: &ExecutionContext,
        geometry: ChunkGeometry,
    ) -> Result<BenchmarkResult> {
        let chunk_id = geometry.chunk_id();
        let mut runs = BTreeMap::new();
        for kind in EncodingKind::ALL {
            let run = self.run_one(ctx, kind, geometry, &chunk_id)?;
            runs.insert(kind, run);
        }
        let result = BenchmarkResult { geometry, runs };
        check_agreement(&result);
        Ok(result)
    }

    fn run_one(
        &self,
        ctx: &ExecutionContext,
        kind: EncodingKind,
        geometry: ChunkGeometry,
        chunk_id: &ChunkId,
    ) -> Result<EncodingRun> {
        // The columnar file records no chunking, so the reader supplies it.
        let chunks = match kind {
            EncodingKind::ColumnarArray => Some(geometry),
            EncodingKind::HierarchicalArrayStore => None,
        };
        let lazy = self.store.open(kind, chunk_id, chunks)?;
        let window = self.window.region(lazy.shape());
        let trace_path = self.trace_path(kind, chunk_id);

        let graph = window_time_sum(&lazy, window);
        let start = Instant::now();
        let (result, trace) = ctx
            .run_graph(&graph, &trace_path)
            .map_err(|e| computation(chunk_id.clone(), kind, e))?;
        let elapsed_secs = start.elapsed().as_secs_f64();

        info!(
            chunk_id = %chunk_id,
            encoding = %kind,
            elapsed_s = elapsed_secs,
            tasks = graph.len(),
            "benchmarked encoding"
        );
        Ok(EncodingRun {
            elapsed_secs,
            trace,
            checksum: result.sum(),
        })
    }
}

fn computation(chunk_id: ChunkId, encoding: EncodingKind, e: ExecError) -> BenchError {
    BenchError::Computation {
        chunk_id,
        encoding,
        source: Box::new(e),
    }
}

fn check_agreement(result: &BenchmarkResult) {
    let sums: Vec<f64> = result.runs.values().map(|run| run.checksum).collect();
    if let [first, rest @ ..] = sums.as_slice() {
        let tolerance = 1e-6 * first.abs().max(1.0);
        if rest.iter().any(|sum| (sum - first).abs() > tolerance) {
            warn!(chunk_id = %result.chunk_id(), checksums = ?sums, "encodings disagree on window sum");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_trace_path_names_encoding_and_chunks() {
        let runner = BenchmarkRunner::new(ArtifactStore::new("data"), "traces");
        let id = ChunkGeometry::new(10, 18, 36).chunk_id();
        assert_eq!(
            runner.trace_path(EncodingKind::HierarchicalArrayStore, &id),
            PathBuf::from("traces/gridbench-report-hierarchical-10x18x36.json")
        );
    }

    #[test]
    fn test_from_config_carries_limits() {
        let config = BenchConfig {
            workers: 3,
            threads_per_worker: 1,
            timeout_secs: Some(2.5),
            ..BenchConfig::default()
        };
        let runner = BenchmarkRunner::from_config(&config);
        assert_eq!(runner.exec.workers, 3);
        assert_eq!(runner.exec.timeout, Some(Duration::from_millis(2500)));
        assert_eq!(runner.exec.memory_limit_bytes, Some(4_000_000_000));
        assert_eq!(runner.store().root(), Path::new("./data"));
    }

    #[test]
    fn test_from_config_survives_huge_timeout() {
        let config = BenchConfig {
            timeout_secs: Some(1e20),
            ..BenchConfig::default()
        };
        assert!(config.validate().is_err());
        let runner = BenchmarkRunner::from_config(&config);
        assert_eq!(runner.exec.timeout, None);
    }
}
