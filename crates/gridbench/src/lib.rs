// SPDX-License-Identifier: MIT OR Apache-2.0
//! gridbench - chunked gridded-dataset benchmarks
//!
//! Synthesizes a `(time, lat, lon)` field, persists it in a single-file
//! columnar encoding and a hierarchical chunked store under the same chunk
//! geometry, then times a windowed reduction over each on a parallel
//! execution context.
//!
//! - [`graph`] - reduction graphs over lazily chunked datasets
//! - [`runner`] - per-geometry benchmark of both encodings
//! - [`sweep`] - best-effort sweep over many geometries and its report
//! - [`mean`] - whole-grid mean of an in-memory chunked dataset
//!
//! ```no_run
//! use gridbench::{BenchConfig, Sweep};
//!
//! let config = BenchConfig::default();
//! let report = Sweep::from_config(&config).run(&config.strategies);
//! println!("{}", report.render_table());
//! ```

#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]

/// Reduction graphs
pub mod graph;
/// Whole-grid mean
pub mod mean;
/// Benchmark runner
pub mod runner;
/// Strategy sweeps
pub mod sweep;

pub use gridbench_core::{
    BenchConfig, BenchError, ChunkGeometry, ChunkId, Dataset, EncodingKind, GridSpec, Region,
    Result, SliceWindow, Strategy, default_strategies, synthesize, validate,
};
pub use gridbench_exec::{ExecConfig, ExecError, ExecutionContext, Trace, TraceHandle};
pub use gridbench_store::{ArtifactRef, ArtifactStore, LazyDataset};

pub use graph::{total_sum, window_time_sum};
pub use mean::{MeanReport, grid_mean};
pub use runner::{BenchmarkResult, BenchmarkRunner, EncodingRun};
pub use sweep::{StrategyOutcome, Sweep, SweepReport};
