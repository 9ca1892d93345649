// SPDX-License-Identifier: MIT OR Apache-2.0
//! Parallel execution contexts for gridbench
//!
//! An [`ExecutionContext`] owns a fixed pool of workers for the length of a
//! benchmark session. Callers submit a lazy [`Graph`] through
//! [`ExecutionContext::run_graph`], which blocks until every task has run,
//! returns the materialized [`ArrayResult`], and writes one [`Trace`] of
//! per-task timings.
//!
//! ```no_run
//! use gridbench_exec::{Block, ExecConfig, ExecutionContext, Graph};
//! use std::path::Path;
//!
//! let mut graph = Graph::new("sum", vec![]);
//! for i in 0..4 {
//!     graph.add_task(format!("part-{i}"), 0, move || Ok(Block::scalar(f64::from(i))));
//! }
//! let total = ExecutionContext::scoped(ExecConfig::new(2, 1), |ctx| {
//!     ctx.run_graph(&graph, Path::new("trace.json")).map(|(r, _)| r.sum())
//! });
//! ```

#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]

/// Worker pool lifecycle and graph evaluation
pub mod context;
/// Error types
pub mod error;
/// Computation graphs
pub mod graph;
/// Performance traces
pub mod trace;

pub use context::{CancelToken, ExecConfig, ExecutionContext};
pub use error::{ExecError, TaskError};
pub use graph::{ArrayResult, Block, Graph, Task};
pub use trace::{SchedulerEvent, TaskRecord, Trace, TraceHandle};
