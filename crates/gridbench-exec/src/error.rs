// SPDX-License-Identifier: MIT OR Apache-2.0
//! Execution engine errors.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Error returned by a task body
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures acquiring a context or evaluating a graph
#[derive(Error, Debug)]
pub enum ExecError {
    /// Worker or thread counts are unusable
    #[error("invalid execution config: {0}")]
    InvalidConfig(String),

    /// The worker pool could not be started
    #[error("failed to start worker pool: {0}")]
    PoolBuild(#[from] rayon::ThreadPoolBuildError),

    /// The context was released before the call
    #[error("execution context already released")]
    Released,

    /// A task returned an error
    #[error("task {key} failed: {source}")]
    Task {
        /// Key of the failing task
        key: String,
        /// Error returned by the task
        #[source]
        source: TaskError,
    },

    /// A task panicked
    #[error("task {key} panicked: {message}")]
    TaskPanicked {
        /// Key of the failing task
        key: String,
        /// Panic payload, when it was a string
        message: String,
    },

    /// A task produced a block that does not fit the graph output
    #[error("task {key} produced a misplaced block: {reason}")]
    BlockShape {
        /// Key of the offending task
        key: String,
        /// How the block disagrees with the output
        reason: String,
    },

    /// A task needs more memory than one worker may hold
    #[error("task {key} needs {bytes} bytes, worker budget is {budget} bytes")]
    MemoryBudgetExceeded {
        /// Key of the offending task
        key: String,
        /// Declared input bytes
        bytes: u64,
        /// Per-worker budget
        budget: u64,
    },

    /// The graph was abandoned through its cancel token
    #[error("graph {graph} cancelled after {completed}/{total} tasks")]
    Cancelled {
        /// Graph name
        graph: String,
        /// Tasks finished before cancellation
        completed: usize,
        /// Tasks in the graph
        total: usize,
    },

    /// The graph exceeded its deadline
    #[error("graph {graph} timed out after {elapsed:?} ({completed}/{total} tasks)")]
    TimedOut {
        /// Graph name
        graph: String,
        /// Time spent before giving up
        elapsed: Duration,
        /// Tasks finished before the deadline
        completed: usize,
        /// Tasks in the graph
        total: usize,
    },

    /// The performance trace could not be written
    #[error("failed to write trace {}: {source}", path.display())]
    Trace {
        /// Trace path
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },
}
