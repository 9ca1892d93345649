// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-graph performance traces.

use crate::error::ExecError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Timing of one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task key
    pub key: String,
    /// Worker that ran the task
    pub worker: usize,
    /// Thread within the worker
    pub thread: usize,
    /// Start, seconds after graph submission
    pub start_s: f64,
    /// Run time in seconds
    pub duration_s: f64,
    /// Declared input bytes
    pub bytes: u64,
}

/// Scheduler milestone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerEvent {
    /// Seconds after graph submission
    pub at_s: f64,
    /// Event kind, e.g. `fan-out` or `task-failed`
    pub kind: String,
    /// Free-form detail
    pub detail: String,
}

/// Structured record of one `run_graph` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// Graph name
    pub graph: String,
    /// Wall-clock submission time
    pub started_at: DateTime<Utc>,
    /// Worker count of the context
    pub workers: usize,
    /// Threads per worker
    pub threads_per_worker: usize,
    /// Total memory budget, if any
    pub memory_limit_bytes: Option<u64>,
    /// `ok`, or the failure message
    pub status: String,
    /// Submission to completion, seconds
    pub wall_s: f64,
    /// Largest sum of declared bytes held by concurrently running tasks
    pub peak_bytes_in_flight: u64,
    /// Tasks in the graph
    pub task_count: usize,
    /// Per-task timings, in completion order
    pub tasks: Vec<TaskRecord>,
    /// Scheduler milestones
    pub events: Vec<SchedulerEvent>,
}

impl Trace {
    /// Write as pretty JSON, publishing the file only when complete.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Trace`] on any I/O failure.
    pub fn write(&self, path: &Path) -> Result<TraceHandle, ExecError> {
        let err = |source: std::io::Error| ExecError::Trace {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(err)?;
        }
        let mut staging = path.as_os_str().to_os_string();
        staging.push(".partial");
        let staging = PathBuf::from(staging);
        let result = (|| {
            let mut out = BufWriter::new(File::create(&staging)?);
            serde_json::to_writer_pretty(&mut out, self)?;
            out.write_all(b"\n")?;
            out.flush()?;
            drop(out);
            fs::rename(&staging, path)
        })();
        if let Err(e) = result {
            let _ = fs::remove_file(&staging);
            return Err(err(e));
        }
        Ok(TraceHandle {
            path: path.to_path_buf(),
            task_count: self.task_count,
            wall: Duration::from_secs_f64(self.wall_s.max(0.0)),
        })
    }

    /// Read a trace written by [`Trace::write`].
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Trace`] if the file is missing or malformed.
    pub fn read(path: &Path) -> Result<Self, ExecError> {
        let err = |source: std::io::Error| ExecError::Trace {
            path: path.to_path_buf(),
            source,
        };
        let text = fs::read_to_string(path).map_err(err)?;
        serde_json::from_str(&text).map_err(|e| err(e.into()))
    }
}

/// Reference to a written trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceHandle {
    /// Trace file
    pub path: PathBuf,
    /// Tasks recorded
    pub task_count: usize,
    /// Graph wall time
    pub wall: Duration,
}
