// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scoped execution contexts over a dedicated worker pool.

use crate::error::ExecError;
use crate::graph::{ArrayResult, Block, Graph, Task};
use crate::trace::{SchedulerEvent, TaskRecord, Trace, TraceHandle};
use chrono::Utc;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Sizing and limits of an execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecConfig {
    /// Number of workers
    pub workers: usize,
    /// Threads per worker
    pub threads_per_worker: usize,
    /// Total memory budget, split evenly between workers
    pub memory_limit_bytes: Option<u64>,
    /// Deadline for each `run_graph` call
    pub timeout: Option<Duration>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            threads_per_worker: 2,
            memory_limit_bytes: Some(4_000_000_000),
            timeout: None,
        }
    }
}

impl ExecConfig {
    /// Config with the given pool shape and no limits.
    #[must_use]
    pub const fn new(workers: usize, threads_per_worker: usize) -> Self {
        Self {
            workers,
            threads_per_worker,
            memory_limit_bytes: None,
            timeout: None,
        }
    }

    /// Set the total memory budget.
    #[must_use]
    pub const fn with_memory_limit(mut self, bytes: Option<u64>) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }

    /// Set the per-graph deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Pool size, saturating at `usize::MAX`.
    #[must_use]
    pub const fn total_threads(&self) -> usize {
        self.workers.saturating_mul(self.threads_per_worker)
    }

    /// Memory one worker may hold, if limited.
    #[must_use]
    pub const fn worker_budget(&self) -> Option<u64> {
        match self.memory_limit_bytes {
            Some(total) => Some(total / self.workers as u64),
            None => None,
        }
    }

    fn validate(&self) -> Result<(), ExecError> {
        if self.workers == 0 || self.threads_per_worker == 0 {
            return Err(ExecError::InvalidConfig(format!(
                "need at least one worker and thread, got {}x{}",
                self.workers, self.threads_per_worker
            )));
        }
        if self.workers.checked_mul(self.threads_per_worker).is_none() {
            return Err(ExecError::InvalidConfig(format!(
                "{}x{} threads overflows the pool size",
                self.workers, self.threads_per_worker
            )));
        }
        if self.worker_budget() == Some(0) {
            return Err(ExecError::InvalidConfig(
                "memory limit leaves workers no budget".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shared flag that abandons in-flight and future graphs of a context
///
/// Cancellation is permanent for the context: every later `run_graph`
/// fails with [`ExecError::Cancelled`]. Acquire a new context to continue.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Live handle to a worker pool
///
/// Released by [`ExecutionContext::release`] or, on every other path
/// including unwinding, when dropped.
#[derive(Debug)]
pub struct ExecutionContext {
    id: u64,
    config: ExecConfig,
    pool: Option<rayon::ThreadPool>,
    cancel: CancelToken,
}

enum Outcome {
    Done(Block, TaskRecord),
    Failed(ExecError),
    Skipped,
}

impl ExecutionContext {
    /// Start a worker pool.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::InvalidConfig`] for zero workers or threads and
    /// [`ExecError::PoolBuild`] if the threads cannot be spawned.
    pub fn acquire(config: ExecConfig) -> Result<Self, ExecError> {
        config.validate()?;
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let per_worker = config.threads_per_worker;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.total_threads())
            .thread_name(move |i| format!("gridbench{id}-w{}-t{}", i / per_worker, i % per_worker))
            .build()?;
        info!(
            context = id,
            workers = config.workers,
            threads_per_worker = config.threads_per_worker,
            memory_limit_bytes = ?config.memory_limit_bytes,
            "acquired execution context"
        );
        Ok(Self {
            id,
            config,
            pool: Some(pool),
            cancel: CancelToken::default(),
        })
    }

    /// Run `body` with a fresh context, releasing it however `body` exits.
    ///
    /// # Errors
    ///
    /// Returns the acquisition error; `body`'s own result is passed through.
    pub fn scoped<R, F>(config: ExecConfig, body: F) -> Result<R, ExecError>
    where
        F: FnOnce(&Self) -> R,
    {
        let ctx = Self::acquire(config)?;
        let result = body(&ctx);
        ctx.release();
        Ok(result)
    }

    /// Shut the worker pool down.
    pub fn release(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(pool) = self.pool.take() {
            drop(pool);
            info!(context = self.id, "released execution context");
        }
    }

    /// Context configuration.
    #[must_use]
    pub const fn config(&self) -> &ExecConfig {
        &self.config
    }

    /// Token that abandons graphs run on this context.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Evaluate `graph` on the workers, block until it completes, and write
    /// one trace to `trace_path`.
    ///
    /// Independent tasks run in any order; their blocks are summed in task
    /// order so the result depends only on the inputs. A trace is written
    /// for failed runs too.
    ///
    /// # Errors
    ///
    /// Returns the first failing task's error, [`ExecError::Cancelled`],
    /// [`ExecError::TimedOut`], [`ExecError::MemoryBudgetExceeded`] before
    /// any task starts, or [`ExecError::Trace`] if the trace cannot be written.
    pub fn run_graph(
        &self,
        graph: &Graph,
        trace_path: &Path,
    ) -> Result<(ArrayResult, TraceHandle), ExecError> {
        let pool = self.pool.as_ref().ok_or(ExecError::Released)?;
        let submitted = Instant::now();
        let started_at = Utc::now();
        let events = Mutex::new(vec![event(submitted, "graph-submitted", graph.name())]);

        let outcome = self
            .check_budget(graph)
            .and_then(|()| self.execute(pool, graph, submitted, &events));

        let (result, records, peak) = match outcome {
            Ok((result, records, peak)) => (Ok(result), records, peak),
            Err(e) => (Err(e), Vec::new(), 0),
        };
        let wall = submitted.elapsed();
        let status = match &result {
            Ok(_) => "ok".to_string(),
            Err(e) => e.to_string(),
        };
        let trace = Trace {
            graph: graph.name().to_string(),
            started_at,
            workers: self.config.workers,
            threads_per_worker: self.config.threads_per_worker,
            memory_limit_bytes: self.config.memory_limit_bytes,
            status,
            wall_s: wall.as_secs_f64(),
            peak_bytes_in_flight: peak,
            task_count: graph.len(),
            tasks: records,
            events: events.into_inner(),
        };

        match result {
            Ok(result) => {
                let handle = trace.write(trace_path)?;
                info!(
                    context = self.id,
                    graph = graph.name(),
                    tasks = graph.len(),
                    elapsed_s = wall.as_secs_f64(),
                    trace = %handle.path.display(),
                    "graph complete"
                );
                Ok((result, handle))
            }
            Err(e) => {
                if let Err(trace_err) = trace.write(trace_path) {
                    warn!(graph = graph.name(), error = %trace_err, "failed to write trace of failed graph");
                }
                Err(e)
            }
        }
    }

    fn check_budget(&self, graph: &Graph) -> Result<(), ExecError> {
        let Some(budget) = self.config.worker_budget() else {
            return Ok(());
        };
        match graph.tasks().iter().find(|t| t.bytes() > budget) {
            Some(task) => Err(ExecError::MemoryBudgetExceeded {
                key: task.key().to_string(),
                bytes: task.bytes(),
                budget,
            }),
            None => Ok(()),
        }
    }

    fn execute(
        &self,
        pool: &rayon::ThreadPool,
        graph: &Graph,
        submitted: Instant,
        events: &Mutex<Vec<SchedulerEvent>>,
    ) -> Result<(ArrayResult, Vec<TaskRecord>, u64), ExecError> {
        let deadline = self.config.timeout.map(|t| submitted + t);
        let abort = AtomicBool::new(false);
        let completed = AtomicUsize::new(0);
        let in_flight = AtomicU64::new(0);
        let peak = AtomicU64::new(0);
        let per_worker = self.config.threads_per_worker;

        events
            .lock()
            .push(event(submitted, "fan-out", &format!("{} tasks", graph.len())));

        let outcomes: Vec<Outcome> = pool.install(|| {
            graph
                .tasks()
                .par_iter()
                .map(|task| {
                    if abort.load(Ordering::Relaxed) {
                        return Outcome::Skipped;
                    }
                    if self.cancel.is_cancelled() {
                        abort.store(true, Ordering::Relaxed);
                        return Outcome::Failed(ExecError::Cancelled {
                            graph: graph.name().to_string(),
                            completed: completed.load(Ordering::Relaxed),
                            total: graph.len(),
                        });
                    }
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        abort.store(true, Ordering::Relaxed);
                        return Outcome::Failed(ExecError::TimedOut {
                            graph: graph.name().to_string(),
                            elapsed: submitted.elapsed(),
                            completed: completed.load(Ordering::Relaxed),
                            total: graph.len(),
                        });
                    }
                    let outcome = run_task(task, submitted, per_worker, &in_flight, &peak);
                    match &outcome {
                        Outcome::Done(..) => {
                            completed.fetch_add(1, Ordering::Relaxed);
                        }
                        Outcome::Failed(e) => {
                            abort.store(true, Ordering::Relaxed);
                            events.lock().push(event(submitted, "task-failed", &e.to_string()));
                        }
                        Outcome::Skipped => {}
                    }
                    outcome
                })
                .collect()
        });

        let mut result = ArrayResult::zeros(graph.output_shape());
        let mut records = Vec::with_capacity(outcomes.len());
        let mut first_error = None;
        for (task, outcome) in graph.tasks().iter().zip(outcomes) {
            match outcome {
                Outcome::Done(block, record) => {
                    if first_error.is_none() {
                        result.accumulate(task.key(), &block)?;
                    }
                    records.push(record);
                }
                Outcome::Failed(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Outcome::Skipped => {}
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        records.sort_by(|a, b| (a.start_s + a.duration_s).total_cmp(&(b.start_s + b.duration_s)));
        events
            .lock()
            .push(event(submitted, "fan-in-complete", &format!("{} blocks", records.len())));
        Ok((result, records, peak.load(Ordering::Relaxed)))
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_task(
    task: &Task,
    submitted: Instant,
    per_worker: usize,
    in_flight: &AtomicU64,
    peak: &AtomicU64,
) -> Outcome {
    let index = rayon::current_thread_index().unwrap_or(0);
    let held = in_flight.fetch_add(task.bytes(), Ordering::SeqCst) + task.bytes();
    peak.fetch_max(held, Ordering::SeqCst);

    let begin = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| task.run()));
    let duration = begin.elapsed();
    in_flight.fetch_sub(task.bytes(), Ordering::SeqCst);

    debug!(
        task = task.key(),
        worker = index / per_worker,
        duration_s = duration.as_secs_f64(),
        "task finished"
    );
    match result {
        Ok(Ok(block)) => Outcome::Done(
            block,
            TaskRecord {
                key: task.key().to_string(),
                worker: index / per_worker,
                thread: index % per_worker,
                start_s: (begin - submitted).as_secs_f64(),
                duration_s: duration.as_secs_f64(),
                bytes: task.bytes(),
            },
        ),
        Ok(Err(source)) => Outcome::Failed(ExecError::Task {
            key: task.key().to_string(),
            source,
        }),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic".to_string());
            Outcome::Failed(ExecError::TaskPanicked {
                key: task.key().to_string(),
                message,
            })
        }
    }
}

fn event(submitted: Instant, kind: &str, detail: &str) -> SchedulerEvent {
    SchedulerEvent {
        at_s: submitted.elapsed().as_secs_f64(),
        kind: kind.to_string(),
        detail: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_budget() {
        let config = ExecConfig::new(4, 2).with_memory_limit(Some(4_000));
        assert_eq!(config.total_threads(), 8);
        assert_eq!(config.worker_budget(), Some(1_000));
        assert_eq!(ExecConfig::new(1, 1).worker_budget(), None);
    }

    #[test]
    fn test_acquire_rejects_empty_pool() {
        assert!(matches!(
            ExecutionContext::acquire(ExecConfig::new(0, 1)),
            Err(ExecError::InvalidConfig(_))
        ));
        assert!(matches!(
            ExecutionContext::acquire(ExecConfig::new(2, 1).with_memory_limit(Some(1))),
            Err(ExecError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::default();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
