// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sweeps over chunk geometries and the comparison report.

use crate::runner::{BenchmarkResult, BenchmarkRunner};
use gridbench_core::{
    BenchConfig, BenchError, ChunkGeometry, EncodingKind, GridSpec, Result, Strategy, synthesize,
    validate,
};
use std::fmt::Write as _;
use tracing::{info, warn};

/// What happened to one strategy
#[derive(Debug)]
pub struct StrategyOutcome {
    /// Strategy attempted
    pub strategy: Strategy,
    /// Measurements, or the error that stopped this strategy
    pub outcome: Result<BenchmarkResult>,
}

impl StrategyOutcome {
    /// Chunk geometry of the strategy.
    #[must_use]
    pub const fn geometry(&self) -> ChunkGeometry {
        self.strategy.chunks
    }

    /// Whether the strategy was benchmarked.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Outcomes of a sweep, in sweep order
#[derive(Debug, Default)]
pub struct SweepReport {
    /// One entry per attempted strategy
    pub outcomes: Vec<StrategyOutcome>,
}

impl SweepReport {
    /// Successful measurements.
    pub fn successes(&self) -> impl Iterator<Item = &BenchmarkResult> {
        self.outcomes.iter().filter_map(|o| o.outcome.as_ref().ok())
    }

    /// Failed strategies with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&Strategy, &BenchError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.outcome.as_ref().err().map(|e| (&o.strategy, e)))
    }

    /// Whether every attempted strategy succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(StrategyOutcome::is_ok)
    }

    /// Plain-text table of elapsed seconds per strategy and encoding.
    #[must_use]
    pub fn render_table(&self) -> String {
        let width = self
            .outcomes
            .iter()
            .map(|o| o.strategy.name.len())
            .max()
            .unwrap_or(0)
            .max("strategy".len());
        let mut out = format!("{:<width$}  {:<14}", "strategy", "chunks");
        for kind in EncodingKind::ALL {
            let _ = write!(out, " {:>14}", kind.label());
        }
        out.push_str("  status\n");
        for o in &self.outcomes {
            let _ = write!(out, "{:<width$}  {:<14}", o.strategy.name, o.geometry().to_string());
            match &o.outcome {
                Ok(result) => {
                    for kind in EncodingKind::ALL {
                        match result.elapsed(kind) {
                            Some(secs) => {
                                let _ = write!(out, " {secs:>13.2}s");
                            }
                            None => {
                                let _ = write!(out, " {:>14}", "-");
                            }
                        }
                    }
                    out.push_str("  ok\n");
                }
                Err(e) => {
                    for _ in EncodingKind::ALL {
                        let _ = write!(out, " {:>14}", "-");
                    }
                    let _ = writeln!(out, "  failed: {e}");
                }
            }
        }
        out
    }
}

/// Synthesize, persist, and benchmark a list of strategies
#[derive(Debug, Clone)]
pub struct Sweep {
    grid: GridSpec,
    seed: Option<u64>,
    runner: BenchmarkRunner,
    fail_fast: bool,
}

impl Sweep {
    /// Sweep over `grid` with fresh random values per geometry.
    #[must_use]
    pub const fn new(grid: GridSpec, runner: BenchmarkRunner) -> Self {
        Self {
            grid,
            seed: None,
            runner,
            fail_fast: false,
        }
    }

    /// Sweep configured from a [`BenchConfig`].
    #[must_use]
    pub fn from_config(config: &BenchConfig) -> Self {
        Self::new(config.grid.clone(), BenchmarkRunner::from_config(config))
            .with_seed(config.seed)
            .with_fail_fast(config.fail_fast)
    }

    /// Seed the synthesized values; every geometry sees the same field.
    #[must_use]
    pub const fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Stop at the first failing strategy.
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Grid being swept.
    #[must_use]
    pub const fn grid(&self) -> &GridSpec {
        &self.grid
    }

    /// Runner used per geometry.
    #[must_use]
    pub const fn runner(&self) -> &BenchmarkRunner {
        &self.runner
    }

    /// Run every strategy in order.
    #[must_use]
    pub fn run(&self, strategies: &[Strategy]) -> SweepReport {
        self.run_with(strategies, |_| {})
    }

    /// Run every strategy in order, handing each outcome to `observe` as it
    /// completes.
    ///
    /// A failing strategy is recorded and the sweep moves on, unless
    /// fail-fast is set.
    #[must_use]
    pub fn run_with<F>(&self, strategies: &[Strategy], mut observe: F) -> SweepReport
    where
        F: FnMut(&StrategyOutcome),
    {
        let mut report = SweepReport::default();
        for strategy in strategies {
            let outcome = StrategyOutcome {
                strategy: strategy.clone(),
                outcome: self.run_one(strategy),
            };
            observe(&outcome);
            let failed = match &outcome.outcome {
                Ok(_) => false,
                Err(e) => {
                    warn!(strategy = %strategy.name, chunks = %strategy.chunks, error = %e, "strategy failed");
                    true
                }
            };
            report.outcomes.push(outcome);
            if failed && self.fail_fast {
                break;
            }
        }
        info!(
            attempted = report.outcomes.len(),
            failed = report.failures().count(),
            "sweep finished"
        );
        report
    }

    /// Persist a fresh dataset under `geometry` without benchmarking it.
    ///
    /// # Errors
    ///
    /// Returns the validation, synthesis, or write error.
    pub fn write(&self, geometry: ChunkGeometry) -> Result<()> {
        let geometry = validate(geometry, &self.grid)?;
        let dataset = synthesize(&self.grid, self.seed)?;
        self.runner.store().persist(&dataset, geometry)?;
        Ok(())
    }

    fn run_one(&self, strategy: &Strategy) -> Result<BenchmarkResult> {
        info!(strategy = %strategy.name, chunks = %strategy.chunks, "testing chunks");
        self.write(strategy.chunks)?;
        self.runner.benchmark(strategy.chunks)
    }
}
