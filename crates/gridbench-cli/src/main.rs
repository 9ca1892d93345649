// SPDX-License-Identifier: MIT OR Apache-2.0
//! gridbench CLI binary - chunked grid read benchmarks across storage encodings

use anyhow::Context;
use clap::Parser;
use gridbench::{
    BenchConfig, BenchmarkResult, BenchmarkRunner, ChunkGeometry, EncodingKind, ExecConfig,
    ExecutionContext, LazyDataset, Strategy, StrategyOutcome, Sweep, grid_mean, synthesize,
    validate,
};
use gridbench_cli::{Cli, Command};
use tracing::info;

fn main() {
    let cli = Cli::parse();
    gridbench_cli::init_tracing(cli.global.quiet);

    let defaults = cli.command.defaults();
    let result = cli.global.resolve_over(defaults).and_then(|config| match cli.command {
        Command::Sweep {
            strategies,
            fail_fast,
        } => run_sweep(&config, &strategies, fail_fast),
        Command::Write { chunks } => run_write(&config, chunks),
        Command::Bench { chunks } => run_bench(&config, chunks),
        Command::Mean { chunks } => run_mean(&config, chunks),
    });

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn run_sweep(config: &BenchConfig, strategies: &[Strategy], fail_fast: bool) -> anyhow::Result<bool> {
    let strategies = if strategies.is_empty() {
        config.strategies.as_slice()
    } else {
        strategies
    };
    let sweep = Sweep::from_config(config).with_fail_fast(config.fail_fast || fail_fast);
    let report = sweep.run_with(strategies, print_outcome);

    println!();
    print!("{}", report.render_table());
    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        println!("\nFailures:");
        for (strategy, error) in &failures {
            println!("  {strategy}: {error}");
        }
    }
    Ok(report.all_succeeded())
}

fn print_outcome(outcome: &StrategyOutcome) {
    println!("\nTesting chunks {}", outcome.strategy);
    match &outcome.outcome {
        Ok(result) => print_timings(result),
        Err(e) => println!("Failed: {e}"),
    }
}

fn print_timings(result: &BenchmarkResult) {
    for (kind, run) in &result.runs {
        let name = match kind {
            EncodingKind::ColumnarArray => "Columnar",
            EncodingKind::HierarchicalArrayStore => "Hierarchical",
        };
        println!("{name} time: {:.2}s", run.elapsed_secs);
    }
}

fn run_write(config: &BenchConfig, chunks: ChunkGeometry) -> anyhow::Result<bool> {
    let sweep = Sweep::from_config(config);
    sweep
        .write(chunks)
        .with_context(|| format!("writing chunks {chunks}"))?;
    let store = sweep.runner().store();
    for kind in EncodingKind::ALL {
        println!("Wrote {}", store.path(kind, &chunks.chunk_id()).display());
    }
    Ok(true)
}

fn run_bench(config: &BenchConfig, chunks: ChunkGeometry) -> anyhow::Result<bool> {
    let runner = BenchmarkRunner::from_config(config);
    let result = runner
        .benchmark(chunks)
        .with_context(|| format!("benchmarking chunks {chunks}"))?;
    print_timings(&result);
    for run in result.runs.values() {
        println!("Trace saved to: {}", run.trace.path.display());
    }
    Ok(true)
}

fn run_mean(config: &BenchConfig, chunks: ChunkGeometry) -> anyhow::Result<bool> {
    let grid = &config.grid;
    let exec = ExecConfig::new(config.workers, config.threads_per_worker)
        .with_memory_limit(config.memory_limit_bytes)
        .with_timeout(config.timeout());

    let chunks = validate(chunks, grid)?;
    let dataset = synthesize(grid, config.seed)?;
    let lazy = LazyDataset::in_memory(dataset, chunks);
    let trace_path = config.trace_dir.join("gridbench-report.json");

    info!(chunks = %chunks, "computing mean {} with performance trace", grid.field);
    let report = ExecutionContext::scoped(exec, |ctx| grid_mean(ctx, &lazy, &trace_path))?
        .context("computing grid mean")?;
    println!("Mean {}: {:.4}", grid.field, report.mean);
    println!("\nPerformance trace saved to: {}", report.trace.path.display());
    Ok(true)
}
