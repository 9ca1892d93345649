// SPDX-License-Identifier: MIT OR Apache-2.0
//! # gridbench-cli
//!
//! Command-line interface for gridbench: persist a synthetic grid in two
//! storage encodings and time a windowed reduction over each.
//!
//! ## Usage
//!
//! ```bash
//! # Sweep the default strategies
//! gridbench sweep
//!
//! # Sweep chosen strategies on a smaller grid, stopping at the first failure
//! gridbench --time 100 sweep --strategy tiny=10x18x36 --strategy 100x45x90 --fail-fast
//!
//! # Persist, then benchmark, one geometry
//! gridbench write --chunks 10x18x36
//! gridbench bench --chunks 10x18x36
//!
//! # Whole-grid mean of an in-memory chunked grid
//! gridbench mean
//! ```
//!
//! ## Subcommands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sweep` | Write and benchmark every strategy, then print a comparison table |
//! | `write` | Write both artifacts for one geometry |
//! | `bench` | Benchmark existing artifacts for one geometry |
//! | `mean` | Mean over every axis of an in-memory chunked grid |
//!
//! Flags given on the command line override values from `--config`, which
//! override the subcommand's defaults. `mean` defaults to a 365x100x100 grid
//! on 2 workers of 1 thread; every other subcommand uses the full grid.

#![warn(missing_docs)]

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use gridbench::{BenchConfig, ChunkGeometry, GridSpec, Strategy};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parsed command line
#[derive(Debug, Parser)]
#[command(name = "gridbench")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Settings shared by every subcommand
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Flags accepted before any subcommand
#[derive(Debug, Default, Args)]
pub struct GlobalArgs {
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Artifact directory
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Trace directory
    #[arg(long, value_name = "DIR")]
    pub trace_dir: Option<PathBuf>,

    /// Worker count
    #[arg(long)]
    pub workers: Option<usize>,

    /// Threads per worker
    #[arg(long)]
    pub threads_per_worker: Option<usize>,

    /// Total memory budget in bytes
    #[arg(long, value_name = "BYTES")]
    pub memory_limit: Option<u64>,

    /// Seed for synthesized values
    #[arg(long)]
    pub seed: Option<u64>,

    /// Time steps in the grid
    #[arg(long)]
    pub time: Option<usize>,

    /// Latitude samples in the grid
    #[arg(long)]
    pub lat: Option<usize>,

    /// Longitude samples in the grid
    #[arg(long)]
    pub lon: Option<usize>,

    /// Per-graph timeout in seconds
    #[arg(long, value_name = "S")]
    pub timeout_secs: Option<f64>,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// Subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write and benchmark every strategy
    Sweep {
        /// Strategy as [NAME=]TIMExLATxLON (repeatable; default: configured strategies)
        #[arg(long = "strategy", value_name = "[NAME=]TxYxX")]
        strategies: Vec<Strategy>,

        /// Stop at the first failing strategy
        #[arg(long)]
        fail_fast: bool,
    },
    /// Write both artifacts for one geometry
    Write {
        /// Chunk geometry as TIMExLATxLON
        #[arg(long, value_name = "TxYxX")]
        chunks: ChunkGeometry,
    },
    /// Benchmark previously written artifacts
    Bench {
        /// Chunk geometry as TIMExLATxLON
        #[arg(long, value_name = "TxYxX")]
        chunks: ChunkGeometry,
    },
    /// Mean over every axis of an in-memory chunked grid
    Mean {
        /// Chunk geometry as TIMExLATxLON
        #[arg(long, value_name = "TxYxX", default_value = "50x25x25")]
        chunks: ChunkGeometry,
    },
}

impl Command {
    /// Settings the subcommand starts from before `--config` and flags.
    #[must_use]
    pub fn defaults(&self) -> BenchConfig {
        match self {
            Self::Mean { .. } => BenchConfig {
                grid: GridSpec::with_shape(365, 100, 100),
                workers: 2,
                threads_per_worker: 1,
                ..BenchConfig::default()
            },
            Self::Sweep { .. } | Self::Write { .. } | Self::Bench { .. } => BenchConfig::default(),
        }
    }
}

impl GlobalArgs {
    /// Load `--config` over the default configuration and apply
    /// command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or the merged
    /// configuration is invalid.
    pub fn resolve(&self) -> anyhow::Result<BenchConfig> {
        self.resolve_over(BenchConfig::default())
    }

    /// Load `--config` over `base` and apply command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or the merged
    /// configuration is invalid.
    pub fn resolve_over(&self, base: BenchConfig) -> anyhow::Result<BenchConfig> {
        let mut config = match &self.config {
            Some(path) => BenchConfig::load_over(path, &base)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => base,
        };
        self.apply(&mut config);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn apply(&self, config: &mut BenchConfig) {
        if let Some(dir) = &self.data_dir {
            config.artifact_root.clone_from(dir);
        }
        if let Some(dir) = &self.trace_dir {
            config.trace_dir.clone_from(dir);
        }
        if let Some(n) = self.workers {
            config.workers = n;
        }
        if let Some(n) = self.threads_per_worker {
            config.threads_per_worker = n;
        }
        if let Some(bytes) = self.memory_limit {
            config.memory_limit_bytes = Some(bytes);
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(n) = self.time {
            config.grid.time_len = n;
        }
        if let Some(n) = self.lat {
            config.grid.lat.count = n;
        }
        if let Some(n) = self.lon {
            config.grid.lon.count = n;
        }
        if self.timeout_secs.is_some() {
            config.timeout_secs = self.timeout_secs;
        }
    }
}

/// Install the stderr log subscriber.
///
/// `RUST_LOG` wins when set; otherwise gridbench crates log at `info`, or
/// at `warn` when `quiet`.
pub fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "warn,gridbench=info" };
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
                ),
        )
        .try_init();
}
