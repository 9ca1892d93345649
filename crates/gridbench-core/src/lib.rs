// SPDX-License-Identifier: MIT OR Apache-2.0
//! Core types, error handling, and configuration for gridbench
//!
//! This crate provides the foundational types used across the gridbench crates:
//!
//! - [`error`] - Error taxonomy and Result alias
//! - [`grid`] - Grid description and the dataset synthesizer
//! - [`chunk`] - Chunk geometry, chunk identifiers, and the chunk planner
//! - [`encoding`] - Storage encoding identifiers and artifact naming
//! - [`window`] - Axis-relative slice windows
//! - [`config`] - TOML-backed benchmark configuration

#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(clippy::cargo)]

/// Chunk geometry and regions
pub mod chunk;
/// Benchmark configuration
pub mod config;
/// Storage encoding identifiers
pub mod encoding;
/// Error types for gridbench operations
pub mod error;
/// Grid description and synthesis
pub mod grid;
/// Slice windows
pub mod window;

// Re-exports for convenience
pub use chunk::{AXIS_NAMES, ChunkGeometry, ChunkId, Region, Shape3, validate};
pub use config::{BenchConfig, ConfigError, Strategy, default_strategies};
pub use encoding::EncodingKind;
pub use error::{BenchError, BoxError, Result};
pub use grid::{Axis, Dataset, GridSpec, synthesize};
pub use window::SliceWindow;
