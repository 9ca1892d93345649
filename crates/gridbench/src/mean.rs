// SPDX-License-Identifier: MIT OR Apache-2.0
//! Whole-grid mean of an in-memory chunked dataset.

use crate::graph::total_sum;
use gridbench_exec::{ExecError, ExecutionContext, TraceHandle};
use gridbench_store::LazyDataset;
use std::path::Path;
use tracing::info;

/// Mean over every axis, with the trace of its evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct MeanReport {
    /// Mean of every value in the field
    pub mean: f64,
    /// Number of values averaged
    pub count: usize,
    /// Trace written for the reduction
    pub trace: TraceHandle,
}

/// Mean of `lazy` over time, latitude, and longitude.
///
/// # Errors
///
/// Returns the engine error, including failure to write the trace.
pub fn grid_mean(
    ctx: &ExecutionContext,
    lazy: &LazyDataset,
    trace_path: &Path,
) -> Result<MeanReport, ExecError> {
    let count = lazy.shape().iter().product::<usize>();
    let (sum, trace) = ctx.run_graph(&total_sum(lazy), trace_path)?;
    let mean = sum.scalar().unwrap_or(0.0) / count.max(1) as f64;
    info!(mean, count, chunks = %lazy.chunks(), "computed grid mean");
    Ok(MeanReport { mean, count, trace })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridbench_core::{ChunkGeometry, GridSpec, synthesize};
    use gridbench_exec::{ExecConfig, Trace};

    #[test]
    fn test_mean_matches_direct_average() {
        let dir = tempfile::tempdir().unwrap();
        let ds = synthesize(&GridSpec::with_shape(30, 10, 10), Some(11)).unwrap();
        let direct = ds.values().iter().map(|v| f64::from(*v)).sum::<f64>() / 3000.0;
        let lazy = LazyDataset::in_memory(ds, ChunkGeometry::new(8, 4, 5));
        let path = dir.path().join("gridbench-report.json");

        let report = ExecutionContext::scoped(ExecConfig::new(2, 1), |ctx| grid_mean(ctx, &lazy, &path))
            .unwrap()
            .unwrap();

        assert_eq!(report.count, 3000);
        assert!((report.mean - direct).abs() < 1e-9);
        assert!(report.mean.abs() < 0.2);
        assert_eq!(Trace::read(&path).unwrap().task_count, 4 * 3 * 2);
    }
}
