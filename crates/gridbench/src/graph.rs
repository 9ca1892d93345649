// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reduction graphs over lazily chunked datasets.
//!
//! One task per chunk block touched by the reduction; each task reads only
//! its block from the dataset's source.

use gridbench_core::Region;
use gridbench_exec::{Block, Graph};
use gridbench_store::LazyDataset;

/// Sum over time of the field restricted to `window`.
///
/// The output has shape `[lat, lon]` of the window; task keys are the block
/// indices `t.y.x` of the dataset's chunk geometry. `window` must lie inside
/// the dataset.
#[must_use]
pub fn window_time_sum(lazy: &LazyDataset, window: Region) -> Graph {
    let extent = window.shape();
    let mut graph = Graph::new("window-time-sum", vec![extent[1], extent[2]]);
    let chunks = lazy.chunks();
    for (index, overlap) in chunks.blocks_within(lazy.shape(), window) {
        let source = lazy.source();
        let offset = vec![
            overlap.start[1] - window.start[1],
            overlap.start[2] - window.start[2],
        ];
        let [steps, rows, cols] = overlap.shape();
        let bytes = (overlap.len() * size_of::<f32>()) as u64;
        graph.add_task(block_key(index), bytes, move || {
            let data = source.read_region(&overlap)?;
            let mut sums = vec![0.0_f64; rows * cols];
            for step in data.chunks_exact(rows * cols).take(steps) {
                for (acc, v) in sums.iter_mut().zip(step) {
                    *acc += f64::from(*v);
                }
            }
            Ok(Block::new(offset.clone(), vec![rows, cols], sums))
        });
    }
    graph
}

/// Sum of every value in the field, one scalar partial per block.
#[must_use]
pub fn total_sum(lazy: &LazyDataset) -> Graph {
    let mut graph = Graph::new("total-sum", Vec::new());
    let chunks = lazy.chunks();
    for (index, block) in chunks.blocks(lazy.shape()) {
        let source = lazy.source();
        let bytes = (block.len() * size_of::<f32>()) as u64;
        graph.add_task(block_key(index), bytes, move || {
            let data = source.read_region(&block)?;
            Ok(Block::scalar(data.iter().map(|v| f64::from(*v)).sum()))
        });
    }
    graph
}

fn block_key([t, y, x]: [usize; 3]) -> String {
    format!("{t}.{y}.{x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridbench_core::{ChunkGeometry, GridSpec, SliceWindow, synthesize};
    use gridbench_exec::{ExecConfig, ExecutionContext};

    fn brute_force(ds: &gridbench_core::Dataset, window: Region) -> Vec<f64> {
        let mut out = Vec::new();
        for y in window.start[1]..window.end[1] {
            for x in window.start[2]..window.end[2] {
                let mut sum = 0.0;
                for t in window.start[0]..window.end[0] {
                    sum += f64::from(ds.get(t, y, x).unwrap());
                }
                out.push(sum);
            }
        }
        out
    }

    #[test]
    fn test_window_sum_matches_brute_force() {
        let dir = tempfile::tempdir().unwrap();
        let ds = synthesize(&GridSpec::with_shape(12, 20, 24), Some(9)).unwrap();
        let window = SliceWindow::default().region(ds.shape());
        let expected = brute_force(&ds, window);
        let lazy = LazyDataset::in_memory(ds, ChunkGeometry::new(5, 3, 7));
        let graph = window_time_sum(&lazy, window);
        // 3 time blocks, lat 5..10 spans blocks 1..=3, lon 6..12 spans blocks 0..=1
        assert_eq!(graph.len(), 3 * 3 * 2);

        let ctx = ExecutionContext::acquire(ExecConfig::new(2, 1)).unwrap();
        let (result, _) = ctx.run_graph(&graph, &dir.path().join("t.json")).unwrap();
        assert_eq!(result.shape, vec![5, 6]);
        for (got, want) in result.values.iter().zip(&expected) {
            assert!((got - want).abs() < 1e-9, "{got} != {want}");
        }
    }

    #[test]
    fn test_total_sum_has_one_task_per_block() {
        let ds = synthesize(&GridSpec::with_shape(4, 4, 4), Some(1)).unwrap();
        let expected: f64 = ds.values().iter().map(|v| f64::from(*v)).sum();
        let lazy = LazyDataset::in_memory(ds, ChunkGeometry::new(3, 2, 4));
        let graph = total_sum(&lazy);
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.tasks()[3].key(), "1.1.0");

        let dir = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::acquire(ExecConfig::new(1, 2)).unwrap();
        let (result, _) = ctx.run_graph(&graph, &dir.path().join("t.json")).unwrap();
        assert!((result.scalar().unwrap() - expected).abs() < 1e-9);
    }
}
