// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lazy map/fan-in computation graphs.
//!
//! Every task produces a [`Block`] placed at an offset inside the graph's
//! output. Blocks are summed into the output in task order, which keeps the
//! materialized result independent of scheduling.

use crate::error::{ExecError, TaskError};
use serde::Serialize;
use std::fmt;

/// Body of a task
pub type TaskFn = Box<dyn Fn() -> Result<Block, TaskError> + Send + Sync>;

/// Dense partial result positioned inside the graph output
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Position of the block's first element in the output
    pub offset: Vec<usize>,
    /// Block extent
    pub shape: Vec<usize>,
    /// Row-major values
    pub values: Vec<f64>,
}

impl Block {
    /// Create a block.
    #[must_use]
    pub const fn new(offset: Vec<usize>, shape: Vec<usize>, values: Vec<f64>) -> Self {
        Self {
            offset,
            shape,
            values,
        }
    }

    /// Single-value block for scalar reductions.
    #[must_use]
    pub fn scalar(value: f64) -> Self {
        Self::new(Vec::new(), Vec::new(), vec![value])
    }
}

/// One unit of work
pub struct Task {
    key: String,
    bytes: u64,
    run: TaskFn,
}

impl Task {
    /// Task identifier, unique within its graph.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Input bytes the task holds while running.
    #[must_use]
    pub const fn bytes(&self) -> u64 {
        self.bytes
    }

    pub(crate) fn run(&self) -> Result<Block, TaskError> {
        (self.run)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("key", &self.key)
            .field("bytes", &self.bytes)
            .finish_non_exhaustive()
    }
}

/// A named set of independent tasks summed into one output array
#[derive(Debug)]
pub struct Graph {
    name: String,
    output_shape: Vec<usize>,
    tasks: Vec<Task>,
}

impl Graph {
    /// Empty graph producing an array of `output_shape` (empty for a scalar).
    #[must_use]
    pub fn new(name: impl Into<String>, output_shape: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            output_shape,
            tasks: Vec::new(),
        }
    }

    /// Add a task that holds `bytes` of input while it runs.
    pub fn add_task<F>(&mut self, key: impl Into<String>, bytes: u64, run: F)
    where
        F: Fn() -> Result<Block, TaskError> + Send + Sync + 'static,
    {
        self.tasks.push(Task {
            key: key.into(),
            bytes,
            run: Box::new(run),
        });
    }

    /// Graph name, used in traces.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shape of the materialized result.
    #[must_use]
    pub fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    /// Tasks in submission order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the graph has no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Materialized graph output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrayResult {
    /// Extent of the result (empty for a scalar)
    pub shape: Vec<usize>,
    /// Row-major values
    pub values: Vec<f64>,
}

impl ArrayResult {
    pub(crate) fn zeros(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            values: vec![0.0; shape.iter().product()],
        }
    }

    /// Sum of all values.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// The value of a scalar result.
    #[must_use]
    pub fn scalar(&self) -> Option<f64> {
        if self.shape.is_empty() {
            self.values.first().copied()
        } else {
            None
        }
    }

    /// Value at a multi-dimensional index.
    #[must_use]
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.shape.len() || index.iter().zip(&self.shape).any(|(i, n)| i >= n) {
            return None;
        }
        let flat = index
            .iter()
            .zip(&self.shape)
            .fold(0, |acc, (i, n)| acc * n + i);
        self.values.get(flat).copied()
    }

    /// Add `block` into the result at its offset.
    pub(crate) fn accumulate(&mut self, key: &str, block: &Block) -> Result<(), ExecError> {
        let misplaced = |reason: String| ExecError::BlockShape {
            key: key.to_string(),
            reason,
        };
        let rank = self.shape.len();
        if block.offset.len() != rank || block.shape.len() != rank {
            return Err(misplaced(format!(
                "rank {} block in rank {rank} output",
                block.shape.len()
            )));
        }
        if block.values.len() != block.shape.iter().product::<usize>() {
            return Err(misplaced(format!(
                "{} values for shape {:?}",
                block.values.len(),
                block.shape
            )));
        }
        for axis in 0..rank {
            if block.offset[axis] + block.shape[axis] > self.shape[axis] {
                return Err(misplaced(format!(
                    "block {:?}+{:?} exceeds output {:?}",
                    block.offset, block.shape, self.shape
                )));
            }
        }
        if rank == 0 {
            self.values[0] += block.values[0];
            return Ok(());
        }
        let width = block.shape[rank - 1];
        if width == 0 {
            return Ok(());
        }
        for (row, src) in block.values.chunks_exact(width).enumerate() {
            // Decompose the row number into leading indices.
            let mut rest = row;
            let mut flat = 0;
            let mut leading = vec![0; rank - 1];
            for axis in (0..rank - 1).rev() {
                leading[axis] = rest % block.shape[axis];
                rest /= block.shape[axis];
            }
            for axis in 0..rank - 1 {
                flat = flat * self.shape[axis] + block.offset[axis] + leading[axis];
            }
            let start = flat * self.shape[rank - 1] + block.offset[rank - 1];
            for (dst, v) in self.values[start..start + width].iter_mut().zip(src) {
                *dst += v;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_2d_blocks() {
        let mut out = ArrayResult::zeros(&[3, 4]);
        out.accumulate("a", &Block::new(vec![1, 1], vec![2, 3], vec![1.0; 6]))
            .unwrap();
        out.accumulate("b", &Block::new(vec![0, 0], vec![3, 4], vec![0.5; 12]))
            .unwrap();
        assert_eq!(out.get(&[0, 0]), Some(0.5));
        assert_eq!(out.get(&[2, 3]), Some(1.5));
        assert_eq!(out.get(&[1, 0]), Some(0.5));
        assert_eq!(out.sum(), 12.0);
    }

    #[test]
    fn test_accumulate_scalar() {
        let mut out = ArrayResult::zeros(&[]);
        out.accumulate("a", &Block::scalar(2.0)).unwrap();
        out.accumulate("b", &Block::scalar(3.0)).unwrap();
        assert_eq!(out.scalar(), Some(5.0));
    }

    #[test]
    fn test_misplaced_blocks_are_rejected() {
        let mut out = ArrayResult::zeros(&[2, 2]);
        let err = out
            .accumulate("x", &Block::new(vec![1, 1], vec![2, 1], vec![1.0, 1.0]))
            .unwrap_err();
        assert!(matches!(err, ExecError::BlockShape { .. }));
        assert!(out.accumulate("y", &Block::scalar(1.0)).is_err());
        assert!(out
            .accumulate("z", &Block::new(vec![0, 0], vec![1, 2], vec![1.0]))
            .is_err());
    }

    #[test]
    fn test_get_out_of_range() {
        let out = ArrayResult::zeros(&[2, 2]);
        assert_eq!(out.get(&[2, 0]), None);
        assert_eq!(out.get(&[0]), None);
        assert_eq!(out.scalar(), None);
    }
}
