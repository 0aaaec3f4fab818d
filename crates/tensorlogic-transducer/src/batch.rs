//! Parallel batch execution.
//!
//! Each call gets its own rayon pool with one worker per example (optionally
//! capped). Results are collected by batch index, never by completion order,
//! and gradient buffers are split into disjoint per-example slices before any
//! worker runs.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::Reduction;
use crate::error::{TransducerError, TransducerResult};

/// Fan-out/fan-in executor for per-example work.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchScheduler {
    max_workers: Option<usize>,
}

impl BatchScheduler {
    /// Scheduler with one worker per example, capped at `max_workers`.
    pub fn new(max_workers: Option<usize>) -> Self {
        Self { max_workers }
    }

    /// Number of workers used for a batch of `batch_size` examples.
    pub fn num_workers(&self, batch_size: usize) -> usize {
        let cap = self.max_workers.unwrap_or(batch_size);
        batch_size.min(cap).max(1)
    }

    fn pool(&self, batch_size: usize) -> TransducerResult<ThreadPool> {
        ThreadPoolBuilder::new()
            .num_threads(self.num_workers(batch_size))
            .thread_name(|i| format!("transducer-worker-{}", i))
            .build()
            .map_err(|e| TransducerError::WorkerPool(e.to_string()))
    }

    /// Run `task` for every batch index and return the results in index
    /// order. The first error aborts the batch.
    pub fn map<T, F>(&self, batch_size: usize, task: F) -> TransducerResult<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> TransducerResult<T> + Sync + Send,
    {
        let pool = self.pool(batch_size)?;
        pool.install(|| (0..batch_size).into_par_iter().map(task).collect())
    }

    /// Split `buffer` into consecutive slices of `slice_len` and let
    /// `task(b, slice)` fill slice `b`.
    pub fn fill_slices<F>(
        &self,
        buffer: &mut [f64],
        slice_len: usize,
        task: F,
    ) -> TransducerResult<()>
    where
        F: Fn(usize, &mut [f64]) -> TransducerResult<()> + Sync + Send,
    {
        if slice_len == 0 || buffer.is_empty() {
            return Ok(());
        }
        if buffer.len() % slice_len != 0 {
            return Err(TransducerError::ShapeMismatch(format!(
                "Buffer of {} entries does not split into slices of {}",
                buffer.len(),
                slice_len
            )));
        }
        let pool = self.pool(buffer.len() / slice_len)?;
        pool.install(|| {
            buffer
                .par_chunks_mut(slice_len)
                .enumerate()
                .try_for_each(|(b, slice)| task(b, slice))
        })
    }
}

/// Per-example loss scales for `targets` under `reduction`.
pub fn reduction_scales(targets: &[Vec<usize>], reduction: Reduction) -> Vec<f64> {
    targets.iter().map(|t| reduction.scale(t.len())).collect()
}
