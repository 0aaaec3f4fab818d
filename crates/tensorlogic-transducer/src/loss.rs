//! Common interface for sequence losses.
//!
//! Sequence losses take `[batch, frames, classes]` scores and one label
//! sequence per example, unlike framewise losses whose targets have the same
//! shape as the predictions.

use scirs2_core::ndarray::{Array3, ArrayView3};
use std::fmt::Debug;

use crate::error::TransducerResult;
use crate::transducer::Transducer;

/// Trait for sequence-level loss functions.
pub trait SequenceLoss: Debug {
    /// Compute the scalar batch loss.
    fn compute(&self, scores: &ArrayView3<f64>, targets: &[Vec<usize>]) -> TransducerResult<f64>;

    /// Compute the gradient of the scalar loss with respect to `scores`.
    fn gradient(
        &self,
        scores: &ArrayView3<f64>,
        targets: &[Vec<usize>],
    ) -> TransducerResult<Array3<f64>>;

    /// Get the name of the loss function.
    fn name(&self) -> &str {
        "unknown"
    }
}

impl SequenceLoss for Transducer {
    fn compute(&self, scores: &ArrayView3<f64>, targets: &[Vec<usize>]) -> TransducerResult<f64> {
        self.loss(scores, targets)
    }

    fn gradient(
        &self,
        scores: &ArrayView3<f64>,
        targets: &[Vec<usize>],
    ) -> TransducerResult<Array3<f64>> {
        let forward = self.forward(scores, targets)?;
        self.backward(&forward, 1.0)
    }

    fn name(&self) -> &str {
        "transducer"
    }
}
