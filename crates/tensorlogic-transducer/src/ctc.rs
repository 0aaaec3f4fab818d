//! Connectionist temporal classification as a transducer.
//!
//! Every label is its own single-grapheme token, class `num_labels` is the
//! blank, and a label can only follow itself across a blank.

use std::collections::HashMap;

use scirs2_core::ndarray::{Array3, ArrayView3, Axis};

use crate::config::{Reduction, TransducerConfig};
use crate::decoder::greedy_decode;
use crate::error::TransducerResult;
use crate::loss::SequenceLoss;
use crate::transducer::{Transducer, TransducerForward};

/// CTC loss over `num_labels` labels plus a trailing blank class.
#[derive(Debug, Clone)]
pub struct Ctc {
    transducer: Transducer,
    num_labels: usize,
}

impl Ctc {
    /// CTC whose per-example losses are divided by their target lengths.
    pub fn new(num_labels: usize) -> TransducerResult<Self> {
        Self::with_reduction(num_labels, Reduction::Mean)
    }

    /// CTC with an explicit reduction.
    pub fn with_reduction(num_labels: usize, reduction: Reduction) -> TransducerResult<Self> {
        let config = TransducerConfig::new()
            .with_blank(true)
            .with_allow_repeats(false)
            .with_reduction(reduction);
        Self::from_config(num_labels, config)
    }

    /// CTC with the reduction and worker cap of `config`. The blank and
    /// repeat settings are always overridden.
    pub fn from_config(num_labels: usize, config: TransducerConfig) -> TransducerResult<Self> {
        let tokens: Vec<Vec<usize>> = (0..num_labels).map(|l| vec![l]).collect();
        let index: HashMap<usize, usize> = (0..num_labels).map(|l| (l, l)).collect();
        let config = config.with_blank(true).with_allow_repeats(false);
        Ok(Self {
            transducer: Transducer::new(&tokens, &index, config)?,
            num_labels,
        })
    }

    /// Number of non-blank labels.
    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    /// Class index of the blank.
    pub fn blank(&self) -> usize {
        self.num_labels
    }

    /// Expected size of the class dimension, blank included.
    pub fn num_classes(&self) -> usize {
        self.num_labels + 1
    }

    /// The underlying transducer.
    pub fn transducer(&self) -> &Transducer {
        &self.transducer
    }

    /// Score a batch, see [`Transducer::forward`].
    pub fn forward(
        &self,
        scores: &ArrayView3<f64>,
        targets: &[Vec<usize>],
    ) -> TransducerResult<TransducerForward> {
        self.transducer.forward(scores, targets)
    }

    /// Gradient of `upstream * forward.value()`, see [`Transducer::backward`].
    pub fn backward(
        &self,
        forward: &TransducerForward,
        upstream: f64,
    ) -> TransducerResult<Array3<f64>> {
        self.transducer.backward(forward, upstream)
    }

    /// Scalar loss of a batch.
    pub fn loss(&self, scores: &ArrayView3<f64>, targets: &[Vec<usize>]) -> TransducerResult<f64> {
        self.transducer.loss(scores, targets)
    }

    /// Greedy framewise decoding of every example.
    pub fn decode(&self, scores: &ArrayView3<f64>) -> Vec<Vec<usize>> {
        scores
            .axis_iter(Axis(0))
            .map(|example| greedy_decode(&example, Some(self.blank())))
            .collect()
    }
}

impl SequenceLoss for Ctc {
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
        "ctc"
    }
}
