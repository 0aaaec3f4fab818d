//! Batched transducer loss.
//!
//! A [`Transducer`] owns the token and lexicon graphs built once at
//! construction. Every call scores a batch of `[B, T, C]` scores against
//! per-example grapheme targets in parallel, one worker per example.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use scirs2_core::ndarray::Array3;
//! use tensorlogic_transducer::{char_tokens, Transducer, TransducerConfig};
//!
//! let tokens = char_tokens(&["a", "b", "c"]);
//! let index: HashMap<char, usize> = [('a', 0), ('b', 1), ('c', 2)].into_iter().collect();
//! let config = TransducerConfig::new().with_blank(true);
//! let transducer = Transducer::new(&tokens, &index, config).unwrap();
//!
//! let scores = Array3::<f64>::zeros((1, 3, transducer.num_classes()));
//! let forward = transducer.forward(&scores.view(), &[vec![1, 2]]).unwrap();
//! let expected = -(0.25f64.powi(3) * 5.0).ln();
//! assert!((forward.value() - expected).abs() < 1e-9);
//!
//! let grad = transducer.backward(&forward, 1.0).unwrap();
//! assert_eq!(grad.dim(), (1, 3, 4));
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use scirs2_core::ndarray::{Array1, Array3, ArrayView1, ArrayView3, Axis};
use tensorlogic_wfst::Graph;

use crate::batch::{reduction_scales, BatchScheduler};
use crate::builders::{build_lexicon, build_token_graph};
use crate::config::TransducerConfig;
use crate::decoder::decode_example;
use crate::error::{TransducerError, TransducerResult};
use crate::worker::{score_example, ExampleTape, SharedGraphs};

/// Transducer loss over a token set and its grapheme decompositions.
#[derive(Debug, Clone)]
pub struct Transducer {
    tokens: Graph,
    lexicon: Graph,
    transitions: Option<Graph>,
    num_tokens: usize,
    num_graphemes: usize,
    config: TransducerConfig,
    scheduler: BatchScheduler,
}

/// Result of a forward pass, kept for the matching backward pass.
#[derive(Debug)]
pub struct TransducerForward {
    losses: Vec<f64>,
    scales: Vec<f64>,
    tapes: Vec<ExampleTape>,
    /// Normalized scores, present when log-softmax was applied
    log_probs: Option<Array3<f64>>,
    shape: (usize, usize, usize),
}

impl TransducerForward {
    /// Mean over the batch of the scaled per-example losses.
    pub fn value(&self) -> f64 {
        let total: f64 = self
            .losses
            .iter()
            .zip(&self.scales)
            .map(|(loss, scale)| loss * scale)
            .sum();
        total / self.losses.len() as f64
    }

    /// Scaled per-example losses.
    pub fn per_example(&self) -> Array1<f64> {
        self.losses
            .iter()
            .zip(&self.scales)
            .map(|(loss, scale)| loss * scale)
            .collect()
    }

    /// Unscaled per-example losses.
    pub fn raw_losses(&self) -> &[f64] {
        &self.losses
    }

    /// Number of examples in the batch.
    pub fn batch_size(&self) -> usize {
        self.losses.len()
    }

    /// `(B, T, C)` of the scores this pass was computed from.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }
}

impl Transducer {
    /// Build the loss for `tokens`, each a sequence of graphemes indexed by
    /// `graphemes_to_idx`.
    ///
    /// Class `i < tokens.len()` is token `i`; with blank enabled class
    /// `tokens.len()` is the blank.
    pub fn new<G>(
        tokens: &[Vec<G>],
        graphemes_to_idx: &HashMap<G, usize>,
        config: TransducerConfig,
    ) -> TransducerResult<Self>
    where
        G: Eq + Hash + Debug,
    {
        config.validate()?;
        let token_graph = build_token_graph(tokens.len(), config.blank, config.allow_repeats)?;
        let lexicon = build_lexicon(tokens, graphemes_to_idx)?;
        let num_graphemes = graphemes_to_idx.values().max().map_or(0, |&m| m + 1);

        log::debug!(
            "Built transducer: {} tokens, {} graphemes, blank={}, allow_repeats={}, lexicon {} nodes / {} arcs",
            tokens.len(),
            num_graphemes,
            config.blank,
            config.allow_repeats,
            lexicon.num_nodes(),
            lexicon.num_arcs()
        );

        Ok(Self {
            tokens: token_graph,
            lexicon,
            transitions: None,
            num_tokens: tokens.len(),
            num_graphemes,
            scheduler: BatchScheduler::new(config.max_workers),
            config,
        })
    }

    /// Class-to-token transducer.
    pub fn token_graph(&self) -> &Graph {
        &self.tokens
    }

    /// Grapheme-to-token transducer.
    pub fn lexicon_graph(&self) -> &Graph {
        &self.lexicon
    }

    /// Expected size of the class dimension.
    pub fn num_classes(&self) -> usize {
        self.num_tokens + usize::from(self.config.blank)
    }

    /// One past the largest grapheme index of the lexicon.
    pub fn num_graphemes(&self) -> usize {
        self.num_graphemes
    }

    /// Class index of the blank, if enabled.
    pub fn blank_index(&self) -> Option<usize> {
        self.config.blank.then_some(self.num_tokens)
    }

    /// Configuration the loss was built with.
    pub fn config(&self) -> &TransducerConfig {
        &self.config
    }

    fn shared_graphs(&self) -> SharedGraphs<'_> {
        SharedGraphs {
            tokens: &self.tokens,
            lexicon: &self.lexicon,
            transitions: self.transitions.as_ref(),
        }
    }

    fn check_classes(&self, classes: usize) -> TransducerResult<()> {
        if classes != self.num_classes() {
            return Err(TransducerError::ShapeMismatch(format!(
                "Expected {} classes, got {}",
                self.num_classes(),
                classes
            )));
        }
        Ok(())
    }

    fn validate_inputs(
        &self,
        scores: &ArrayView3<f64>,
        targets: &[Vec<usize>],
    ) -> TransducerResult<()> {
        let (batch, _, classes) = scores.dim();
        if batch == 0 {
            return Err(TransducerError::ShapeMismatch(
                "Empty batch".to_string(),
            ));
        }
        if targets.len() != batch {
            return Err(TransducerError::ShapeMismatch(format!(
                "Got {} targets for a batch of {}",
                targets.len(),
                batch
            )));
        }
        self.check_classes(classes)?;
        for (b, target) in targets.iter().enumerate() {
            if let Some(&label) = target.iter().find(|&&l| l >= self.num_graphemes) {
                return Err(TransducerError::ShapeMismatch(format!(
                    "Target {} contains grapheme {} but only {} graphemes are indexed",
                    b, label, self.num_graphemes
                )));
            }
        }
        Ok(())
    }

    /// Score a batch and keep what the backward pass needs.
    pub fn forward(
        &self,
        scores: &ArrayView3<f64>,
        targets: &[Vec<usize>],
    ) -> TransducerResult<TransducerForward> {
        self.validate_inputs(scores, targets)?;
        let shape = scores.dim();
        let batch = shape.0;

        let log_probs = match self.transitions {
            Some(_) => None,
            None => Some(log_softmax(scores)),
        };
        let inputs = log_probs.as_ref().map_or(scores.view(), |lp| lp.view());

        log::debug!(
            "Transducer forward: batch={}, frames={}, classes={}, reduction={}, workers={}",
            shape.0,
            shape.1,
            shape.2,
            self.config.reduction,
            self.scheduler.num_workers(batch)
        );

        let graphs = self.shared_graphs();
        let results = self.scheduler.map(batch, |b| {
            let example = inputs.index_axis(Axis(0), b);
            let (loss, tape) = score_example(&example, &targets[b], graphs)?;
            log::trace!(
                "Example {}: target length {}, loss {:.6}",
                b,
                targets[b].len(),
                loss
            );
            Ok((loss, tape))
        })?;

        let (losses, tapes): (Vec<f64>, Vec<ExampleTape>) = results.into_iter().unzip();
        for (b, loss) in losses.iter().enumerate().filter(|(_, l)| !l.is_finite()) {
            log::warn!("Example {} has non-finite loss {}", b, loss);
        }

        Ok(TransducerForward {
            losses,
            scales: reduction_scales(targets, self.config.reduction),
            tapes,
            log_probs,
            shape,
        })
    }

    /// Scalar loss of a batch.
    pub fn loss(&self, scores: &ArrayView3<f64>, targets: &[Vec<usize>]) -> TransducerResult<f64> {
        Ok(self.forward(scores, targets)?.value())
    }

    /// Scaled per-example losses of a batch.
    pub fn loss_per_example(
        &self,
        scores: &ArrayView3<f64>,
        targets: &[Vec<usize>],
    ) -> TransducerResult<Array1<f64>> {
        Ok(self.forward(scores, targets)?.per_example())
    }

    /// Gradient of `upstream * forward.value()` with respect to the scores.
    pub fn backward(
        &self,
        forward: &TransducerForward,
        upstream: f64,
    ) -> TransducerResult<Array3<f64>> {
        let weight = upstream / forward.batch_size() as f64;
        self.backward_weighted(forward, |_| weight)
    }

    /// Gradient of `upstream · forward.per_example()` with respect to the
    /// scores.
    pub fn backward_per_example(
        &self,
        forward: &TransducerForward,
        upstream: &ArrayView1<f64>,
    ) -> TransducerResult<Array3<f64>> {
        if upstream.len() != forward.batch_size() {
            return Err(TransducerError::ShapeMismatch(format!(
                "Upstream gradient has {} entries for a batch of {}",
                upstream.len(),
                forward.batch_size()
            )));
        }
        self.backward_weighted(forward, |b| upstream[b])
    }

    fn backward_weighted<F>(
        &self,
        forward: &TransducerForward,
        weight: F,
    ) -> TransducerResult<Array3<f64>>
    where
        F: Fn(usize) -> f64 + Sync + Send,
    {
        let (batch, frames, classes) = forward.shape;
        let slice_len = frames * classes;
        let mut buffer = vec![0.0; batch * slice_len];

        self.scheduler.fill_slices(&mut buffer, slice_len, |b, slice| {
            forward.tapes[b].emission_gradient(forward.scales[b] * weight(b), slice)?;
            if let Some(log_probs) = &forward.log_probs {
                let example = log_probs.index_axis(Axis(0), b);
                for (grad_row, lp_row) in slice.chunks_mut(classes).zip(example.rows()) {
                    let total: f64 = grad_row.iter().sum();
                    for (g, &lp) in grad_row.iter_mut().zip(lp_row.iter()) {
                        *g -= lp.exp() * total;
                    }
                }
            }
            Ok(())
        })?;

        Array3::from_shape_vec(forward.shape, buffer)
            .map_err(|e| TransducerError::ShapeMismatch(e.to_string()))
    }

    /// Best-path label sequences, blank removed.
    pub fn decode(&self, scores: &ArrayView3<f64>) -> TransducerResult<Vec<Vec<usize>>> {
        let (batch, _, classes) = scores.dim();
        self.check_classes(classes)?;
        let blank = self.blank_index();
        self.scheduler.map(batch, |b| {
            decode_example(&scores.index_axis(Axis(0), b), &self.tokens, blank)
        })
    }
}

/// Log-softmax over the class axis. Rows that are entirely `-inf` stay so.
fn log_softmax(scores: &ArrayView3<f64>) -> Array3<f64> {
    let mut out = scores.to_owned();
    for mut row in out.lanes_mut(Axis(2)) {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        if max == f64::NEG_INFINITY {
            continue;
        }
        let lse = max + row.iter().map(|&v| (v - max).exp()).sum::<f64>().ln();
        row.mapv_inplace(|v| v - lse);
    }
    out
}
