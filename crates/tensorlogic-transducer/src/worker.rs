//! Per-example scoring and gradient extraction.
//!
//! Scoring is split into two phases. [`score_example`] builds the example's
//! graphs and returns its loss together with an [`ExampleTape`]; the tape
//! later turns into the gradient of that loss with respect to the example's
//! per-frame class scores. Every graph built here is owned by the tape of a
//! single example.

use scirs2_core::ndarray::ArrayView2;
use tensorlogic_wfst::{
    compose, intersect_traced, project_input, project_output, remove_epsilon, ArcTrace,
    ForwardScore, Graph,
};

use crate::builders::build_chain;
use crate::error::{TransducerError, TransducerResult};

/// The shared, read-only graphs every example is scored against.
#[derive(Clone, Copy, Debug)]
pub struct SharedGraphs<'a> {
    /// Class-to-token transducer
    pub tokens: &'a Graph,
    /// Grapheme-to-token transducer
    pub lexicon: &'a Graph,
    /// Optional global transition model
    pub transitions: Option<&'a Graph>,
}

/// Lattice over `[frames, classes]` scores with arc `t * C + c` weighted by
/// `scores[t, c]`.
pub fn emission_lattice(scores: &ArrayView2<f64>) -> TransducerResult<Graph> {
    let (frames, classes) = scores.dim();
    let mut graph = Graph::linear_chain(frames, classes);
    let weights: Vec<f64> = scores.iter().copied().collect();
    graph.set_weights(&weights)?;
    Ok(graph)
}

/// Acceptor over all class sequences that align with `target`.
///
/// The target is decomposed into tokens through the lexicon, and the token
/// graph expands each token sequence into its frame-level alignments.
pub fn alignment_graph(
    target: &[usize],
    lexicon: &Graph,
    tokens: &Graph,
) -> TransducerResult<Graph> {
    let chain = build_chain(target);
    let token_targets = remove_epsilon(&project_output(&compose(&chain, lexicon)))?;
    Ok(remove_epsilon(&project_input(&compose(tokens, &token_targets)))?)
}

/// Everything the reverse pass of one example needs.
#[derive(Debug)]
pub struct ExampleTape {
    numerator: ForwardScore,
    numerator_trace: ArcTrace,
    denominator: Option<ForwardScore>,
    emission_arcs: usize,
}

impl ExampleTape {
    /// Forward score of the emissions restricted to the alignments.
    pub fn numerator(&self) -> f64 {
        self.numerator.score()
    }

    /// Forward score against the transition model, if one is used.
    pub fn denominator(&self) -> Option<f64> {
        self.denominator.as_ref().map(|d| d.score())
    }

    /// Write `scale * d loss / d scores` into `dst`, one entry per
    /// `(frame, class)` in row-major order.
    pub fn emission_gradient(&self, scale: f64, dst: &mut [f64]) -> TransducerResult<()> {
        if self.denominator.is_some() {
            return Err(TransducerError::NotImplemented(
                "Gradients through transition graphs".to_string(),
            ));
        }
        if dst.len() != self.emission_arcs {
            return Err(TransducerError::ShapeMismatch(format!(
                "Gradient slice has {} entries, lattice has {} arcs",
                dst.len(),
                self.emission_arcs
            )));
        }

        dst.fill(0.0);
        // loss = -numerator
        let arc_grads = self.numerator.arc_gradients(-scale);
        self.numerator_trace.accumulate_left(&arc_grads, dst, 1.0);
        Ok(())
    }
}

/// Score one example: `-numerator`, or `denominator - numerator` when a
/// transition model is present.
///
/// `scores` are the example's `[frames, classes]` log-probabilities. An
/// unreachable target yields an infinite loss, not an error.
pub fn score_example(
    scores: &ArrayView2<f64>,
    target: &[usize],
    graphs: SharedGraphs<'_>,
) -> TransducerResult<(f64, ExampleTape)> {
    let emissions = emission_lattice(scores)?;
    let alignments = alignment_graph(target, graphs.lexicon, graphs.tokens)?;

    let (lattice, numerator_trace) = intersect_traced(&emissions, &alignments);
    let numerator = ForwardScore::compute(lattice)?;

    let denominator = match graphs.transitions {
        Some(transitions) => {
            let (lattice, _) = intersect_traced(&emissions, transitions);
            Some(ForwardScore::compute(lattice)?)
        }
        None => None,
    };

    let loss = match &denominator {
        Some(denominator) => denominator.score() - numerator.score(),
        None => -numerator.score(),
    };

    let tape = ExampleTape {
        numerator,
        numerator_trace,
        denominator,
        emission_arcs: emissions.num_arcs(),
    };
    Ok((loss, tape))
}
