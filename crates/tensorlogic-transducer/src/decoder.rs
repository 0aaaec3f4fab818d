//! Best-path decoding of frame-level scores into label sequences.

use std::fmt;
use std::iter::Peekable;

use scirs2_core::ndarray::ArrayView2;
use tensorlogic_wfst::{best_path, compose, Graph};

use crate::error::TransducerResult;
use crate::worker::emission_lattice;

/// Iterator adapter yielding the first item of every run of equal items.
pub struct CollapseRepeats<I: Iterator> {
    inner: Peekable<I>,
}

impl<I> Clone for CollapseRepeats<I>
where
    I: Iterator + Clone,
    I::Item: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<I> fmt::Debug for CollapseRepeats<I>
where
    I: Iterator + fmt::Debug,
    I::Item: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollapseRepeats")
            .field("inner", &self.inner)
            .finish()
    }
}

impl<I> Iterator for CollapseRepeats<I>
where
    I: Iterator,
    I::Item: PartialEq,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        while self.inner.next_if(|next| *next == item).is_some() {}
        Some(item)
    }
}

/// Collapse consecutive duplicates of `iter` lazily.
pub fn collapse_repeats<I>(iter: I) -> CollapseRepeats<I::IntoIter>
where
    I: IntoIterator,
    I::Item: PartialEq,
{
    CollapseRepeats {
        inner: iter.into_iter().peekable(),
    }
}

/// Decode one example against the token graph.
///
/// The class sequence of the best path through `scores ∘ tokens` is
/// collapsed first and only then stripped of `blank`, so two tokens separated
/// by a blank survive as two tokens.
pub fn decode_example(
    scores: &ArrayView2<f64>,
    tokens: &Graph,
    blank: Option<usize>,
) -> TransducerResult<Vec<usize>> {
    let lattice = emission_lattice(scores)?;
    let path = best_path(&compose(&lattice, tokens))?;
    let classes = path.input_labels().filter_map(|label| label.symbol());
    Ok(collapse_repeats(classes)
        .filter(|&class| Some(class) != blank)
        .collect())
}

/// Framewise argmax decoding: collapse repeats, then drop `blank`.
pub fn greedy_decode(scores: &ArrayView2<f64>, blank: Option<usize>) -> Vec<usize> {
    let best = scores.rows().into_iter().map(|row| {
        row.iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |(arg, max), (c, &v)| {
                if v > max {
                    (c, v)
                } else {
                    (arg, max)
                }
            })
            .0
    });
    collapse_repeats(best)
        .filter(|&class| Some(class) != blank)
        .collect()
}
