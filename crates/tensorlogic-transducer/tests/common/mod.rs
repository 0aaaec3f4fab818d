//! Helpers shared by the integration and property tests.

#![allow(dead_code)]

use scirs2_core::ndarray::{Array2, Array3, ArrayView2};
use std::collections::HashMap;
use tensorlogic_wfst::log_add;

fn lse(values: impl IntoIterator<Item = f64>) -> f64 {
    values
        .into_iter()
        .fold(f64::NEG_INFINITY, |acc, v| log_add(acc, v))
}

/// Deterministic scores in roughly `[-2, 2]`.
pub fn wavy_scores(batch: usize, frames: usize, classes: usize, seed: f64) -> Array3<f64> {
    Array3::from_shape_fn((batch, frames, classes), |(b, t, c)| {
        let x = seed + 1.3 * b as f64 + 0.7 * t as f64 + 2.9 * c as f64;
        2.0 * (x * 1.618).sin() * (0.37 * x).cos()
    })
}

/// Log-softmax of each row.
pub fn log_softmax_rows(scores: &ArrayView2<f64>) -> Array2<f64> {
    let mut out = scores.to_owned();
    for mut row in out.rows_mut() {
        let z = lse(row.iter().copied());
        row.mapv_inplace(|v| v - z);
    }
    out
}

/// Textbook CTC over normalized `log_probs`: returns `-log p(labels)` and
/// its gradient with respect to the unnormalized scores that produced
/// `log_probs` through a log-softmax.
pub fn reference_ctc(log_probs: &ArrayView2<f64>, labels: &[usize], blank: usize) -> (f64, Array2<f64>) {
    let (frames, classes) = log_probs.dim();
    let mut ext = vec![blank];
    for &l in labels {
        ext.push(l);
        ext.push(blank);
    }
    let states = ext.len();
    let skip_ok = |s: usize| s > 1 && ext[s] != blank && ext[s] != ext[s - 2];

    let mut alpha = Array2::from_elem((frames, states), f64::NEG_INFINITY);
    let mut beta = Array2::from_elem((frames, states), f64::NEG_INFINITY);
    if frames == 0 {
        let loss = if labels.is_empty() { 0.0 } else { f64::INFINITY };
        return (loss, Array2::zeros((0, classes)));
    }

    alpha[[0, 0]] = log_probs[[0, ext[0]]];
    if states > 1 {
        alpha[[0, 1]] = log_probs[[0, ext[1]]];
    }
    for t in 1..frames {
        for s in 0..states {
            let mut acc = alpha[[t - 1, s]];
            if s > 0 {
                acc = log_add(acc, alpha[[t - 1, s - 1]]);
            }
            if skip_ok(s) {
                acc = log_add(acc, alpha[[t - 1, s - 2]]);
            }
            alpha[[t, s]] = acc + log_probs[[t, ext[s]]];
        }
    }

    beta[[frames - 1, states - 1]] = 0.0;
    if states > 1 {
        beta[[frames - 1, states - 2]] = 0.0;
    }
    for t in (0..frames - 1).rev() {
        for s in 0..states {
            let mut acc = beta[[t + 1, s]] + log_probs[[t + 1, ext[s]]];
            if s + 1 < states {
                acc = log_add(acc, beta[[t + 1, s + 1]] + log_probs[[t + 1, ext[s + 1]]]);
            }
            if s + 2 < states && skip_ok(s + 2) {
                acc = log_add(acc, beta[[t + 1, s + 2]] + log_probs[[t + 1, ext[s + 2]]]);
            }
            beta[[t, s]] = acc;
        }
    }

    let mut log_z = alpha[[frames - 1, states - 1]];
    if states > 1 {
        log_z = log_add(log_z, alpha[[frames - 1, states - 2]]);
    }

    let mut grad = Array2::zeros((frames, classes));
    if log_z.is_finite() {
        for t in 0..frames {
            for s in 0..states {
                grad[[t, ext[s]]] -= (alpha[[t, s]] + beta[[t, s]] - log_z).exp();
            }
            let total: f64 = grad.row(t).sum();
            for c in 0..classes {
                grad[[t, c]] -= log_probs[[t, c]].exp() * total;
            }
        }
    }
    (-log_z, grad)
}

/// Index for single-character tokens.
pub fn char_index(chars: &str) -> HashMap<char, usize> {
    chars.chars().enumerate().map(|(i, c)| (c, i)).collect()
}
