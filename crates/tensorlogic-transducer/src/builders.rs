//! Static graphs of a transducer loss.
//!
//! - Chain graph: accepts exactly one grapheme sequence
//! - Lexicon graph: transduces grapheme sequences to token indices
//! - Token graph: transduces per-frame class sequences to token sequences,
//!   with optional blank and repeat constraints

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use tensorlogic_wfst::{Graph, EPSILON};

use crate::error::{TransducerError, TransducerResult};

/// Linear acceptor for `sequence`.
///
/// Node 0 is the start node and the last node accepts; for an empty sequence
/// node 0 does both.
pub fn build_chain(sequence: &[usize]) -> Graph {
    let mut graph = Graph::new();
    graph.add_node(true, sequence.is_empty());
    for (i, &label) in sequence.iter().enumerate() {
        graph.add_node(false, i + 1 == sequence.len());
        graph.add_arc(i, i + 1, label);
    }
    graph
}

/// Transducer from graphemes to token indices.
///
/// Every token is a loop through node 0 that reads its graphemes and writes
/// the token index on the last one.
pub fn build_lexicon<G>(
    tokens: &[Vec<G>],
    graphemes_to_idx: &HashMap<G, usize>,
) -> TransducerResult<Graph>
where
    G: Eq + Hash + Debug,
{
    let index_of = |g: &G| {
        graphemes_to_idx
            .get(g)
            .copied()
            .ok_or_else(|| TransducerError::KeyMissing {
                grapheme: format!("{:?}", g),
            })
    };

    let mut graph = Graph::new();
    graph.add_node(true, true);
    for (token, graphemes) in tokens.iter().enumerate() {
        let Some((last, prefix)) = graphemes.split_last() else {
            return Err(TransducerError::ConfigError(format!(
                "Token {} has no graphemes",
                token
            )));
        };
        let mut prev = 0;
        for g in prefix {
            let next = graph.add_node(false, false);
            graph.add_transducer_arc(prev, next, index_of(g)?, EPSILON);
            prev = next;
        }
        graph.add_transducer_arc(prev, 0, index_of(last)?, token);
    }
    Ok(graph)
}

/// Transducer from class sequences to token sequences.
///
/// A run of one or more frames of class `i` writes token `i` once. With
/// `blank`, class `token_count` is a blank that writes nothing. Without
/// `allow_repeats` a token can only follow itself across a blank.
pub fn build_token_graph(
    token_count: usize,
    blank: bool,
    allow_repeats: bool,
) -> TransducerResult<Graph> {
    if !allow_repeats && !blank {
        return Err(TransducerError::ConfigError(
            "Must use blank if disallowing repeats".to_string(),
        ));
    }

    let mut graph = Graph::new();
    graph.add_node(true, true);
    for i in 0..token_count {
        graph.add_node(false, true);
        graph.add_transducer_arc(0, i + 1, i, i);
        graph.add_transducer_arc(i + 1, i + 1, i, EPSILON);
        if allow_repeats {
            graph.add_transducer_arc(i + 1, 0, EPSILON, EPSILON);
        }
    }

    let blank_node = token_count + 1;
    if blank {
        graph.add_node(false, false);
        graph.add_transducer_arc(0, blank_node, token_count, EPSILON);
        graph.add_transducer_arc(blank_node, 0, EPSILON, EPSILON);
    }

    if !allow_repeats {
        for i in 0..token_count {
            graph.add_transducer_arc(i + 1, blank_node, token_count, EPSILON);
            for j in (0..token_count).filter(|&j| j != i) {
                graph.add_transducer_arc(i + 1, j + 1, j, j);
            }
        }
    }

    Ok(graph)
}

/// Split string tokens into per-character grapheme sequences.
pub fn char_tokens(tokens: &[&str]) -> Vec<Vec<char>> {
    tokens.iter().map(|t| t.chars().collect()).collect()
}
