//! Forward scores, their gradients, and Viterbi best paths.
//!
//! All scores are log-space. The forward score of a graph is
//!
//! ```text
//! log Σ_{accepting paths π} exp(Σ_{a ∈ π} w_a)
//! ```
//!
//! and its derivative with respect to an arc weight is the posterior
//! probability that an accepting path uses that arc.

use std::collections::VecDeque;

use crate::error::{Result, WfstError};
use crate::graph::{ArcId, Graph, NodeId};

/// `log(exp(a) + exp(b))` that stays finite when either side is `-inf`.
pub fn log_add(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let max = a.max(b);
    max + (-(a - b).abs()).exp().ln_1p()
}

/// Nodes in an order where every arc goes forward.
pub fn topological_order(graph: &Graph) -> Result<Vec<NodeId>> {
    let n = graph.num_nodes();
    let mut in_degree: Vec<usize> = (0..n).map(|v| graph.in_arcs(v).len()).collect();
    let mut queue: VecDeque<NodeId> = (0..n).filter(|&v| in_degree[v] == 0).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(v) = queue.pop_front() {
        order.push(v);
        for &a in graph.out_arcs(v) {
            let dst = graph.arc(a).dst;
            in_degree[dst] -= 1;
            if in_degree[dst] == 0 {
                queue.push_back(dst);
            }
        }
    }

    if order.len() != n {
        return Err(WfstError::CyclicGraph);
    }
    Ok(order)
}

/// Forward score of an acyclic graph.
pub fn forward_score(graph: &Graph) -> Result<f64> {
    Ok(ForwardScore::compute(graph.clone())?.score())
}

/// A computed forward score that keeps what the reverse pass needs.
#[derive(Clone, Debug)]
pub struct ForwardScore {
    graph: Graph,
    order: Vec<NodeId>,
    alpha: Vec<f64>,
    score: f64,
}

impl ForwardScore {
    /// Run the forward pass, taking ownership of the graph.
    pub fn compute(graph: Graph) -> Result<Self> {
        let order = topological_order(&graph)?;
        let mut alpha = vec![f64::NEG_INFINITY; graph.num_nodes()];

        for &v in &order {
            let mut acc = if graph.is_start(v) {
                0.0
            } else {
                f64::NEG_INFINITY
            };
            for &a in graph.in_arcs(v) {
                let arc = graph.arc(a);
                acc = log_add(acc, alpha[arc.src] + arc.weight);
            }
            alpha[v] = acc;
        }

        let score = graph
            .accept_nodes()
            .fold(f64::NEG_INFINITY, |acc, v| log_add(acc, alpha[v]));

        Ok(Self {
            graph,
            order,
            alpha,
            score,
        })
    }

    /// The forward score.
    pub fn score(&self) -> f64 {
        self.score
    }

    /// The scored graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Forward log-potential of each node.
    pub fn alpha(&self) -> &[f64] {
        &self.alpha
    }

    /// Reverse pass: `upstream * d score / d w_a` for every arc `a`.
    ///
    /// When no accepting path has finite score the gradient is all zeros.
    pub fn arc_gradients(&self, upstream: f64) -> Vec<f64> {
        let graph = &self.graph;
        let mut grads = vec![0.0; graph.num_arcs()];
        if !self.score.is_finite() {
            return grads;
        }

        let mut beta = vec![f64::NEG_INFINITY; graph.num_nodes()];
        for &v in self.order.iter().rev() {
            let mut acc = if graph.is_accept(v) {
                0.0
            } else {
                f64::NEG_INFINITY
            };
            for &a in graph.out_arcs(v) {
                let arc = graph.arc(a);
                acc = log_add(acc, arc.weight + beta[arc.dst]);
            }
            beta[v] = acc;
        }

        for (grad, arc) in grads.iter_mut().zip(graph.arcs()) {
            let log_posterior = self.alpha[arc.src] + arc.weight + beta[arc.dst] - self.score;
            if log_posterior > f64::NEG_INFINITY {
                *grad = upstream * log_posterior.exp();
            }
        }
        grads
    }
}

struct ViterbiTable {
    best: Vec<f64>,
    backpointer: Vec<Option<ArcId>>,
    reached: Vec<bool>,
}

fn viterbi_table(graph: &Graph) -> Result<ViterbiTable> {
    let order = topological_order(graph)?;
    let n = graph.num_nodes();
    let mut table = ViterbiTable {
        best: vec![f64::NEG_INFINITY; n],
        backpointer: vec![None; n],
        reached: vec![false; n],
    };

    for &v in &order {
        if graph.is_start(v) {
            table.best[v] = 0.0;
            table.reached[v] = true;
        }
        for &a in graph.in_arcs(v) {
            let arc = graph.arc(a);
            if !table.reached[arc.src] {
                continue;
            }
            let candidate = table.best[arc.src] + arc.weight;
            if !table.reached[v] || candidate > table.best[v] {
                table.best[v] = candidate;
                table.backpointer[v] = Some(a);
                table.reached[v] = true;
            }
        }
    }
    Ok(table)
}

fn best_final(graph: &Graph, table: &ViterbiTable) -> Result<NodeId> {
    let mut best: Option<NodeId> = None;
    for v in graph.accept_nodes().filter(|&v| table.reached[v]) {
        match best {
            Some(b) if table.best[b] >= table.best[v] => {}
            _ => best = Some(v),
        }
    }
    best.ok_or(WfstError::NoAcceptingPath)
}

/// Score of the single best accepting path.
pub fn viterbi_score(graph: &Graph) -> Result<f64> {
    let table = viterbi_table(graph)?;
    let last = best_final(graph, &table)?;
    Ok(table.best[last])
}

/// The best accepting path as a linear graph whose arcs are in path order.
///
/// Ties keep the first candidate found.
pub fn best_path(graph: &Graph) -> Result<Graph> {
    let table = viterbi_table(graph)?;
    let mut node = best_final(graph, &table)?;

    let mut arcs = Vec::new();
    while let Some(a) = table.backpointer[node] {
        arcs.push(a);
        node = graph.arc(a).src;
    }
    arcs.reverse();

    let mut path = Graph::new();
    path.add_node(true, arcs.is_empty());
    for (i, &a) in arcs.iter().enumerate() {
        let arc = graph.arc(a);
        path.add_node(false, i + 1 == arcs.len());
        path.add_weighted_arc(i, i + 1, arc.ilabel, arc.olabel, arc.weight);
    }
    Ok(path)
}
