//! Projection and epsilon removal.

use crate::error::{Result, WfstError};
use crate::graph::{Graph, NodeId};
use crate::score::log_add;

/// Acceptor over the input labels of `graph`. Arc ids are preserved.
pub fn project_input(graph: &Graph) -> Graph {
    graph.map_labels(|arc| (arc.ilabel, arc.ilabel))
}

/// Acceptor over the output labels of `graph`. Arc ids are preserved.
pub fn project_output(graph: &Graph) -> Graph {
    graph.map_labels(|arc| (arc.olabel, arc.olabel))
}

/// Remove arcs whose input and output labels are both epsilon.
///
/// Each surviving node takes over the non-epsilon arcs of every node in its
/// epsilon closure and accepts if any of them accepts. Nodes that are neither
/// start nodes nor the target of a non-epsilon arc disappear. The weight
/// carried into a closure node is the log-sum over all epsilon paths to it,
/// so forward scores are preserved. Fails with [`WfstError::CyclicGraph`] if
/// the epsilon arcs form a cycle.
pub fn remove_epsilon(graph: &Graph) -> Result<Graph> {
    let n = graph.num_nodes();
    let keep: Vec<bool> = (0..n)
        .map(|v| {
            graph.is_start(v)
                || graph
                    .in_arcs(v)
                    .iter()
                    .any(|&a| !graph.arc(a).is_epsilon())
        })
        .collect();

    let mut result = Graph::new();
    let mut remap: Vec<Option<NodeId>> = vec![None; n];
    let mut closures: Vec<(NodeId, Vec<(NodeId, f64)>)> = Vec::new();
    for v in (0..n).filter(|&v| keep[v]) {
        let closure = epsilon_closure(graph, v)?;
        let accept = closure.iter().any(|&(c, _)| graph.is_accept(c));
        remap[v] = Some(result.add_node(graph.is_start(v), accept));
        closures.push((v, closure));
    }

    for (v, closure) in closures {
        let Some(src) = remap[v] else { continue };
        for (c, offset) in closure {
            for &a in graph.out_arcs(c) {
                let arc = graph.arc(a);
                if arc.is_epsilon() {
                    continue;
                }
                if let Some(dst) = remap[arc.dst] {
                    result.add_weighted_arc(src, dst, arc.ilabel, arc.olabel, offset + arc.weight);
                }
            }
        }
    }

    Ok(result)
}

/// Nodes reachable from `node` through epsilon arcs, each with the log-sum
/// of the weights of all epsilon paths reaching it. Includes `node` itself.
fn epsilon_closure(graph: &Graph, node: NodeId) -> Result<Vec<(NodeId, f64)>> {
    let epsilon_out = |v: NodeId| {
        graph
            .out_arcs(v)
            .iter()
            .map(move |&a| graph.arc(a))
            .filter(|arc| arc.is_epsilon())
    };

    // Reachable set and in-degrees within it.
    let mut reached = vec![false; graph.num_nodes()];
    let mut in_degree = vec![0usize; graph.num_nodes()];
    let mut members = vec![node];
    let mut stack = vec![node];
    reached[node] = true;
    while let Some(v) = stack.pop() {
        for arc in epsilon_out(v) {
            in_degree[arc.dst] += 1;
            if !reached[arc.dst] {
                reached[arc.dst] = true;
                members.push(arc.dst);
                stack.push(arc.dst);
            }
        }
    }

    let mut weight = vec![f64::NEG_INFINITY; graph.num_nodes()];
    weight[node] = 0.0;
    let mut ready: Vec<NodeId> = members
        .iter()
        .copied()
        .filter(|&v| in_degree[v] == 0)
        .collect();
    let mut closure = Vec::with_capacity(members.len());
    while let Some(v) = ready.pop() {
        closure.push((v, weight[v]));
        for arc in epsilon_out(v) {
            weight[arc.dst] = log_add(weight[arc.dst], weight[v] + arc.weight);
            in_degree[arc.dst] -= 1;
            if in_degree[arc.dst] == 0 {
                ready.push(arc.dst);
            }
        }
    }

    if closure.len() < members.len() {
        return Err(WfstError::CyclicGraph);
    }
    Ok(closure)
}
