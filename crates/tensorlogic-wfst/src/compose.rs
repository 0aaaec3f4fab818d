//! Composition and intersection.
//!
//! Both are product constructions over pairs of operand states. Result arcs
//! remember which operand arcs they came from ([`ArcTrace`]), which is what
//! lets gradients of a forward score flow back into the operands.

use std::collections::{HashMap, VecDeque};

use crate::graph::{ArcId, Graph, Label, NodeId};

/// Maps each arc of a product graph to the operand arcs it was built from.
///
/// An entry is `None` when the product arc was an epsilon move that left
/// that operand in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArcTrace {
    left: Vec<Option<ArcId>>,
    right: Vec<Option<ArcId>>,
}

impl ArcTrace {
    /// Left operand arc behind product arc `arc`.
    pub fn left(&self, arc: ArcId) -> Option<ArcId> {
        self.left[arc]
    }

    /// Right operand arc behind product arc `arc`.
    pub fn right(&self, arc: ArcId) -> Option<ArcId> {
        self.right[arc]
    }

    /// Number of traced product arcs.
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Add `scale * arc_grads[a]` into `dst[left(a)]` for every product arc.
    ///
    /// `dst` is indexed by left operand arc id.
    pub fn accumulate_left(&self, arc_grads: &[f64], dst: &mut [f64], scale: f64) {
        for (grad, origin) in arc_grads.iter().zip(&self.left) {
            if let Some(arc) = origin {
                dst[*arc] += scale * grad;
            }
        }
    }

    /// Add `scale * arc_grads[a]` into `dst[right(a)]` for every product arc.
    pub fn accumulate_right(&self, arc_grads: &[f64], dst: &mut [f64], scale: f64) {
        for (grad, origin) in arc_grads.iter().zip(&self.right) {
            if let Some(arc) = origin {
                dst[*arc] += scale * grad;
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Match left output labels against right input labels.
    Compose,
    /// Match input labels on both sides.
    Intersect,
}

/// Product state: a node of each operand, plus whether the last move
/// advanced the left operand alone on epsilon.
type State = (NodeId, NodeId, bool);

struct PendingArc {
    src: usize,
    dst: usize,
    ilabel: Label,
    olabel: Label,
    weight: f64,
    left: Option<ArcId>,
    right: Option<ArcId>,
}

/// Compose two transducers: paths of `first` whose output sequence equals the
/// input sequence of a path of `second`.
pub fn compose(first: &Graph, second: &Graph) -> Graph {
    product(first, second, Mode::Compose).0
}

/// [`compose`], also returning the arc trace.
pub fn compose_traced(first: &Graph, second: &Graph) -> (Graph, ArcTrace) {
    product(first, second, Mode::Compose)
}

/// Intersect two acceptors on their input labels.
pub fn intersect(first: &Graph, second: &Graph) -> Graph {
    product(first, second, Mode::Intersect).0
}

/// [`intersect`], also returning the arc trace.
pub fn intersect_traced(first: &Graph, second: &Graph) -> (Graph, ArcTrace) {
    product(first, second, Mode::Intersect)
}

fn product(first: &Graph, second: &Graph, mode: Mode) -> (Graph, ArcTrace) {
    let left_side = |id: ArcId| {
        let arc = first.arc(id);
        match mode {
            Mode::Compose => arc.olabel,
            Mode::Intersect => arc.ilabel,
        }
    };

    // Right arcs grouped by input label, per node.
    let right_index: Vec<HashMap<Label, Vec<ArcId>>> = (0..second.num_nodes())
        .map(|n| {
            let mut by_label: HashMap<Label, Vec<ArcId>> = HashMap::new();
            for &a in second.out_arcs(n) {
                by_label.entry(second.arc(a).ilabel).or_default().push(a);
            }
            by_label
        })
        .collect();

    let mut states: Vec<State> = Vec::new();
    let mut ids: HashMap<State, usize> = HashMap::new();
    let mut queue = VecDeque::new();
    let mut pending: Vec<PendingArc> = Vec::new();

    let mut intern = |state: State, states: &mut Vec<State>, queue: &mut VecDeque<usize>| {
        *ids.entry(state).or_insert_with(|| {
            states.push(state);
            queue.push_back(states.len() - 1);
            states.len() - 1
        })
    };

    for p in first.start_nodes() {
        for q in second.start_nodes() {
            intern((p, q, false), &mut states, &mut queue);
        }
    }

    while let Some(src) = queue.pop_front() {
        let (p, q, left_eps) = states[src];

        for &a in first.out_arcs(p) {
            let arc_a = first.arc(a);
            match left_side(a) {
                Label::Epsilon => {
                    // Advance the left operand alone.
                    let dst = intern((arc_a.dst, q, true), &mut states, &mut queue);
                    let (ilabel, olabel) = match mode {
                        Mode::Compose => (arc_a.ilabel, Label::Epsilon),
                        Mode::Intersect => (Label::Epsilon, Label::Epsilon),
                    };
                    pending.push(PendingArc {
                        src,
                        dst,
                        ilabel,
                        olabel,
                        weight: arc_a.weight,
                        left: Some(a),
                        right: None,
                    });
                }
                symbol => {
                    let Some(matches) = right_index[q].get(&symbol) else {
                        continue;
                    };
                    for &b in matches {
                        let arc_b = second.arc(b);
                        let dst = intern((arc_a.dst, arc_b.dst, false), &mut states, &mut queue);
                        let (ilabel, olabel) = match mode {
                            Mode::Compose => (arc_a.ilabel, arc_b.olabel),
                            Mode::Intersect => (symbol, symbol),
                        };
                        pending.push(PendingArc {
                            src,
                            dst,
                            ilabel,
                            olabel,
                            weight: arc_a.weight + arc_b.weight,
                            left: Some(a),
                            right: Some(b),
                        });
                    }
                }
            }
        }

        // Right-alone epsilon moves may not follow a left-alone one, so each
        // interleaving of epsilon moves is produced once.
        if left_eps {
            continue;
        }
        if let Some(eps_arcs) = right_index[q].get(&Label::Epsilon) {
            for &b in eps_arcs {
                let arc_b = second.arc(b);
                let dst = intern((p, arc_b.dst, false), &mut states, &mut queue);
                let (ilabel, olabel) = match mode {
                    Mode::Compose => (Label::Epsilon, arc_b.olabel),
                    Mode::Intersect => (Label::Epsilon, Label::Epsilon),
                };
                pending.push(PendingArc {
                    src,
                    dst,
                    ilabel,
                    olabel,
                    weight: arc_b.weight,
                    left: None,
                    right: Some(b),
                });
            }
        }
    }

    let accepting = |s: &State| first.is_accept(s.0) && second.is_accept(s.1);

    // Every discovered state is reachable; keep those that also reach an
    // accepting state.
    let mut reverse: Vec<Vec<usize>> = vec![Vec::new(); states.len()];
    for arc in &pending {
        reverse[arc.dst].push(arc.src);
    }
    let mut coaccessible = vec![false; states.len()];
    let mut stack: Vec<usize> = (0..states.len())
        .filter(|&s| accepting(&states[s]))
        .collect();
    for &s in &stack {
        coaccessible[s] = true;
    }
    while let Some(s) = stack.pop() {
        for &prev in &reverse[s] {
            if !coaccessible[prev] {
                coaccessible[prev] = true;
                stack.push(prev);
            }
        }
    }

    let mut graph = Graph::new();
    let mut remap = vec![None; states.len()];
    for (s, state) in states.iter().enumerate() {
        if coaccessible[s] {
            let start = first.is_start(state.0) && second.is_start(state.1) && !state.2;
            remap[s] = Some(graph.add_node(start, accepting(state)));
        }
    }

    let mut trace = ArcTrace::default();
    for arc in pending {
        if let (Some(src), Some(dst)) = (remap[arc.src], remap[arc.dst]) {
            graph.add_weighted_arc(src, dst, arc.ilabel, arc.olabel, arc.weight);
            trace.left.push(arc.left);
            trace.right.push(arc.right);
        }
    }

    (graph, trace)
}
