//! Weighted automaton representation.
//!
//! Nodes and arcs live in flat arenas and refer to each other by index, so a
//! [`Graph`] is plain data: cheap to clone, `Send + Sync`, and serializable.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, WfstError};

/// Index of a node inside its graph.
pub type NodeId = usize;

/// Index of an arc inside its graph.
pub type ArcId = usize;

/// Arc label. `Epsilon` consumes or produces no symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    /// The empty label.
    Epsilon,
    /// A real symbol.
    Symbol(usize),
}

/// Shorthand for [`Label::Epsilon`].
pub const EPSILON: Label = Label::Epsilon;

impl Label {
    /// Check whether this is the empty label.
    pub fn is_epsilon(&self) -> bool {
        matches!(self, Label::Epsilon)
    }

    /// The symbol index, if any.
    pub fn symbol(&self) -> Option<usize> {
        match self {
            Label::Epsilon => None,
            Label::Symbol(s) => Some(*s),
        }
    }
}

impl From<usize> for Label {
    fn from(symbol: usize) -> Self {
        Label::Symbol(symbol)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Epsilon => write!(f, "ε"),
            Label::Symbol(s) => write!(f, "{}", s),
        }
    }
}

/// A weighted, labeled arc.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    /// Source node
    pub src: NodeId,
    /// Destination node
    pub dst: NodeId,
    /// Input label
    pub ilabel: Label,
    /// Output label
    pub olabel: Label,
    /// Log-space weight
    pub weight: f64,
}

impl Arc {
    /// Both labels are epsilon.
    pub fn is_epsilon(&self) -> bool {
        self.ilabel.is_epsilon() && self.olabel.is_epsilon()
    }
}

/// A node with its start/accept flags and adjacency.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Paths may begin here
    pub start: bool,
    /// Paths may end here
    pub accept: bool,
    in_arcs: Vec<ArcId>,
    out_arcs: Vec<ArcId>,
}

/// A weighted finite-state transducer.
///
/// An acceptor is simply a graph whose arcs carry the same input and output
/// label. Weights are log-space scores; a path scores the sum of its arc
/// weights.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    nodes: Vec<Node>,
    arcs: Vec<Arc>,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a linear lattice with `frames + 1` nodes and `classes` parallel
    /// arcs between consecutive nodes.
    ///
    /// Arc `t * classes + c` goes from node `t` to node `t + 1` with label
    /// `c`, which is the order [`Graph::set_weights`] expects for a row-major
    /// `[frames, classes]` score matrix.
    pub fn linear_chain(frames: usize, classes: usize) -> Self {
        let mut graph = Self::new();
        graph.nodes.reserve(frames + 1);
        graph.arcs.reserve(frames * classes);
        graph.add_node(true, frames == 0);
        for t in 0..frames {
            let dst = graph.add_node(false, t + 1 == frames);
            for c in 0..classes {
                graph.add_arc(t, dst, c);
            }
        }
        graph
    }

    /// Add a node and return its id.
    pub fn add_node(&mut self, start: bool, accept: bool) -> NodeId {
        self.nodes.push(Node {
            start,
            accept,
            ..Node::default()
        });
        self.nodes.len() - 1
    }

    /// Add an acceptor arc with zero weight.
    ///
    /// # Panics
    /// Panics if `src` or `dst` is not a node of this graph.
    pub fn add_arc(&mut self, src: NodeId, dst: NodeId, label: impl Into<Label>) -> ArcId {
        let label = label.into();
        self.add_weighted_arc(src, dst, label, label, 0.0)
    }

    /// Add a transducer arc with zero weight.
    ///
    /// # Panics
    /// Panics if `src` or `dst` is not a node of this graph.
    pub fn add_transducer_arc(
        &mut self,
        src: NodeId,
        dst: NodeId,
        ilabel: impl Into<Label>,
        olabel: impl Into<Label>,
    ) -> ArcId {
        self.add_weighted_arc(src, dst, ilabel.into(), olabel.into(), 0.0)
    }

    /// Add a transducer arc with an explicit weight.
    ///
    /// # Panics
    /// Panics if `src` or `dst` is not a node of this graph.
    pub fn add_weighted_arc(
        &mut self,
        src: NodeId,
        dst: NodeId,
        ilabel: Label,
        olabel: Label,
        weight: f64,
    ) -> ArcId {
        assert!(
            src < self.nodes.len() && dst < self.nodes.len(),
            "arc {} -> {} references a node outside 0..{}",
            src,
            dst,
            self.nodes.len()
        );
        let id = self.arcs.len();
        self.arcs.push(Arc {
            src,
            dst,
            ilabel,
            olabel,
            weight,
        });
        self.nodes[src].out_arcs.push(id);
        self.nodes[dst].in_arcs.push(id);
        id
    }

    /// Overwrite all arc weights, in arc id order.
    pub fn set_weights(&mut self, weights: &[f64]) -> Result<()> {
        if weights.len() != self.arcs.len() {
            return Err(WfstError::WeightCountMismatch {
                expected: self.arcs.len(),
                got: weights.len(),
            });
        }
        for (arc, &w) in self.arcs.iter_mut().zip(weights) {
            arc.weight = w;
        }
        Ok(())
    }

    /// Arc weights in arc id order.
    pub fn weights(&self) -> Vec<f64> {
        self.arcs.iter().map(|a| a.weight).collect()
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of arcs.
    pub fn num_arcs(&self) -> usize {
        self.arcs.len()
    }

    /// Check if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get a node.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Get an arc.
    pub fn arc(&self, id: ArcId) -> &Arc {
        &self.arcs[id]
    }

    /// All arcs in id order.
    pub fn arcs(&self) -> &[Arc] {
        &self.arcs
    }

    /// Arcs leaving `node`.
    pub fn out_arcs(&self, node: NodeId) -> &[ArcId] {
        &self.nodes[node].out_arcs
    }

    /// Arcs entering `node`.
    pub fn in_arcs(&self, node: NodeId) -> &[ArcId] {
        &self.nodes[node].in_arcs
    }

    /// Whether `node` is a start node.
    pub fn is_start(&self, node: NodeId) -> bool {
        self.nodes[node].start
    }

    /// Whether `node` is an accept node.
    pub fn is_accept(&self, node: NodeId) -> bool {
        self.nodes[node].accept
    }

    /// Ids of all start nodes.
    pub fn start_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).filter(|&n| self.nodes[n].start)
    }

    /// Ids of all accept nodes.
    pub fn accept_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).filter(|&n| self.nodes[n].accept)
    }

    /// Input labels in arc id order.
    ///
    /// For a path returned by [`crate::best_path`] this is the label sequence
    /// of the path.
    pub fn input_labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.arcs.iter().map(|a| a.ilabel)
    }

    /// Output labels in arc id order.
    pub fn output_labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.arcs.iter().map(|a| a.olabel)
    }

    /// Copy of this graph with every arc relabeled; ids are preserved.
    pub(crate) fn map_labels(&self, f: impl Fn(&Arc) -> (Label, Label)) -> Self {
        let mut graph = self.clone();
        for arc in &mut graph.arcs {
            let (ilabel, olabel) = f(arc);
            arc.ilabel = ilabel;
            arc.olabel = olabel;
        }
        graph
    }
}
