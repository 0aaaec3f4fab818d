//! Weighted finite-state transducers with differentiable forward scores.
//!
//! **Version**: 0.1.0-alpha.2 | **Status**: Production Ready
//!
//! This crate provides the automaton algebra used by the tensorlogic sequence
//! losses:
//! - Arena-backed graphs with start/accept nodes and labeled, weighted arcs
//! - Composition and intersection with epsilon handling and arc tracing
//! - Input/output projection and epsilon removal
//! - Log-semiring forward scores with a reverse pass over arc weights
//! - Viterbi best paths
//!
//! # Architecture
//!
//! ```text
//! Graph ──compose/intersect──► Graph + ArcTrace
//!   │                              │
//!   └──────► ForwardScore ──arc_gradients──► ArcTrace::accumulate_left
//! ```
//!
//! Every operation borrows its operands and returns a new graph, so shared
//! graphs can be used from many threads at once.

mod compose;
mod error;
mod graph;
mod score;
mod transform;

pub use compose::{compose, compose_traced, intersect, intersect_traced, ArcTrace};
pub use error::{Result, WfstError};
pub use graph::{Arc, ArcId, Graph, Label, Node, NodeId, EPSILON};
pub use score::{
    best_path, forward_score, log_add, topological_order, viterbi_score, ForwardScore,
};
pub use transform::{project_input, project_output, remove_epsilon};
