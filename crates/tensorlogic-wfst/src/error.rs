//! Error types for automaton operations.

use thiserror::Error;

/// Errors that can occur in automaton operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WfstError {
    /// A weight buffer does not have one entry per arc.
    #[error("Weight count mismatch: graph has {expected} arcs, got {got} weights")]
    WeightCountMismatch { expected: usize, got: usize },

    /// The operation needs a topological order but the graph has a cycle.
    #[error("Graph contains a cycle and cannot be topologically sorted")]
    CyclicGraph,

    /// No accept node is reachable from a start node.
    #[error("Graph has no accepting path")]
    NoAcceptingPath,
}

/// Result type for automaton operations.
pub type Result<T> = std::result::Result<T, WfstError>;
