//! Error types for transducer losses.

use tensorlogic_wfst::WfstError;
use thiserror::Error;

/// Errors that can occur while building or evaluating a transducer loss.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransducerError {
    /// Invalid construction parameters.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A token uses a grapheme missing from the grapheme index.
    #[error("Grapheme {grapheme} has no index")]
    KeyMissing { grapheme: String },

    /// Scores and targets disagree on batch, time or class dimensions.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Requested a capability that does not exist yet.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Error from the automaton library.
    #[error("Graph error: {0}")]
    Graph(#[from] WfstError),

    /// The batch worker pool could not be started.
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}

/// Result type for transducer operations.
pub type TransducerResult<T> = Result<T, TransducerError>;
