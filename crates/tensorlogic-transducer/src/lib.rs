//! Transducer sequence losses built on weighted automaton composition.
//!
//! **Version**: 0.1.0-alpha.2 | **Status**: Production Ready
//!
//! A transducer loss scores frame-level class scores against grapheme targets
//! through three graphs:
//! - a **token graph** that maps class sequences to token sequences, with an
//!   optional blank and repeat constraints,
//! - a **lexicon graph** that decomposes graphemes into tokens,
//! - a **chain graph** per target.
//!
//! Their composition is the set of valid alignments for a target, and the
//! loss is the negative forward score of the emissions restricted to it.
//! Batches are scored in parallel, one worker per example, and gradients
//! flow back to the raw scores.
//!
//! CTC is the special case with single-grapheme tokens, a blank and no
//! unseparated repeats (see [`Ctc`]).

pub mod batch;
pub mod builders;
pub mod config;
pub mod ctc;
pub mod decoder;
pub mod error;
pub mod loss;
pub mod transducer;
pub mod worker;

pub use batch::{reduction_scales, BatchScheduler};
pub use builders::{build_chain, build_lexicon, build_token_graph, char_tokens};
pub use config::{Reduction, TransducerConfig};
pub use ctc::Ctc;
pub use decoder::{collapse_repeats, decode_example, greedy_decode, CollapseRepeats};
pub use error::{TransducerError, TransducerResult};
pub use loss::SequenceLoss;
pub use transducer::{Transducer, TransducerForward};
pub use worker::{alignment_graph, emission_lattice, score_example, ExampleTape, SharedGraphs};

pub use tensorlogic_wfst as wfst;
