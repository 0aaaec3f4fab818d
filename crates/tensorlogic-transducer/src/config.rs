//! Configuration for transducer losses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{TransducerError, TransducerResult};

/// How per-example losses are scaled before they are averaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    /// Every example keeps scale 1.
    #[default]
    None,
    /// Each example is divided by its target length (empty targets keep 1).
    Mean,
}

impl Reduction {
    /// Scale applied to an example whose target has `target_len` labels.
    pub fn scale(&self, target_len: usize) -> f64 {
        match self {
            Reduction::Mean if target_len > 0 => 1.0 / target_len as f64,
            _ => 1.0,
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reduction::None => write!(f, "none"),
            Reduction::Mean => write!(f, "mean"),
        }
    }
}

impl FromStr for Reduction {
    type Err = TransducerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Reduction::None),
            "mean" => Ok(Reduction::Mean),
            other => Err(TransducerError::ConfigError(format!(
                "Unknown reduction '{}', expected 'none' or 'mean'",
                other
            ))),
        }
    }
}

/// Configuration for a [`crate::Transducer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransducerConfig {
    /// Order of the token transition model. Only 0 is supported.
    pub n_gram: usize,
    /// Allow an optional blank between tokens.
    pub blank: bool,
    /// Allow consecutive identical tokens without a blank in between.
    pub allow_repeats: bool,
    /// Per-example loss scaling.
    pub reduction: Reduction,
    /// Upper bound on batch workers (defaults to one per example).
    pub max_workers: Option<usize>,
}

impl Default for TransducerConfig {
    fn default() -> Self {
        Self {
            n_gram: 0,
            blank: false,
            allow_repeats: true,
            reduction: Reduction::None,
            max_workers: None,
        }
    }
}

impl TransducerConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the transition model order.
    pub fn with_n_gram(mut self, n_gram: usize) -> Self {
        self.n_gram = n_gram;
        self
    }

    /// Enable or disable blank.
    pub fn with_blank(mut self, blank: bool) -> Self {
        self.blank = blank;
        self
    }

    /// Allow or forbid unseparated repeats.
    pub fn with_allow_repeats(mut self, allow_repeats: bool) -> Self {
        self.allow_repeats = allow_repeats;
        self
    }

    /// Set the reduction.
    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }

    /// Cap the number of batch workers.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    /// Check the parameters for consistency.
    pub fn validate(&self) -> TransducerResult<()> {
        if self.n_gram > 0 {
            return Err(TransducerError::ConfigError(format!(
                "Transition graphs are not implemented (n_gram = {})",
                self.n_gram
            )));
        }
        if !self.allow_repeats && !self.blank {
            return Err(TransducerError::ConfigError(
                "Must use blank if disallowing repeats".to_string(),
            ));
        }
        if self.max_workers == Some(0) {
            return Err(TransducerError::ConfigError(
                "max_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
