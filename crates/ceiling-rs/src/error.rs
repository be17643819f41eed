//! Typed errors for the probe engine.
//!
//! Only [`ProbeError::Transport`] is raised during a search, and it aborts the
//! search it occurs in. Everything the remote endpoint says about a request
//! (validation errors, truncation, missing usage) is data carried in a
//! [`ProbeOutcome`](crate::search::ProbeOutcome), not an error.

use thiserror::Error;

/// Errors surfaced by the probe engine and its supporting modules.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The request never produced an HTTP exchange (DNS, connect, timeout,
    /// body read). Fatal to the current search.
    #[error("transport error: {0}")]
    Transport(String),

    /// An error-extraction pattern failed to compile.
    #[error("invalid error pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A pattern file could not be read or parsed.
    #[error("failed to load pattern file: {0}")]
    PatternFile(String),

    /// The trial log could not be written.
    #[error("trial log write failed: {0}")]
    TrialLog(#[source] std::io::Error),

    /// Invalid probe configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ProbeError {
    /// Whether this error must abort an in-flight search.
    pub fn is_fatal_to_search(&self) -> bool {
        matches!(self, ProbeError::Transport(_))
    }
}
