//! The boundary-search engine.
//!
//! - [`oracle`]: the [`ProbeOracle`] trait and per-call [`ProbeOutcome`].
//! - [`boundary`]: [`BoundarySearcher`], exponential growth, then binary
//!   refinement, with pacing and a hard trial cap.
//! - [`extract`]: versioned regex patterns that read a limit straight out
//!   of vendor error text.
//! - [`confidence`]: high/medium/low rating of an estimate.

pub mod boundary;
pub mod confidence;
pub mod extract;
pub mod oracle;

pub use boundary::{BoundarySearcher, ExponentialOutcome, KnownBounds, Refinement, SearchConfig};
pub use confidence::{Confidence, calculate_confidence};
pub use extract::{ErrorPattern, ErrorPatternSet, LimitKind, extract_token_limit_from_error};
pub use oracle::{EvidenceSource, FnOracle, OracleFuture, ProbeOracle, ProbeOutcome};
