//! Convenience re-exports for common `ceiling-rs` types.
//!
//! ```ignore
//! use ceiling_rs::prelude::*;
//! ```
//!
//! Covers the client, both probes and their results, the search engine,
//! event handlers, and configuration. Lower-level pieces (response
//! classification, history helpers) stay in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::error::ProbeError;
pub use crate::{Message, OpenRouterClient, ProviderPreferences};

// ── Probes ──────────────────────────────────────────────────────────
pub use crate::probe::{
    ContextWindowProbe, ContextWindowResult, MaxOutputResult, MaxOutputTokensProbe,
    NeedlePositionResult, NeedleSummary,
};

// ── Search engine ───────────────────────────────────────────────────
pub use crate::search::{
    BoundarySearcher, Confidence, ErrorPatternSet, EvidenceSource, FnOracle, LimitKind,
    ProbeOracle, ProbeOutcome, SearchConfig,
};

// ── Test data ───────────────────────────────────────────────────────
pub use crate::data::{
    ComprehensionChecker, DEFAULT_NEEDLE_ANSWER, DEFAULT_NEEDLE_FACT, NeedlePosition,
    TestDataGenerator,
};

// ── Transport ───────────────────────────────────────────────────────
pub use crate::api::{ProbeRequest, ProbeResponse, ProbeTransport};

// ── Events and logging ──────────────────────────────────────────────
pub use crate::events::{
    CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler, ProbeKind,
    ProbeScope, SearchEvent,
};
pub use crate::trial_log::{TrialLogHandler, TrialLogger};

// ── Configuration ───────────────────────────────────────────────────
pub use crate::config::ProbeConfig;
