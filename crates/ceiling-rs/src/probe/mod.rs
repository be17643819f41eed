//! Limit-discovery orchestrators.
//!
//! - [`context_window`]: [`ContextWindowProbe`], largest accepted prompt,
//!   plus needle-in-a-haystack variants that also require the model to
//!   find a planted fact.
//! - [`max_output`]: [`MaxOutputTokensProbe`], largest completion the
//!   endpoint actually produces.
//!
//! Both wrap a [`ProbeTransport`](crate::api::ProbeTransport) in a
//! [`ProbeOracle`](crate::search::ProbeOracle) and hand it to a
//! [`BoundarySearcher`](crate::search::BoundarySearcher).

pub mod context_window;
pub mod max_output;

pub use context_window::{
    ContextWindowProbe, ContextWindowResult, NeedlePositionResult, NeedleSummary,
};
pub use max_output::{MaxOutputResult, MaxOutputTokensProbe};

use crate::search::ProbeOutcome;
use serde::Serializer;
use std::time::Duration;

/// Error text recorded when a successful response carries no token usage.
pub const MISSING_USAGE: &str = "missing usage information";

/// Serialize a [`Duration`] as fractional seconds.
pub(crate) fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// The latest successful outcome for `value` in a trial history.
pub(crate) fn success_at(history: &[ProbeOutcome], value: u32) -> Option<&ProbeOutcome> {
    history
        .iter()
        .rev()
        .find(|o| o.succeeded && o.candidate_value == value)
}

/// Error text of the latest rejection in a trial history.
pub(crate) fn last_error_text(history: &[ProbeOutcome]) -> Option<String> {
    history
        .iter()
        .rev()
        .find(|o| !o.succeeded)
        .map(|o| o.error_text.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::EvidenceSource;

    #[test]
    fn history_lookups() {
        let history = vec![
            ProbeOutcome::success(4096, 4100),
            ProbeOutcome::failure(8192, EvidenceSource::ApiError, "first"),
            ProbeOutcome::success(6000, 6010),
            ProbeOutcome::failure(7000, EvidenceSource::ValidationError, "second"),
        ];
        assert_eq!(success_at(&history, 6000).map(|o| o.estimated_tokens), Some(6010));
        assert!(success_at(&history, 8192).is_none());
        assert_eq!(last_error_text(&history).as_deref(), Some("second"));
        assert_eq!(last_error_text(&history[..1]), None);
    }
}
