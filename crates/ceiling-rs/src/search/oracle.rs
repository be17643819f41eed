//! The probe oracle abstraction.
//!
//! A [`ProbeOracle`] answers one question: does the endpoint accept a request
//! sized at `candidate`? The searcher only ever sees the returned
//! [`ProbeOutcome`]; everything about how the request was built and sent lives
//! behind the trait. This keeps the search deterministic and testable with
//! fake oracles.

use crate::data::comprehension::ComprehensionVerdict;
use crate::error::ProbeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`ProbeOracle::call`].
pub type OracleFuture<'a> = Pin<Box<dyn Future<Output = Result<ProbeOutcome, ProbeError>> + Send + 'a>>;

/// Provenance of a single probe outcome.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    /// The endpoint accepted the request.
    Success,
    /// The endpoint rejected the value as invalid (often stating the limit).
    ValidationError,
    /// The exchange succeeded but output was cut short below the request.
    MaxOutputIncomplete,
    /// The endpoint returned a non-validation API error (rate limit, 5xx).
    ApiError,
    /// Anything else: missing usage, failed comprehension, unparseable body.
    Error,
}

impl fmt::Display for EvidenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvidenceSource::Success => write!(f, "success"),
            EvidenceSource::ValidationError => write!(f, "validation_error"),
            EvidenceSource::MaxOutputIncomplete => write!(f, "max_output_incomplete"),
            EvidenceSource::ApiError => write!(f, "api_error"),
            EvidenceSource::Error => write!(f, "error"),
        }
    }
}

/// Result of one oracle call.
#[derive(Serialize, Clone, Debug)]
pub struct ProbeOutcome {
    /// The candidate value that was tested.
    pub candidate_value: u32,
    /// Whether the candidate was accepted.
    pub succeeded: bool,
    /// Error or diagnostic text from the endpoint. Empty on success.
    pub error_text: String,
    pub evidence_source: EvidenceSource,
    /// API calls spent producing this outcome (normally 1).
    pub trials_consumed: u32,
    /// Tokens the endpoint reported for the relevant side of the exchange
    /// (prompt tokens for context probes, completion tokens for output
    /// probes). Zero when unknown.
    pub estimated_tokens: u32,
    /// Model answer text, kept for needle checks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comprehension: Option<ComprehensionVerdict>,
}

impl ProbeOutcome {
    /// An accepted candidate.
    pub fn success(candidate: u32, estimated_tokens: u32) -> Self {
        Self {
            candidate_value: candidate,
            succeeded: true,
            error_text: String::new(),
            evidence_source: EvidenceSource::Success,
            trials_consumed: 1,
            estimated_tokens,
            answer: None,
            comprehension: None,
        }
    }

    /// A rejected candidate.
    pub fn failure(
        candidate: u32,
        evidence_source: EvidenceSource,
        error_text: impl Into<String>,
    ) -> Self {
        Self {
            candidate_value: candidate,
            succeeded: false,
            error_text: error_text.into(),
            evidence_source,
            trials_consumed: 1,
            estimated_tokens: 0,
            answer: None,
            comprehension: None,
        }
    }

    pub fn with_estimated_tokens(mut self, tokens: u32) -> Self {
        self.estimated_tokens = tokens;
        self
    }

    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = Some(answer.into());
        self
    }

    pub fn with_comprehension(mut self, verdict: ComprehensionVerdict) -> Self {
        self.comprehension = Some(verdict);
        self
    }
}

/// A black-box oracle over integer candidates.
///
/// Implementations must not retry internally and must not share mutable
/// state across probe runs. Return `Err` only for transport failures; every
/// answer from the endpoint, positive or negative, is an `Ok(ProbeOutcome)`.
///
/// # Example
///
/// ```
/// use ceiling_rs::search::{OracleFuture, ProbeOracle, ProbeOutcome, EvidenceSource};
///
/// struct Threshold(u32);
///
/// impl ProbeOracle for Threshold {
///     fn call(&self, candidate: u32) -> OracleFuture<'_> {
///         let limit = self.0;
///         Box::pin(async move {
///             Ok(if candidate <= limit {
///                 ProbeOutcome::success(candidate, candidate)
///             } else {
///                 ProbeOutcome::failure(candidate, EvidenceSource::ApiError, "too large")
///             })
///         })
///     }
/// }
/// ```
pub trait ProbeOracle: Send + Sync {
    /// Test one candidate value.
    fn call(&self, candidate: u32) -> OracleFuture<'_>;
}

/// Type-erased async handler for [`FnOracle`].
type ErasedOracleHandler = Box<
    dyn Fn(u32) -> Pin<Box<dyn Future<Output = Result<ProbeOutcome, ProbeError>> + Send>>
        + Send
        + Sync,
>;

/// A closure-backed [`ProbeOracle`].
///
/// ```ignore
/// let oracle = FnOracle::new(|candidate| async move {
///     Ok(ProbeOutcome::success(candidate, candidate))
/// });
/// ```
pub struct FnOracle {
    handler: ErasedOracleHandler,
}

impl FnOracle {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ProbeOutcome, ProbeError>> + Send + 'static,
    {
        let erased = move |candidate: u32| -> Pin<
            Box<dyn Future<Output = Result<ProbeOutcome, ProbeError>> + Send>,
        > { Box::pin(handler(candidate)) };
        Self {
            handler: Box::new(erased),
        }
    }
}

impl ProbeOracle for FnOracle {
    fn call(&self, candidate: u32) -> OracleFuture<'_> {
        (self.handler)(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_evidence() {
        let ok = ProbeOutcome::success(4096, 4100);
        assert!(ok.succeeded);
        assert_eq!(ok.evidence_source, EvidenceSource::Success);
        assert_eq!(ok.trials_consumed, 1);
        assert!(ok.error_text.is_empty());

        let bad = ProbeOutcome::failure(8192, EvidenceSource::ValidationError, "too long");
        assert!(!bad.succeeded);
        assert_eq!(bad.estimated_tokens, 0);
        assert_eq!(bad.error_text, "too long");
    }

    #[test]
    fn evidence_serializes_snake_case() {
        let json = serde_json::to_string(&EvidenceSource::MaxOutputIncomplete).unwrap();
        assert_eq!(json, "\"max_output_incomplete\"");
        assert_eq!(EvidenceSource::ValidationError.to_string(), "validation_error");
    }

    #[tokio::test]
    async fn fn_oracle_forwards_candidate() {
        let oracle = FnOracle::new(|candidate| async move {
            Ok(ProbeOutcome::success(candidate, candidate * 2))
        });
        let outcome = oracle.call(21).await.unwrap();
        assert_eq!(outcome.candidate_value, 21);
        assert_eq!(outcome.estimated_tokens, 42);
    }
}
