//! Context-window discovery.
//!
//! Each trial sends a prompt sized to the candidate token count with a tiny
//! completion budget. The endpoint either accepts it (and reports how many
//! prompt tokens it counted) or rejects it. The exponential phase brackets
//! the limit; the binary phase narrows it inside
//! `[last_success - refine_margin, first_failure]`.
//!
//! Needle variants plant a fact in the filler and ask for it back. A trial
//! then counts as accepted only when the endpoint takes the request *and*
//! the answer contains the fact, so the result is the largest context the
//! model can actually use rather than merely accept.

use super::{MISSING_USAGE, last_error_text, serialize_secs, success_at};
use crate::api::{ProbeRequest, ProbeTransport, classify_failure, is_rate_limited};
use crate::config::ProbeConfig;
use crate::data::{ComprehensionChecker, NeedlePosition, TestDataGenerator};
use crate::error::ProbeError;
use crate::events::{EventHandler, NoopHandler, ProbeKind, ProbeScope};
use crate::search::{
    BoundarySearcher, Confidence, EvidenceSource, LimitKind, OracleFuture, ProbeOracle,
    ProbeOutcome,
};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, warn};

// ── Results ────────────────────────────────────────────────────────

/// Needle retrieval statistics for one run (or, on an aggregate result,
/// summed over all positions).
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NeedleSummary {
    /// `None` on an aggregate over several positions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<NeedlePosition>,
    /// Accepted requests whose answer was checked.
    pub checks: u32,
    /// Checks where the answer contained the expected fact.
    pub passes: u32,
    /// `passes / checks`, or `0.0` with no checks.
    pub comprehension_rate: f64,
    /// The answer at the reported limit contained the fact. On an
    /// aggregate, true only when every position retrieved it.
    pub retrieved_at_limit: bool,
}

/// Per-position entry of an aggregate needle result.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NeedlePositionResult {
    pub position: NeedlePosition,
    pub max_context_tokens: u32,
    pub confidence: Confidence,
    pub trials: u32,
    pub success: bool,
    pub retrieved_at_limit: bool,
}

/// Outcome of a context-window probe run.
#[derive(Serialize, Debug, Clone)]
pub struct ContextWindowResult {
    pub model: String,
    /// Largest prompt size (in tokens) found to be accepted.
    pub max_context_tokens: u32,
    pub confidence: Confidence,
    /// API calls spent across both search phases.
    pub trials: u32,
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,
    /// False when no candidate was ever accepted.
    pub success: bool,
    pub evidence_source: EvidenceSource,
    /// Text of the last rejection seen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Prompt tokens the endpoint reported at `max_context_tokens`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_prompt_tokens: Option<u32>,
    /// Responses that contradicted an earlier one.
    pub inconsistencies: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needle: Option<NeedleSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub positions: Vec<NeedlePositionResult>,
}

impl fmt::Display for ContextWindowResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.success {
            write!(
                f,
                "{}: max context ~{} tokens",
                self.model, self.max_context_tokens
            )?;
        } else {
            write!(
                f,
                "{}: no context size accepted (last tried {})",
                self.model, self.max_context_tokens
            )?;
        }
        write!(
            f,
            " [confidence {}, {} trials, {:.1}s, {}]",
            self.confidence,
            self.trials,
            self.duration.as_secs_f64(),
            self.evidence_source
        )?;
        if let Some(needle) = &self.needle {
            write!(
                f,
                "; needle {}/{} retrieved ({:.0}%)",
                needle.passes,
                needle.checks,
                needle.comprehension_rate * 100.0
            )?;
        }
        for p in &self.positions {
            write!(
                f,
                "\n  {:>6}: {} tokens ({}, {} trials{})",
                p.position.to_string(),
                p.max_context_tokens,
                p.confidence,
                p.trials,
                if p.retrieved_at_limit { ", retrieved" } else { "" }
            )?;
        }
        Ok(())
    }
}

// ── Oracle ─────────────────────────────────────────────────────────

struct Needle<'n> {
    position: NeedlePosition,
    fact: &'n str,
    expected: &'n str,
}

/// Sends one sized prompt per candidate.
struct ContextOracle<'a> {
    transport: &'a dyn ProbeTransport,
    model: &'a str,
    generator: &'a TestDataGenerator,
    completion_tokens: u32,
    needle: Option<Needle<'a>>,
}

impl ProbeOracle for ContextOracle<'_> {
    fn call(&self, candidate: u32) -> OracleFuture<'_> {
        Box::pin(async move {
            let prompt = match &self.needle {
                Some(needle) => {
                    self.generator
                        .generate_with_needle(candidate, needle.position, needle.fact)
                        .text
                }
                None => self.generator.generate_prompt(candidate),
            };
            let request = ProbeRequest::user(prompt, self.completion_tokens);
            let response = self.transport.probe_once(self.model, &request).await?;

            if !response.success {
                if is_rate_limited(response.status, &response.error_text) {
                    warn!("rate limited at {candidate} tokens; counted as a rejection");
                }
                let evidence = classify_failure(response.status, &response.error_text);
                return Ok(ProbeOutcome::failure(candidate, evidence, response.error_text));
            }

            let Some(prompt_tokens) = response.prompt_tokens() else {
                return Ok(ProbeOutcome::failure(
                    candidate,
                    EvidenceSource::Error,
                    MISSING_USAGE,
                ));
            };

            let Some(needle) = &self.needle else {
                return Ok(ProbeOutcome::success(candidate, prompt_tokens));
            };
            let answer = response.content.unwrap_or_default();
            let verdict = ComprehensionChecker::check(&answer, needle.expected);
            let outcome = if verdict.correct {
                ProbeOutcome::success(candidate, prompt_tokens)
            } else {
                ProbeOutcome::failure(
                    candidate,
                    EvidenceSource::Error,
                    format!("needle not retrieved: expected '{}'", needle.expected),
                )
                .with_estimated_tokens(prompt_tokens)
            };
            Ok(outcome.with_answer(answer).with_comprehension(verdict))
        })
    }
}

// ── Probe ──────────────────────────────────────────────────────────

/// Discovers the largest prompt an endpoint accepts for a model.
///
/// ```ignore
/// let probe = ContextWindowProbe::new(&client, ProbeConfig::default());
/// let result = probe.probe("openai/gpt-4o-mini").await?;
/// let needles = probe
///     .probe_all_needle_positions("openai/gpt-4o-mini", DEFAULT_NEEDLE_FACT, DEFAULT_NEEDLE_ANSWER)
///     .await?;
/// ```
pub struct ContextWindowProbe<'a> {
    transport: &'a dyn ProbeTransport,
    config: ProbeConfig,
    handler: &'a dyn EventHandler,
}

impl<'a> ContextWindowProbe<'a> {
    pub fn new(transport: &'a dyn ProbeTransport, config: ProbeConfig) -> Self {
        Self {
            transport,
            config,
            handler: &NoopHandler,
        }
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.handler = handler;
        self
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Find the context limit with plain filler prompts.
    pub async fn probe(&self, model: &str) -> Result<ContextWindowResult, ProbeError> {
        self.run(model, None).await
    }

    /// Find the largest context at which the model still retrieves
    /// `needle_fact` placed at `position`.
    pub async fn probe_with_needle(
        &self,
        model: &str,
        position: NeedlePosition,
        needle_fact: &str,
        expected_answer: &str,
    ) -> Result<ContextWindowResult, ProbeError> {
        let needle = Needle {
            position,
            fact: needle_fact,
            expected: expected_answer,
        };
        self.run(model, Some(needle)).await
    }

    /// Run an independent needle search at every [`NeedlePosition`] and
    /// aggregate: the largest limit across positions, summed trials, and
    /// the combined comprehension rate.
    pub async fn probe_all_needle_positions(
        &self,
        model: &str,
        needle_fact: &str,
        expected_answer: &str,
    ) -> Result<ContextWindowResult, ProbeError> {
        let start = Instant::now();
        let mut runs = Vec::with_capacity(NeedlePosition::ALL.len());
        for position in NeedlePosition::ALL {
            let result = self
                .probe_with_needle(model, position, needle_fact, expected_answer)
                .await?;
            runs.push((position, result));
        }
        Ok(aggregate_positions(model, runs, start.elapsed()))
    }

    async fn run(
        &self,
        model: &str,
        needle: Option<Needle<'_>>,
    ) -> Result<ContextWindowResult, ProbeError> {
        self.config.validate()?;
        let start = Instant::now();
        let position = needle.as_ref().map(|n| n.position);
        let mut scope = ProbeScope::new(model, ProbeKind::ContextWindow);
        if let Some(position) = position {
            scope = scope.with_needle(position);
        }
        let completion_tokens = if needle.is_some() {
            self.config.needle_completion_tokens
        } else {
            self.config.context_completion_tokens
        };

        let searcher = BoundarySearcher::new(self.config.search.clone(), scope)
            .with_event_handler(self.handler)
            .with_patterns(self.config.patterns.for_kind(LimitKind::Context));
        let oracle = ContextOracle {
            transport: self.transport,
            model,
            generator: &self.config.generator,
            completion_tokens,
            needle,
        };

        let grow = searcher.exponential_search(&oracle).await?;
        let mut trials = grow.trials;
        let mut inconsistencies = grow.inconsistencies;
        let mut history = grow.history.clone();

        let (value, success, evidence_source, confidence) = if let Some(limit) =
            grow.extracted_limit
        {
            (limit, true, EvidenceSource::ValidationError, Confidence::High)
        } else if !grow.success {
            let evidence = grow
                .last_failure
                .as_ref()
                .map_or(EvidenceSource::Error, |f| f.evidence_source);
            (grow.value, false, evidence, Confidence::Low)
        } else {
            let mut value = grow.value;
            let mut evidence = EvidenceSource::Success;
            let remaining = searcher.config().max_trials.saturating_sub(grow.trials);
            if let Some(failed) = grow.failed_candidate().filter(|_| remaining > 0) {
                let lower = grow.value.saturating_sub(searcher.config().refine_margin);
                let refined = searcher
                    .with_max_trials(remaining)
                    .search_with_evidence(lower, failed, grow.known, &oracle)
                    .await?;
                trials += refined.trials;
                inconsistencies += refined.inconsistencies;
                history.extend(refined.history);
                match refined.extracted_limit {
                    Some(limit) => {
                        value = limit;
                        evidence = EvidenceSource::ValidationError;
                    }
                    None => value = refined.value,
                }
            }
            let confidence = if grow.reached_max_value {
                Confidence::Low
            } else {
                searcher.calculate_confidence(trials, evidence, value)
            };
            (value, true, evidence, confidence)
        };

        let at_value = success_at(&history, value);
        let needle_summary = position.map(|position| {
            let checks = history.iter().filter(|o| o.comprehension.is_some()).count() as u32;
            let passes = history
                .iter()
                .filter(|o| o.comprehension.as_ref().is_some_and(|v| v.correct))
                .count() as u32;
            NeedleSummary {
                position: Some(position),
                checks,
                passes,
                comprehension_rate: rate(passes, checks),
                retrieved_at_limit: at_value
                    .and_then(|o| o.comprehension.as_ref())
                    .is_some_and(|v| v.correct),
            }
        });

        let result = ContextWindowResult {
            model: model.to_string(),
            max_context_tokens: value,
            confidence,
            trials,
            duration: start.elapsed(),
            success,
            evidence_source,
            error_message: last_error_text(&history),
            observed_prompt_tokens: at_value.map(|o| o.estimated_tokens).filter(|t| *t > 0),
            inconsistencies,
            needle: needle_summary,
            positions: Vec::new(),
        };
        info!(
            "context window for {model}{}: {} tokens ({} confidence, {} trials)",
            position.map_or(String::new(), |p| format!(" [needle {p}]")),
            result.max_context_tokens,
            result.confidence,
            result.trials
        );
        Ok(result)
    }
}

fn rate(passes: u32, checks: u32) -> f64 {
    if checks == 0 {
        0.0
    } else {
        f64::from(passes) / f64::from(checks)
    }
}

/// Fold per-position needle runs into one result.
fn aggregate_positions(
    model: &str,
    runs: Vec<(NeedlePosition, ContextWindowResult)>,
    duration: Duration,
) -> ContextWindowResult {
    let positions: Vec<NeedlePositionResult> = runs
        .iter()
        .map(|(position, r)| NeedlePositionResult {
            position: *position,
            max_context_tokens: r.max_context_tokens,
            confidence: r.confidence,
            trials: r.trials,
            success: r.success,
            retrieved_at_limit: r.needle.as_ref().is_some_and(|n| n.retrieved_at_limit),
        })
        .collect();

    let success = runs.iter().any(|(_, r)| r.success);
    let best = runs
        .iter()
        .filter(|(_, r)| r.success || !success)
        .max_by_key(|(_, r)| r.max_context_tokens)
        .map(|(_, r)| r);

    let checks = runs
        .iter()
        .filter_map(|(_, r)| r.needle.as_ref())
        .map(|n| n.checks)
        .sum();
    let passes = runs
        .iter()
        .filter_map(|(_, r)| r.needle.as_ref())
        .map(|n| n.passes)
        .sum();

    ContextWindowResult {
        model: model.to_string(),
        max_context_tokens: best.map_or(0, |r| r.max_context_tokens),
        confidence: if success {
            best.map_or(Confidence::Low, |r| r.confidence)
        } else {
            Confidence::Low
        },
        trials: runs.iter().map(|(_, r)| r.trials).sum(),
        duration,
        success,
        evidence_source: best.map_or(EvidenceSource::Error, |r| r.evidence_source),
        error_message: best.and_then(|r| r.error_message.clone()),
        observed_prompt_tokens: best.and_then(|r| r.observed_prompt_tokens),
        inconsistencies: runs.iter().map(|(_, r)| r.inconsistencies).sum(),
        needle: Some(NeedleSummary {
            position: None,
            checks,
            passes,
            comprehension_rate: rate(passes, checks),
            retrieved_at_limit: !positions.is_empty()
                && positions.iter().all(|p| p.retrieved_at_limit),
        }),
        positions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UsageInfo;
    use crate::api::{ProbeResponse, TransportFuture};
    use crate::data::{DEFAULT_NEEDLE_ANSWER, DEFAULT_NEEDLE_FACT};
    use crate::search::SearchConfig;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Accepts prompts up to `context_limit` characters (one token each with
    /// the default generator) and answers needle questions while the prompt
    /// is short enough to "read".
    struct FakeEndpoint {
        context_limit: u32,
        error_text: String,
        report_usage: bool,
        /// Needles in the first part of the prompt are lost above this size.
        middle_retrieval_limit: u32,
        calls: AtomicU32,
    }

    impl FakeEndpoint {
        fn new(context_limit: u32) -> Self {
            Self {
                context_limit,
                error_text: "Request too large".into(),
                report_usage: true,
                middle_retrieval_limit: u32::MAX,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ProbeTransport for FakeEndpoint {
        fn probe_once<'a>(
            &'a self,
            _model: &'a str,
            request: &'a ProbeRequest,
        ) -> TransportFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let prompt: String = request
                .messages
                .iter()
                .filter_map(|m| m.content.as_deref())
                .collect();
            let tokens = prompt.chars().count() as u32;
            let response = if tokens > self.context_limit {
                ProbeResponse::rejected(Some(400), self.error_text.clone())
            } else {
                let lost = prompt.find(DEFAULT_NEEDLE_FACT).is_some_and(|offset| {
                    (offset as f64 / prompt.len() as f64) < 0.65
                        && tokens > self.middle_retrieval_limit
                });
                let answer = if prompt.contains(DEFAULT_NEEDLE_FACT) && !lost {
                    format!("The fact is: {DEFAULT_NEEDLE_FACT}")
                } else {
                    "OK".to_string()
                };
                let usage = self.report_usage.then(|| UsageInfo {
                    prompt_tokens: Some(tokens),
                    completion_tokens: Some(1),
                    total_tokens: Some(tokens + 1),
                });
                ProbeResponse::completed(Some(answer), usage, Some("stop".into()))
            };
            Box::pin(async move { Ok(response) })
        }
    }

    /// Every request fails before reaching the endpoint.
    struct Unreachable;

    impl ProbeTransport for Unreachable {
        fn probe_once<'a>(
            &'a self,
            _model: &'a str,
            _request: &'a ProbeRequest,
        ) -> TransportFuture<'a> {
            Box::pin(async { Err(ProbeError::Transport("connection refused".into())) })
        }
    }

    fn config() -> ProbeConfig {
        ProbeConfig::default().with_search(SearchConfig::instant())
    }

    #[tokio::test]
    async fn converges_just_below_the_limit() {
        let endpoint = FakeEndpoint::new(127_999);
        let probe = ContextWindowProbe::new(&endpoint, config());
        let result = probe.probe("test/model").await.unwrap();

        assert!(result.success);
        assert!(
            (127_872..=128_000).contains(&result.max_context_tokens),
            "got {}",
            result.max_context_tokens
        );
        assert!(matches!(
            result.confidence,
            Confidence::High | Confidence::Medium
        ));
        assert!(result.trials <= 40);
        assert_eq!(result.trials, endpoint.calls());
        assert_eq!(result.evidence_source, EvidenceSource::Success);
        assert_eq!(
            result.observed_prompt_tokens,
            Some(result.max_context_tokens)
        );
        assert_eq!(result.inconsistencies, 0);
        assert_eq!(result.error_message.as_deref(), Some("Request too large"));
        assert!(result.needle.is_none());
    }

    #[tokio::test]
    async fn stated_limit_short_circuits() {
        let mut endpoint = FakeEndpoint::new(127_999);
        endpoint.error_text = "This model's maximum context length is 128,000 tokens.".into();
        let result = ContextWindowProbe::new(&endpoint, config())
            .probe("test/model")
            .await
            .unwrap();
        assert_eq!(result.max_context_tokens, 128_000);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.evidence_source, EvidenceSource::ValidationError);
        // 4096 .. 65536 accepted, 131072 rejected.
        assert_eq!(result.trials, 6);
    }

    #[tokio::test]
    async fn first_rejection_reports_low_confidence() {
        let endpoint = FakeEndpoint::new(1000);
        let result = ContextWindowProbe::new(&endpoint, config())
            .probe("test/model")
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.max_context_tokens, 4096);
        assert_eq!(result.trials, 1);
        assert_eq!(result.evidence_source, EvidenceSource::ValidationError);
    }

    #[tokio::test]
    async fn missing_usage_is_a_consumed_rejection() {
        let mut endpoint = FakeEndpoint::new(127_999);
        endpoint.report_usage = false;
        let result = ContextWindowProbe::new(&endpoint, config())
            .probe("test/model")
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.trials, 1);
        assert_eq!(result.evidence_source, EvidenceSource::Error);
        assert_eq!(result.error_message.as_deref(), Some(MISSING_USAGE));
    }

    #[tokio::test]
    async fn transport_failure_aborts_the_probe() {
        let err = ContextWindowProbe::new(&Unreachable, config())
            .probe("test/model")
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Transport(_)));
    }

    #[tokio::test]
    async fn trial_budget_is_shared_between_phases() {
        let endpoint = FakeEndpoint::new(127_999);
        let config =
            ProbeConfig::default().with_search(SearchConfig::instant().with_max_trials(8));
        let result = ContextWindowProbe::new(&endpoint, config)
            .probe("test/model")
            .await
            .unwrap();
        assert_eq!(result.trials, 8);
        assert_eq!(endpoint.calls(), 8);
        assert!(result.success);
        assert!(result.max_context_tokens <= 127_999);
    }

    #[tokio::test]
    async fn needle_probe_requires_retrieval() {
        let mut endpoint = FakeEndpoint::new(127_999);
        endpoint.middle_retrieval_limit = 30_000;
        let probe = ContextWindowProbe::new(&endpoint, config());

        let end = probe
            .probe_with_needle(
                "test/model",
                NeedlePosition::End,
                DEFAULT_NEEDLE_FACT,
                DEFAULT_NEEDLE_ANSWER,
            )
            .await
            .unwrap();
        assert!(end.max_context_tokens > 127_000, "end: {}", end.max_context_tokens);
        let summary = end.needle.as_ref().unwrap();
        assert_eq!(summary.position, Some(NeedlePosition::End));
        assert!(summary.retrieved_at_limit);
        assert_eq!(summary.passes, summary.checks);

        let middle = probe
            .probe_with_needle(
                "test/model",
                NeedlePosition::Middle,
                DEFAULT_NEEDLE_FACT,
                DEFAULT_NEEDLE_ANSWER,
            )
            .await
            .unwrap();
        assert!(
            (29_000..=30_000).contains(&middle.max_context_tokens),
            "middle: {}",
            middle.max_context_tokens
        );
        let summary = middle.needle.as_ref().unwrap();
        assert!(summary.passes < summary.checks);
        assert!(summary.retrieved_at_limit);
        assert!(
            middle
                .error_message
                .as_deref()
                .is_some_and(|e| e.starts_with("needle not retrieved"))
        );
    }

    #[tokio::test]
    async fn expected_answer_is_never_read_as_a_limit() {
        let endpoint = FakeEndpoint::new(127_999);
        let result = ContextWindowProbe::new(&endpoint, config())
            .probe_with_needle(
                "test/model",
                NeedlePosition::End,
                DEFAULT_NEEDLE_FACT,
                "the limit is 42 tokens",
            )
            .await
            .unwrap();
        assert_ne!(result.max_context_tokens, 42);
        assert!(!result.success);
        assert_eq!(result.evidence_source, EvidenceSource::Error);
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.trials, 1);
    }

    #[tokio::test]
    async fn all_positions_are_aggregated() {
        let mut endpoint = FakeEndpoint::new(127_999);
        endpoint.middle_retrieval_limit = 30_000;
        let result = ContextWindowProbe::new(&endpoint, config())
            .probe_all_needle_positions("test/model", DEFAULT_NEEDLE_FACT, DEFAULT_NEEDLE_ANSWER)
            .await
            .unwrap();

        assert_eq!(result.positions.len(), 3);
        let best = result
            .positions
            .iter()
            .map(|p| p.max_context_tokens)
            .max()
            .unwrap();
        assert_eq!(result.max_context_tokens, best);
        assert_eq!(
            result.trials,
            result.positions.iter().map(|p| p.trials).sum::<u32>()
        );
        assert_eq!(result.trials, endpoint.calls());

        let middle = result
            .positions
            .iter()
            .find(|p| p.position == NeedlePosition::Middle)
            .unwrap();
        assert!(middle.max_context_tokens < best);

        let summary = result.needle.as_ref().unwrap();
        assert_eq!(summary.position, None);
        assert!(summary.comprehension_rate > 0.0 && summary.comprehension_rate < 1.0);
        assert!(summary.retrieved_at_limit);

        let text = result.to_string();
        assert!(text.contains("middle"));
        assert!(text.contains("80%"));
    }

    #[test]
    fn result_serializes_with_seconds() {
        let result = ContextWindowResult {
            model: "m".into(),
            max_context_tokens: 8192,
            confidence: Confidence::High,
            trials: 3,
            duration: Duration::from_millis(1500),
            success: true,
            evidence_source: EvidenceSource::ValidationError,
            error_message: None,
            observed_prompt_tokens: None,
            inconsistencies: 0,
            needle: None,
            positions: Vec::new(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["duration_secs"], 1.5);
        assert_eq!(json["confidence"], "high");
        assert_eq!(json["evidence_source"], "validation_error");
        assert!(json.get("needle").is_none());
        assert!(result.to_string().contains("~8192 tokens"));
    }
}
