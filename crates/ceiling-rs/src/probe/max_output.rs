//! Max-output-token discovery.
//!
//! Every trial sends the same ~1000-token prompt asking for an endless essay
//! and varies only `max_tokens`. Three things can happen:
//!
//! - the endpoint rejects the parameter, often stating its limit: a
//!   rejection, and a stated limit ends the search;
//! - generation stops at the length cap with fewer completion tokens than
//!   requested: the endpoint silently capped the output, which is a
//!   rejection whose completion count is an observed ceiling;
//! - anything else is an accepted candidate.
//!
//! The binary phase runs inside `[upper / 2, upper]`, raised to the highest
//! observed ceiling when that is larger.

use super::{MISSING_USAGE, last_error_text, serialize_secs, success_at};
use crate::api::{ProbeRequest, ProbeTransport, classify_failure, is_rate_limited};
use crate::config::ProbeConfig;
use crate::error::ProbeError;
use crate::events::{EventHandler, NoopHandler, ProbeKind, ProbeScope};
use crate::search::{
    BoundarySearcher, Confidence, EvidenceSource, LimitKind, OracleFuture, ProbeOracle,
    ProbeOutcome,
};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of a max-output probe run.
#[derive(Serialize, Debug, Clone)]
pub struct MaxOutputResult {
    pub model: String,
    /// Largest completion size (in tokens) the endpoint honored.
    pub max_output_tokens: u32,
    pub confidence: Confidence,
    pub trials: u32,
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,
    pub success: bool,
    pub evidence_source: EvidenceSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Completion tokens actually produced at `max_output_tokens`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_completion_tokens: Option<u32>,
    /// Some response was cut short below the requested size.
    pub truncated: bool,
    pub inconsistencies: u32,
}

impl fmt::Display for MaxOutputResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.success {
            write!(
                f,
                "{}: max output ~{} tokens",
                self.model, self.max_output_tokens
            )?;
        } else {
            write!(
                f,
                "{}: no output size accepted (last tried {})",
                self.model, self.max_output_tokens
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
        if self.truncated {
            write!(f, "; output silently truncated")?;
        }
        Ok(())
    }
}

/// Requests `candidate` completion tokens for a fixed prompt.
struct OutputOracle<'a> {
    transport: &'a dyn ProbeTransport,
    model: &'a str,
    prompt: String,
    truncation_slack: u32,
}

impl ProbeOracle for OutputOracle<'_> {
    fn call(&self, candidate: u32) -> OracleFuture<'_> {
        Box::pin(async move {
            let request = ProbeRequest::user(self.prompt.clone(), candidate);
            let response = self.transport.probe_once(self.model, &request).await?;

            if !response.success {
                if is_rate_limited(response.status, &response.error_text) {
                    warn!("rate limited at max_tokens={candidate}; counted as a rejection");
                }
                let evidence = classify_failure(response.status, &response.error_text);
                return Ok(ProbeOutcome::failure(candidate, evidence, response.error_text));
            }

            let Some(completion) = response.completion_tokens() else {
                return Ok(ProbeOutcome::failure(
                    candidate,
                    EvidenceSource::Error,
                    MISSING_USAGE,
                ));
            };

            if response.hit_length_limit()
                && completion.saturating_add(self.truncation_slack) < candidate
            {
                debug!("max_tokens={candidate} truncated at {completion} completion tokens");
                return Ok(ProbeOutcome::failure(
                    candidate,
                    EvidenceSource::MaxOutputIncomplete,
                    format!("output truncated at {completion} of {candidate} requested tokens"),
                )
                .with_estimated_tokens(completion));
            }
            Ok(ProbeOutcome::success(candidate, completion))
        })
    }
}

/// Discovers the largest completion an endpoint produces for a model.
pub struct MaxOutputTokensProbe<'a> {
    transport: &'a dyn ProbeTransport,
    config: ProbeConfig,
    handler: &'a dyn EventHandler,
}

impl<'a> MaxOutputTokensProbe<'a> {
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

    pub async fn probe(&self, model: &str) -> Result<MaxOutputResult, ProbeError> {
        self.config.validate()?;
        let start = Instant::now();
        let searcher = BoundarySearcher::new(
            self.config.search.clone(),
            ProbeScope::new(model, ProbeKind::MaxOutput),
        )
        .with_event_handler(self.handler)
        .with_patterns(self.config.patterns.for_kind(LimitKind::Output));
        let oracle = OutputOracle {
            transport: self.transport,
            model,
            prompt: self
                .config
                .generator
                .generate_output_prompt(self.config.output_prompt_tokens),
            truncation_slack: self.config.truncation_slack,
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
            match truncation_ceiling(&history) {
                Some(ceiling) => {
                    let evidence = EvidenceSource::MaxOutputIncomplete;
                    let confidence = searcher.calculate_confidence(trials, evidence, ceiling);
                    (ceiling, true, evidence, confidence)
                }
                None => {
                    let evidence = grow
                        .last_failure
                        .as_ref()
                        .map_or(EvidenceSource::Error, |f| f.evidence_source);
                    (grow.value, false, evidence, Confidence::Low)
                }
            }
        } else {
            let mut value = grow.value;
            let mut evidence = EvidenceSource::Success;
            let remaining = searcher.config().max_trials.saturating_sub(grow.trials);
            if let Some(upper) = grow.failed_candidate().filter(|_| remaining > 0) {
                let lower = truncation_ceiling(&history)
                    .filter(|c| *c < upper)
                    .map_or(upper / 2, |c| c.max(upper / 2));
                let refined = searcher
                    .with_max_trials(remaining)
                    .search_with_evidence(lower, upper, grow.known, &oracle)
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
            if evidence == EvidenceSource::Success && truncation_ceiling(&history) == Some(value) {
                evidence = EvidenceSource::MaxOutputIncomplete;
            }
            let confidence = if grow.reached_max_value {
                Confidence::Low
            } else {
                searcher.calculate_confidence(trials, evidence, value)
            };
            (value, true, evidence, confidence)
        };

        let observed = success_at(&history, value)
            .map(|o| o.estimated_tokens)
            .or_else(|| truncation_ceiling(&history).filter(|c| *c == value))
            .filter(|t| *t > 0);
        let result = MaxOutputResult {
            model: model.to_string(),
            max_output_tokens: value,
            confidence,
            trials,
            duration: start.elapsed(),
            success,
            evidence_source,
            error_message: last_error_text(&history),
            observed_completion_tokens: observed,
            truncated: truncation_ceiling(&history).is_some(),
            inconsistencies,
        };
        info!(
            "max output for {model}: {} tokens ({} confidence, {} trials)",
            result.max_output_tokens, result.confidence, result.trials
        );
        Ok(result)
    }
}

/// Highest completion count among truncated responses.
fn truncation_ceiling(history: &[ProbeOutcome]) -> Option<u32> {
    history
        .iter()
        .filter(|o| o.evidence_source == EvidenceSource::MaxOutputIncomplete)
        .map(|o| o.estimated_tokens)
        .filter(|t| *t > 0)
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UsageInfo;
    use crate::api::{ProbeResponse, TransportFuture};
    use crate::search::SearchConfig;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// How the fake endpoint handles an oversized `max_tokens`.
    enum Cap {
        /// Reject anything above the cap with this error text.
        Reject(u32, &'static str),
        /// Accept anything but stop generating at the cap.
        Truncate(u32),
        /// Prompt and completion share one window; overflow is rejected
        /// with vLLM's context-length message.
        SharedWindow(u32),
        /// The model always ends its answer after this many tokens.
        StopsAt(u32),
    }

    struct FakeEndpoint {
        cap: Cap,
        calls: AtomicU32,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeEndpoint {
        fn new(cap: Cap) -> Self {
            Self {
                cap,
                calls: AtomicU32::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    const PROMPT_TOKENS: u32 = 1000;

    fn finished(completion: u32, finish_reason: &str) -> ProbeResponse {
        ProbeResponse::completed(
            Some("...".into()),
            Some(UsageInfo {
                prompt_tokens: Some(PROMPT_TOKENS),
                completion_tokens: Some(completion),
                total_tokens: Some(PROMPT_TOKENS + completion),
            }),
            Some(finish_reason.into()),
        )
    }

    impl ProbeTransport for FakeEndpoint {
        fn probe_once<'a>(
            &'a self,
            _model: &'a str,
            request: &'a ProbeRequest,
        ) -> TransportFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(content) = request.messages[0].content.clone() {
                self.prompts.lock().unwrap().push(content);
            }
            let requested = request.max_tokens;
            let response = match self.cap {
                Cap::Reject(cap, text) if requested > cap => {
                    ProbeResponse::rejected(Some(400), text.replace("{n}", &requested.to_string()))
                }
                Cap::Reject(..) => finished(requested, "length"),
                Cap::Truncate(cap) => finished(requested.min(cap), "length"),
                Cap::SharedWindow(window) if PROMPT_TOKENS + requested > window => {
                    ProbeResponse::rejected(
                        Some(400),
                        format!(
                            "This model's maximum context length is {window} tokens. However, \
                             you requested {} tokens ({PROMPT_TOKENS} in the messages, \
                             {requested} in the completion).",
                            PROMPT_TOKENS + requested
                        ),
                    )
                }
                Cap::SharedWindow(_) => finished(requested, "length"),
                Cap::StopsAt(tokens) => finished(requested.min(tokens), "stop"),
            };
            Box::pin(async move { Ok(response) })
        }
    }

    fn config() -> ProbeConfig {
        ProbeConfig::default().with_search(SearchConfig::instant())
    }

    #[tokio::test]
    async fn stated_limit_is_accepted_directly() {
        let endpoint = FakeEndpoint::new(Cap::Reject(
            32_768,
            "max_tokens: {n} > 32768, which is the maximum allowed number of output tokens",
        ));
        let result = MaxOutputTokensProbe::new(&endpoint, config())
            .probe("test/model")
            .await
            .unwrap();
        assert_eq!(result.max_output_tokens, 32_768);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.evidence_source, EvidenceSource::ValidationError);
        // 4096, 8192, 16384, 32768 accepted; 65536 rejected.
        assert_eq!(result.trials, 5);
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn unexplained_rejection_is_refined_between_half_and_upper() {
        let endpoint = FakeEndpoint::new(Cap::Reject(20_000, "invalid request"));
        let result = MaxOutputTokensProbe::new(&endpoint, config())
            .probe("test/model")
            .await
            .unwrap();
        assert!(result.success);
        assert!(
            (19_872..=20_000).contains(&result.max_output_tokens),
            "got {}",
            result.max_output_tokens
        );
        assert_eq!(result.evidence_source, EvidenceSource::Success);
        assert_eq!(
            result.observed_completion_tokens,
            Some(result.max_output_tokens)
        );
        assert_eq!(result.trials, endpoint.calls.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn shared_window_limit_is_not_taken_as_output_cap() {
        let endpoint = FakeEndpoint::new(Cap::SharedWindow(8192));
        let result = MaxOutputTokensProbe::new(&endpoint, config())
            .probe("test/model")
            .await
            .unwrap();
        let fits = 8192 - PROMPT_TOKENS;
        assert!(result.success);
        assert!(
            result.max_output_tokens <= fits && fits - result.max_output_tokens <= 128,
            "got {}, {fits} fit",
            result.max_output_tokens
        );
        assert_eq!(result.evidence_source, EvidenceSource::Success);
        assert!(result.trials > 2);
    }

    #[tokio::test]
    async fn early_natural_stops_end_at_max_value() {
        let endpoint = FakeEndpoint::new(Cap::StopsAt(2_000));
        let config = ProbeConfig::default()
            .with_search(SearchConfig::instant().with_max_value(65_536));
        let result = MaxOutputTokensProbe::new(&endpoint, config)
            .probe("test/model")
            .await
            .unwrap();
        // 4096, 8192, 16384, 32768, 65536
        assert_eq!(result.trials, 5);
        assert_eq!(result.max_output_tokens, 65_536);
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.observed_completion_tokens, Some(2_000));
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn silent_truncation_reports_the_ceiling() {
        let endpoint = FakeEndpoint::new(Cap::Truncate(10_000));
        let result = MaxOutputTokensProbe::new(&endpoint, config())
            .probe("test/model")
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.truncated);
        assert!(
            (9_872..=10_016).contains(&result.max_output_tokens),
            "got {}",
            result.max_output_tokens
        );
        assert!(
            result
                .error_message
                .as_deref()
                .is_some_and(|e| e.starts_with("output truncated at 10000"))
        );
        assert!(result.to_string().contains("silently truncated"));
    }

    #[tokio::test]
    async fn truncation_below_initial_value_still_reports_ceiling() {
        let endpoint = FakeEndpoint::new(Cap::Truncate(2_000));
        let result = MaxOutputTokensProbe::new(&endpoint, config())
            .probe("test/model")
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.trials, 1);
        assert_eq!(result.max_output_tokens, 2_000);
        assert_eq!(result.evidence_source, EvidenceSource::MaxOutputIncomplete);
        assert_eq!(result.observed_completion_tokens, Some(2_000));
    }

    #[tokio::test]
    async fn prompt_is_fixed_across_trials() {
        let endpoint = FakeEndpoint::new(Cap::Reject(20_000, "invalid request"));
        MaxOutputTokensProbe::new(&endpoint, config())
            .probe("test/model")
            .await
            .unwrap();
        let prompts = endpoint.prompts.lock().unwrap();
        assert!(prompts.len() > 1);
        assert!(prompts.iter().all(|p| p == &prompts[0]));
        let tokens = crate::data::TestDataGenerator::new().estimate_tokens(&prompts[0]);
        assert_eq!(tokens, 1000);
    }

    #[tokio::test]
    async fn missing_usage_fails_the_first_trial() {
        struct NoUsage;
        impl ProbeTransport for NoUsage {
            fn probe_once<'a>(
                &'a self,
                _model: &'a str,
                _request: &'a ProbeRequest,
            ) -> TransportFuture<'a> {
                Box::pin(async {
                    Ok(ProbeResponse::completed(Some("text".into()), None, Some("stop".into())))
                })
            }
        }
        let result = MaxOutputTokensProbe::new(&NoUsage, config())
            .probe("test/model")
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.confidence, Confidence::Low);
        assert_eq!(result.trials, 1);
        assert_eq!(result.max_output_tokens, 4096);
        assert_eq!(result.error_message.as_deref(), Some(MISSING_USAGE));
    }
}
