//! Two-phase boundary search over a [`ProbeOracle`].
//!
//! The searcher looks for an unknown threshold `T` where the oracle accepts
//! every `x <= T` and rejects every `x > T`:
//!
//! 1. **Exponential phase** ([`BoundarySearcher::exponential_search`]):
//!    start at `initial_value` and double on every success until the first
//!    rejection or `max_value`. Each success immediately probes the doubled
//!    value, and a value that already succeeded is never probed again.
//! 2. **Binary phase** ([`BoundarySearcher::search`]): halve the bracket
//!    until it is no wider than `tolerance`, pacing calls to stay clear of the
//!    endpoint's rate limit.
//!
//! Either phase stops as soon as an endpoint rejection's error text states
//! the limit outright. Transport errors abort the search; every other negative answer
//! is just a "no".
//!
//! # Example
//!
//! ```ignore
//! let searcher = BoundarySearcher::new(SearchConfig::default(), scope)
//!     .with_event_handler(&LoggingHandler);
//! let grow = searcher.exponential_search(&oracle).await?;
//! if let Some(failed) = grow.failed_candidate() {
//!     let refined = searcher
//!         .with_max_trials(searcher.config().max_trials - grow.trials)
//!         .search(grow.value, failed, &oracle)
//!         .await?;
//! }
//! ```

use super::confidence::{Confidence, calculate_confidence};
use super::extract::ErrorPatternSet;
use super::oracle::{EvidenceSource, ProbeOracle, ProbeOutcome};
use crate::error::ProbeError;
use crate::events::{EventHandler, NoopHandler, ProbeScope, SearchEvent, SearchPhase};
use std::time::Duration;
use tracing::{debug, trace};

/// Hard cap on oracle calls per search.
pub const DEFAULT_MAX_TRIALS: u32 = 40;
/// First candidate of the exponential phase.
pub const DEFAULT_INITIAL_VALUE: u32 = 4096;
/// Bracket width at which the binary phase stops.
pub const DEFAULT_TOLERANCE: u32 = 128;
/// Delay between binary-phase calls.
pub const DEFAULT_PACING: Duration = Duration::from_secs(1);
/// How far below the last exponential success the context probe's binary
/// phase starts.
pub const DEFAULT_REFINE_MARGIN: u32 = 1024;
/// Largest candidate the exponential phase will try (16M tokens).
pub const DEFAULT_MAX_VALUE: u32 = 1 << 24;

/// Search tuning knobs.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Maximum oracle calls in one search. Default: `40`.
    pub max_trials: u32,
    /// Starting candidate for the exponential phase. Default: `4096`.
    pub initial_value: u32,
    /// Binary refinement stops when `upper - lower <= tolerance`. Default: `128`.
    pub tolerance: u32,
    /// Sleep between binary-phase calls. Default: 1 second.
    pub pacing: Duration,
    /// Margin below the last success used to open the refinement window.
    /// Default: `1024`.
    pub refine_margin: u32,
    /// Ceiling on exponential-phase candidates. An endpoint that never
    /// rejects stops here instead of doubling without bound. Default: `2^24`.
    pub max_value: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_trials: DEFAULT_MAX_TRIALS,
            initial_value: DEFAULT_INITIAL_VALUE,
            tolerance: DEFAULT_TOLERANCE,
            pacing: DEFAULT_PACING,
            refine_margin: DEFAULT_REFINE_MARGIN,
            max_value: DEFAULT_MAX_VALUE,
        }
    }
}

impl SearchConfig {
    /// Default limits with no pacing delay. Meant for tests and local fakes.
    pub fn instant() -> Self {
        Self {
            pacing: Duration::ZERO,
            ..Default::default()
        }
    }

    pub fn with_max_trials(mut self, max_trials: u32) -> Self {
        self.max_trials = max_trials;
        self
    }

    pub fn with_initial_value(mut self, value: u32) -> Self {
        self.initial_value = value;
        self
    }

    pub fn with_tolerance(mut self, tolerance: u32) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_refine_margin(mut self, margin: u32) -> Self {
        self.refine_margin = margin;
        self
    }

    pub fn with_max_value(mut self, max_value: u32) -> Self {
        self.max_value = max_value;
        self
    }

    /// Reject configurations the searcher cannot run with.
    pub fn validate(&self) -> Result<(), ProbeError> {
        if self.max_trials == 0 {
            return Err(ProbeError::Config("max_trials must be at least 1".into()));
        }
        if self.initial_value == 0 {
            return Err(ProbeError::Config("initial_value must be at least 1".into()));
        }
        if self.initial_value > self.max_value {
            return Err(ProbeError::Config(format!(
                "initial_value {} exceeds max_value {}",
                self.initial_value, self.max_value
            )));
        }
        Ok(())
    }
}

/// Mutable bookkeeping for one search call.
#[derive(Debug, Clone)]
struct SearchState {
    lower_bound: u32,
    upper_bound: u32,
    trials_used: u32,
    max_trials: u32,
    initial_value: u32,
}

impl SearchState {
    fn new(config: &SearchConfig, lower_bound: u32, upper_bound: u32) -> Self {
        Self {
            lower_bound,
            upper_bound,
            trials_used: 0,
            max_trials: config.max_trials,
            initial_value: config.initial_value,
        }
    }

    fn has_budget(&self) -> bool {
        self.trials_used < self.max_trials
    }

    /// Charge an outcome against the budget. The count never passes
    /// `max_trials`, whatever the oracle reports.
    fn spend(&mut self, outcome: &ProbeOutcome) {
        let charged = outcome.trials_consumed.max(1);
        self.trials_used = self.trials_used.saturating_add(charged).min(self.max_trials);
    }
}

/// The highest accepted and lowest rejected candidates seen so far.
///
/// Used to flag responses that contradict the monotonic-threshold
/// assumption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KnownBounds {
    pub highest_success: Option<u32>,
    pub lowest_failure: Option<u32>,
}

impl KnownBounds {
    /// The earlier observation `outcome` contradicts, if any.
    pub fn conflict(&self, outcome: &ProbeOutcome) -> Option<u32> {
        let candidate = outcome.candidate_value;
        if outcome.succeeded {
            self.lowest_failure.filter(|f| candidate >= *f)
        } else {
            self.highest_success.filter(|s| candidate <= *s)
        }
    }

    pub fn record(&mut self, outcome: &ProbeOutcome) {
        let candidate = outcome.candidate_value;
        if outcome.succeeded {
            self.highest_success = Some(self.highest_success.map_or(candidate, |s| s.max(candidate)));
        } else {
            self.lowest_failure = Some(self.lowest_failure.map_or(candidate, |f| f.min(candidate)));
        }
    }
}

/// Result of the exponential phase.
#[derive(Debug, Clone)]
pub struct ExponentialOutcome {
    /// Last accepted candidate, or the last probed candidate when nothing
    /// was accepted.
    pub value: u32,
    /// Whether any candidate was accepted.
    pub success: bool,
    pub trials: u32,
    pub last_success: Option<ProbeOutcome>,
    /// The rejection that ended the phase, if any.
    pub last_failure: Option<ProbeOutcome>,
    /// Limit read from the rejection's error text.
    pub extracted_limit: Option<u32>,
    pub known: KnownBounds,
    pub inconsistencies: u32,
    pub budget_exhausted: bool,
    /// `max_value` was accepted, so the phase stopped without an upper bound.
    pub reached_max_value: bool,
    pub history: Vec<ProbeOutcome>,
}

impl ExponentialOutcome {
    /// The rejected candidate that closed the phase.
    pub fn failed_candidate(&self) -> Option<u32> {
        self.last_failure.as_ref().map(|f| f.candidate_value)
    }
}

/// Result of the binary phase.
#[derive(Debug, Clone)]
pub struct Refinement {
    /// Final lower bound.
    pub value: u32,
    /// Oracle outcome at `value`, when that candidate was probed during
    /// refinement.
    pub outcome: Option<ProbeOutcome>,
    /// Final upper bound.
    pub upper: u32,
    pub trials: u32,
    pub extracted_limit: Option<u32>,
    pub inconsistencies: u32,
    pub budget_exhausted: bool,
    pub history: Vec<ProbeOutcome>,
}

/// Two-phase integer boundary search.
pub struct BoundarySearcher<'h> {
    config: SearchConfig,
    patterns: ErrorPatternSet,
    handler: &'h dyn EventHandler,
    scope: ProbeScope,
}

impl<'h> BoundarySearcher<'h> {
    /// Create a searcher with the built-in error patterns and no event
    /// handler.
    pub fn new(config: SearchConfig, scope: ProbeScope) -> Self {
        Self {
            config,
            patterns: ErrorPatternSet::builtin(),
            handler: &NoopHandler,
            scope,
        }
    }

    pub fn with_event_handler(mut self, handler: &'h dyn EventHandler) -> Self {
        self.handler = handler;
        self
    }

    pub fn with_patterns(mut self, patterns: ErrorPatternSet) -> Self {
        self.patterns = patterns;
        self
    }

    /// A copy of this searcher limited to `max_trials` calls. Used to hand
    /// the binary phase whatever budget the exponential phase left over.
    pub fn with_max_trials(&self, max_trials: u32) -> BoundarySearcher<'h> {
        BoundarySearcher {
            config: self.config.clone().with_max_trials(max_trials),
            patterns: self.patterns.clone(),
            handler: self.handler,
            scope: self.scope.clone(),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn scope(&self) -> &ProbeScope {
        &self.scope
    }

    /// Read a limit from error text using this searcher's patterns.
    pub fn extract_token_limit_from_error(&self, text: &str) -> Option<u32> {
        self.patterns.extract(text)
    }

    /// The limit an endpoint rejection states, if any. Text the oracle wrote
    /// itself (missing usage, truncation, failed comprehension) is never
    /// mined.
    fn stated_limit(&self, outcome: &ProbeOutcome) -> Option<u32> {
        let from_endpoint = matches!(
            outcome.evidence_source,
            EvidenceSource::ValidationError | EvidenceSource::ApiError
        ) && outcome.comprehension.is_none();
        if from_endpoint {
            self.patterns.extract(&outcome.error_text)
        } else {
            None
        }
    }

    pub fn calculate_confidence(
        &self,
        trials: u32,
        evidence_source: EvidenceSource,
        value: u32,
    ) -> Confidence {
        calculate_confidence(trials, evidence_source, value)
    }

    fn emit(&self, event: SearchEvent<'_>) {
        self.handler.on_event(&self.scope, &event);
    }

    async fn pace(&self) {
        if !self.config.pacing.is_zero() {
            trace!("pacing {:?} before next probe", self.config.pacing);
            tokio::time::sleep(self.config.pacing).await;
        }
    }

    /// Record `outcome` in `known`, reporting a contradiction first.
    fn observe(&self, known: &mut KnownBounds, outcome: &ProbeOutcome) -> bool {
        let conflict = known.conflict(outcome);
        if let Some(conflicting) = conflict {
            self.emit(SearchEvent::Inconsistency {
                candidate: outcome.candidate_value,
                succeeded: outcome.succeeded,
                conflicting,
            });
        }
        known.record(outcome);
        conflict.is_some()
    }

    /// Grow the candidate by doubling until the oracle rejects it.
    pub async fn exponential_search(
        &self,
        oracle: &dyn ProbeOracle,
    ) -> Result<ExponentialOutcome, ProbeError> {
        let phase = SearchPhase::Exponential;
        let mut state = SearchState::new(&self.config, 0, u32::MAX);
        let max_value = self.config.max_value.max(1);
        let mut candidate = state.initial_value.clamp(1, max_value);
        let mut last_probed = candidate;
        let mut known = KnownBounds::default();
        let mut inconsistencies = 0;
        let mut history = Vec::new();
        let mut last_success: Option<ProbeOutcome> = None;
        let mut last_failure: Option<ProbeOutcome> = None;
        let mut extracted_limit = None;
        let mut reached_max_value = false;

        self.emit(SearchEvent::PhaseStarted {
            phase,
            lower: candidate,
            upper: None,
        });

        while state.has_budget() {
            let outcome = oracle.call(candidate).await?;
            state.spend(&outcome);
            last_probed = candidate;
            if self.observe(&mut known, &outcome) {
                inconsistencies += 1;
            }
            self.emit(SearchEvent::Trial {
                phase,
                trial: state.trials_used,
                max_trials: state.max_trials,
                outcome: &outcome,
            });
            history.push(outcome.clone());

            if outcome.succeeded {
                state.lower_bound = candidate;
                last_success = Some(outcome);
                if candidate >= max_value {
                    debug!("candidate {candidate} reached max_value without a rejection");
                    reached_max_value = true;
                    break;
                }
                candidate = candidate.saturating_mul(2).min(max_value);
            } else {
                state.upper_bound = candidate;
                extracted_limit = self.stated_limit(&outcome);
                if let Some(value) = extracted_limit {
                    self.emit(SearchEvent::LimitExtracted {
                        value,
                        error_text: &outcome.error_text,
                    });
                }
                last_failure = Some(outcome);
                break;
            }
        }

        let budget_exhausted = last_failure.is_none() && !reached_max_value && !state.has_budget();
        if budget_exhausted {
            self.emit(SearchEvent::BudgetExhausted {
                phase,
                trials: state.trials_used,
            });
        }

        let (value, success) = match &last_success {
            Some(s) => (s.candidate_value, true),
            None => (last_probed, false),
        };
        debug!(
            "exponential phase: value={value} success={success} bracket=[{}, {}] trials={}",
            state.lower_bound, state.upper_bound, state.trials_used
        );
        self.emit(SearchEvent::PhaseFinished {
            phase,
            value,
            trials: state.trials_used,
        });

        Ok(ExponentialOutcome {
            value,
            success,
            trials: state.trials_used,
            last_success,
            last_failure,
            extracted_limit,
            known,
            inconsistencies,
            budget_exhausted,
            reached_max_value,
            history,
        })
    }

    /// Binary-refine the threshold inside `[lower, upper]`.
    pub async fn search(
        &self,
        lower: u32,
        upper: u32,
        oracle: &dyn ProbeOracle,
    ) -> Result<Refinement, ProbeError> {
        self.search_with_evidence(lower, upper, KnownBounds::default(), oracle)
            .await
    }

    /// Binary-refine inside `[lower, upper]`, checking each answer against
    /// observations from an earlier phase.
    pub async fn search_with_evidence(
        &self,
        lower: u32,
        upper: u32,
        mut known: KnownBounds,
        oracle: &dyn ProbeOracle,
    ) -> Result<Refinement, ProbeError> {
        let phase = SearchPhase::Binary;
        let mut state = SearchState::new(&self.config, lower.min(upper), lower.max(upper));
        let mut lower_outcome: Option<ProbeOutcome> = None;
        let mut extracted_limit = None;
        let mut inconsistencies = 0;
        let mut history = Vec::new();

        self.emit(SearchEvent::PhaseStarted {
            phase,
            lower: state.lower_bound,
            upper: Some(state.upper_bound),
        });

        while state.upper_bound - state.lower_bound > self.config.tolerance && state.has_budget() {
            if state.trials_used > 0 {
                self.pace().await;
            }
            let mid = state.lower_bound + (state.upper_bound - state.lower_bound) / 2;
            let outcome = oracle.call(mid).await?;
            state.spend(&outcome);
            if self.observe(&mut known, &outcome) {
                inconsistencies += 1;
            }
            self.emit(SearchEvent::Trial {
                phase,
                trial: state.trials_used,
                max_trials: state.max_trials,
                outcome: &outcome,
            });
            history.push(outcome.clone());

            if outcome.succeeded {
                state.lower_bound = mid;
                lower_outcome = Some(outcome);
            } else {
                state.upper_bound = mid;
                extracted_limit = self.stated_limit(&outcome);
                if let Some(value) = extracted_limit {
                    self.emit(SearchEvent::LimitExtracted {
                        value,
                        error_text: &outcome.error_text,
                    });
                    break;
                }
            }
            debug_assert!(state.lower_bound <= state.upper_bound);
        }

        let budget_exhausted = extracted_limit.is_none()
            && state.upper_bound - state.lower_bound > self.config.tolerance;
        if budget_exhausted {
            self.emit(SearchEvent::BudgetExhausted {
                phase,
                trials: state.trials_used,
            });
        }
        debug!(
            "binary phase: bracket=[{}, {}] trials={}",
            state.lower_bound, state.upper_bound, state.trials_used
        );
        self.emit(SearchEvent::PhaseFinished {
            phase,
            value: state.lower_bound,
            trials: state.trials_used,
        });

        Ok(Refinement {
            value: state.lower_bound,
            outcome: lower_outcome,
            upper: state.upper_bound,
            trials: state.trials_used,
            extracted_limit,
            inconsistencies,
            budget_exhausted,
            history,
        })
    }
}
