//! Events and handlers for observing a probe run.
//!
//! The [`BoundarySearcher`](crate::search::BoundarySearcher) reports every
//! phase change, trial, extracted limit, and monotonicity inconsistency as a
//! [`SearchEvent`]. Callers implement [`EventHandler`] to log, render
//! progress, or persist trials.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |
//! | [`TrialLogHandler`](crate::trial_log::TrialLogHandler) | Append trials to a JSONL log |

use crate::data::generator::NeedlePosition;
use crate::search::ProbeOutcome;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Which limit a probe run is measuring.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    ContextWindow,
    MaxOutput,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::ContextWindow => write!(f, "context_window"),
            ProbeKind::MaxOutput => write!(f, "max_output"),
        }
    }
}

/// Search phase.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchPhase {
    Exponential,
    Binary,
}

impl fmt::Display for SearchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchPhase::Exponential => write!(f, "exponential"),
            SearchPhase::Binary => write!(f, "binary"),
        }
    }
}

/// Identifies the probe run an event belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeScope {
    pub model: String,
    pub kind: ProbeKind,
    pub needle: Option<NeedlePosition>,
}

impl ProbeScope {
    pub fn new(model: impl Into<String>, kind: ProbeKind) -> Self {
        Self {
            model: model.into(),
            kind,
            needle: None,
        }
    }

    pub fn with_needle(mut self, position: NeedlePosition) -> Self {
        self.needle = Some(position);
        self
    }
}

/// Events emitted by the searcher.
#[derive(Debug)]
pub enum SearchEvent<'a> {
    /// A search phase is starting. `upper` is `None` for the open-ended
    /// exponential phase.
    PhaseStarted {
        phase: SearchPhase,
        lower: u32,
        upper: Option<u32>,
    },
    /// One oracle call completed.
    Trial {
        phase: SearchPhase,
        trial: u32,
        max_trials: u32,
        outcome: &'a ProbeOutcome,
    },
    /// Failure text stated the limit directly; the search stops here.
    LimitExtracted { value: u32, error_text: &'a str },
    /// An outcome contradicts an earlier one (success above a known failure,
    /// or failure below a known success).
    Inconsistency {
        candidate: u32,
        succeeded: bool,
        conflicting: u32,
    },
    /// The trial budget ran out before the phase converged.
    BudgetExhausted { phase: SearchPhase, trials: u32 },
    /// A phase finished with the given bound.
    PhaseFinished {
        phase: SearchPhase,
        value: u32,
        trials: u32,
    },
}

/// Handler for search events.
///
/// The default implementation ignores every event.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, scope: &ProbeScope, event: &SearchEvent<'_>) {
        let _ = (scope, event);
    }
}

/// A handler that ignores all events.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|_scope, event| {
///     if let SearchEvent::Trial { outcome, .. } = event {
///         println!("{} -> {}", outcome.candidate_value, outcome.succeeded);
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&ProbeScope, &SearchEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&ProbeScope, &SearchEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&ProbeScope, &SearchEvent<'_>) + Send + Sync,
{
    fn on_event(&self, scope: &ProbeScope, event: &SearchEvent<'_>) {
        (self.0)(scope, event)
    }
}

/// Dispatches every event to each inner handler in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_opt(trial_log);
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Add a handler to the chain.
    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Add a handler from an `Option`. `None` is a no-op.
    pub fn with_opt(self, handler: Option<impl EventHandler + 'static>) -> Self {
        match handler {
            Some(h) => self.with(h),
            None => self,
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, scope: &ProbeScope, event: &SearchEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(scope, event);
        }
    }
}

/// Logs search events through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, scope: &ProbeScope, event: &SearchEvent<'_>) {
        let label = match scope.needle {
            Some(position) => format!("{}/{} [{position}]", scope.model, scope.kind),
            None => format!("{}/{}", scope.model, scope.kind),
        };
        match event {
            SearchEvent::PhaseStarted {
                phase,
                lower,
                upper,
            } => match upper {
                Some(upper) => info!("{label}: {phase} phase over [{lower}, {upper}]"),
                None => info!("{label}: {phase} phase from {lower}"),
            },
            SearchEvent::Trial {
                phase,
                trial,
                max_trials,
                outcome,
            } => {
                if outcome.succeeded {
                    debug!(
                        "{label}: [{phase} {trial}/{max_trials}] {} accepted ({} tokens)",
                        outcome.candidate_value, outcome.estimated_tokens
                    );
                } else {
                    let preview: String = outcome.error_text.chars().take(160).collect();
                    debug!(
                        "{label}: [{phase} {trial}/{max_trials}] {} rejected ({}): {preview}",
                        outcome.candidate_value, outcome.evidence_source
                    );
                }
            }
            SearchEvent::LimitExtracted { value, .. } => {
                info!("{label}: endpoint stated limit {value}");
            }
            SearchEvent::Inconsistency {
                candidate,
                succeeded,
                conflicting,
            } => {
                let verb = if *succeeded { "accepted" } else { "rejected" };
                warn!(
                    "{label}: non-monotonic response: {candidate} {verb} despite earlier result at {conflicting}"
                );
            }
            SearchEvent::BudgetExhausted { phase, trials } => {
                warn!("{label}: {phase} phase stopped after {trials} trials (budget exhausted)");
            }
            SearchEvent::PhaseFinished {
                phase,
                value,
                trials,
            } => {
                info!("{label}: {phase} phase settled at {value} after {trials} trials");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn composite_dispatches_to_all() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let a = seen.clone();
        let b = seen.clone();
        let handler = CompositeEventHandler::new()
            .with(FnEventHandler::new(move |_, _| a.lock().unwrap().push("a")))
            .with(FnEventHandler::new(move |_, _| b.lock().unwrap().push("b")))
            .with_opt(None::<NoopHandler>);
        assert_eq!(handler.len(), 2);

        let scope = ProbeScope::new("m", ProbeKind::ContextWindow);
        handler.on_event(
            &scope,
            &SearchEvent::BudgetExhausted {
                phase: SearchPhase::Binary,
                trials: 40,
            },
        );
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn logging_handler_accepts_every_event() {
        let scope = ProbeScope::new("m", ProbeKind::MaxOutput).with_needle(NeedlePosition::Middle);
        let outcome = ProbeOutcome::success(4096, 4100);
        let events = [
            SearchEvent::PhaseStarted {
                phase: SearchPhase::Exponential,
                lower: 4096,
                upper: None,
            },
            SearchEvent::Trial {
                phase: SearchPhase::Exponential,
                trial: 1,
                max_trials: 40,
                outcome: &outcome,
            },
            SearchEvent::LimitExtracted {
                value: 8192,
                error_text: "maximum context length is 8192 tokens",
            },
            SearchEvent::Inconsistency {
                candidate: 9000,
                succeeded: true,
                conflicting: 8192,
            },
        ];
        for event in &events {
            LoggingHandler.on_event(&scope, event);
        }
    }

    #[test]
    fn kind_display_matches_serde() {
        assert_eq!(ProbeKind::ContextWindow.to_string(), "context_window");
        assert_eq!(
            serde_json::to_string(&ProbeKind::MaxOutput).unwrap(),
            "\"max_output\""
        );
    }
}
