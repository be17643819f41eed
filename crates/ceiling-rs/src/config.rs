//! Probe configuration with sensible defaults.
//!
//! [`ProbeConfig`] bundles everything the probes need besides the transport:
//! search limits, the filler generator, the error-pattern set, and request
//! sizes. All fields are public; builder methods cover the common overrides.
//!
//! ```ignore
//! let config = ProbeConfig::default()
//!     .with_search(SearchConfig::default().with_max_trials(30))
//!     .with_chars_per_token(1.2);
//! ```

use crate::data::generator::TestDataGenerator;
use crate::error::ProbeError;
use crate::search::{ErrorPatternSet, SearchConfig};

/// Completion budget for context-window probes (the reply is one word).
pub const DEFAULT_CONTEXT_COMPLETION_TOKENS: u32 = 16;

/// Completion budget for needle probes (the reply quotes the fact).
pub const DEFAULT_NEEDLE_COMPLETION_TOKENS: u32 = 64;

/// Prompt size for max-output probes.
pub const DEFAULT_OUTPUT_PROMPT_TOKENS: u32 = 1000;

/// Completion tokens a truncated response may fall short of the request
/// before it counts as silently capped.
pub const DEFAULT_TRUNCATION_SLACK: u32 = 16;

/// Settings shared by the context-window and max-output probes.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub search: SearchConfig,
    pub generator: TestDataGenerator,
    /// Extraction patterns. Each probe only uses the ones matching its
    /// [`LimitKind`](crate::search::LimitKind).
    pub patterns: ErrorPatternSet,
    /// `max_tokens` sent with plain context probes. Default: `16`.
    pub context_completion_tokens: u32,
    /// `max_tokens` sent with needle probes. Default: `64`.
    pub needle_completion_tokens: u32,
    /// Size of the fixed prompt used by output probes. Default: `1000`.
    pub output_prompt_tokens: u32,
    /// See [`DEFAULT_TRUNCATION_SLACK`]. Default: `16`.
    pub truncation_slack: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            generator: TestDataGenerator::default(),
            patterns: ErrorPatternSet::builtin(),
            context_completion_tokens: DEFAULT_CONTEXT_COMPLETION_TOKENS,
            needle_completion_tokens: DEFAULT_NEEDLE_COMPLETION_TOKENS,
            output_prompt_tokens: DEFAULT_OUTPUT_PROMPT_TOKENS,
            truncation_slack: DEFAULT_TRUNCATION_SLACK,
        }
    }
}

impl ProbeConfig {
    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub fn with_chars_per_token(mut self, ratio: f64) -> Self {
        self.generator = self.generator.with_chars_per_token(ratio);
        self
    }

    pub fn with_patterns(mut self, patterns: ErrorPatternSet) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn with_output_prompt_tokens(mut self, tokens: u32) -> Self {
        self.output_prompt_tokens = tokens;
        self
    }

    /// Check the configuration before any request is sent.
    pub fn validate(&self) -> Result<(), ProbeError> {
        self.search.validate()?;
        if self.context_completion_tokens == 0 || self.needle_completion_tokens == 0 {
            return Err(ProbeError::Config(
                "completion token budgets must be at least 1".into(),
            ));
        }
        if self.patterns.is_empty() {
            tracing::warn!("no error patterns configured; stated limits will not be read");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ProbeConfig::default();
        assert_eq!(config.search.max_trials, 40);
        assert_eq!(config.context_completion_tokens, 16);
        assert_eq!(config.output_prompt_tokens, 1000);
        assert!(!config.patterns.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builders_override() {
        let config = ProbeConfig::default()
            .with_search(SearchConfig::instant().with_max_trials(10))
            .with_chars_per_token(2.0)
            .with_output_prompt_tokens(500);
        assert_eq!(config.search.max_trials, 10);
        assert_eq!(config.generator.chars_per_token(), 2.0);
        assert_eq!(config.output_prompt_tokens, 500);
    }

    #[test]
    fn zero_budgets_rejected() {
        let config = ProbeConfig {
            context_completion_tokens: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ProbeError::Config(_))));
        let config = ProbeConfig::default().with_search(SearchConfig::default().with_max_trials(0));
        assert!(config.validate().is_err());
    }
}
