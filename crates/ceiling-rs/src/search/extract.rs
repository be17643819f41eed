//! Recovering numeric limits from vendor error text.
//!
//! Many gateways reject an oversized request with a message that states the
//! real limit ("This model's maximum context length is 8192 tokens").
//! Reading that number lets a probe skip the search entirely.
//!
//! Vendor wording drifts, so the pattern list is data: a versioned
//! [`ErrorPatternSet`] with built-in defaults that can be extended from a
//! JSON pattern file without code changes:
//!
//! ```json
//! {
//!   "version": 2,
//!   "patterns": [
//!     { "name": "acme", "pattern": "acme limit: (\\d+) tokens" },
//!     { "name": "acme_out", "kind": "output", "pattern": "acme output cap: (\\d+)" }
//!   ]
//! }
//! ```

use crate::error::ProbeError;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::LazyLock;

/// Version of the built-in pattern list.
pub const BUILTIN_PATTERNS_VERSION: u32 = 1;

/// Built-in `(name, kind, pattern)` triples, tried in order. Each pattern has
/// exactly one capture group holding the limit; thousands separators are
/// allowed.
const BUILTIN_PATTERNS: &[(&str, LimitKind, &str)] = &[
    (
        "openai_context_length",
        LimitKind::Context,
        r"maximum context length is (\d[\d,]*) tokens",
    ),
    (
        "prompt_tokens_less_than",
        LimitKind::Context,
        r"prompt tokens must be less than (\d[\d,]*)",
    ),
    (
        "openai_completion_tokens",
        LimitKind::Output,
        r"supports at most (\d[\d,]*) completion tokens",
    ),
    (
        "anthropic_prompt_too_long",
        LimitKind::Context,
        r"prompt is too long: \d[\d,]* tokens > (\d[\d,]*) maximum",
    ),
    (
        "anthropic_max_tokens",
        LimitKind::Output,
        r"max_tokens: \d[\d,]* > (\d[\d,]*)",
    ),
    (
        "gemini_tokens_allowed",
        LimitKind::Context,
        r"maximum number of tokens allowed \((\d[\d,]*)\)",
    ),
    // Not preceded by `+`: "inputs + max_new_tokens must be <= N" is a
    // shared window, not an output cap.
    (
        "max_tokens_upper_bound",
        LimitKind::Output,
        r"(?:^|[^+\s`])[\s`]*max_(?:completion_|new_)?tokens.{0,60}?(?:less than or equal to|<=|at most) (\d[\d,]*)",
    ),
    ("tgi_must_be_le", LimitKind::Context, r"must be <= (\d[\d,]*)"),
    (
        "context_window_of",
        LimitKind::Context,
        r"context (?:window|length) (?:of|is) (\d[\d,]*)",
    ),
    (
        "max_model_len",
        LimitKind::Context,
        r"max_model_len\D{0,5}(\d[\d,]*)",
    ),
    (
        "generic_token_limit",
        LimitKind::Context,
        r"(?:limit|maximum) (?:is|of) (\d[\d,]*) tokens",
    ),
];

static BUILTIN: LazyLock<ErrorPatternSet> = LazyLock::new(|| {
    let patterns = BUILTIN_PATTERNS
        .iter()
        .filter_map(|(name, kind, pattern)| {
            ErrorPattern::compile(*name, pattern)
                .ok()
                .map(|p| p.with_kind(*kind))
        })
        .collect();
    ErrorPatternSet {
        version: BUILTIN_PATTERNS_VERSION,
        patterns,
    }
});

/// Which budget a stated limit describes.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    /// The whole window. Prompt and completion share it, so the number is
    /// only an output cap when the prompt is empty.
    #[default]
    Context,
    /// The completion alone.
    Output,
}

/// One named, compiled extraction pattern.
#[derive(Debug, Clone)]
pub struct ErrorPattern {
    pub name: String,
    pub kind: LimitKind,
    regex: Regex,
}

impl ErrorPattern {
    /// Compile a pattern. Matching is always case-insensitive.
    pub fn compile(name: impl Into<String>, pattern: &str) -> Result<Self, ProbeError> {
        let regex =
            Regex::new(&format!("(?i){pattern}")).map_err(|source| ProbeError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Self {
            name: name.into(),
            kind: LimitKind::Context,
            regex,
        })
    }

    pub fn with_kind(mut self, kind: LimitKind) -> Self {
        self.kind = kind;
        self
    }

    /// The first capture of this pattern in `text`, parsed as a limit.
    pub fn extract(&self, text: &str) -> Option<u32> {
        let caps = self.regex.captures(text)?;
        let digits: String = caps.get(1)?.as_str().chars().filter(|c| *c != ',').collect();
        digits.parse::<u32>().ok().filter(|v| *v > 0)
    }
}

#[derive(Deserialize)]
struct PatternFile {
    version: u32,
    patterns: Vec<PatternFileEntry>,
}

#[derive(Deserialize)]
struct PatternFileEntry {
    name: String,
    pattern: String,
    #[serde(default)]
    kind: LimitKind,
}

/// An ordered, versioned list of extraction patterns.
#[derive(Debug, Clone)]
pub struct ErrorPatternSet {
    version: u32,
    patterns: Vec<ErrorPattern>,
}

impl Default for ErrorPatternSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ErrorPatternSet {
    /// The built-in vendor patterns.
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    /// An empty set with the given version.
    pub fn empty(version: u32) -> Self {
        Self {
            version,
            patterns: Vec::new(),
        }
    }

    /// Parse a JSON pattern file body.
    pub fn from_json(json: &str) -> Result<Self, ProbeError> {
        let file: PatternFile =
            serde_json::from_str(json).map_err(|e| ProbeError::PatternFile(e.to_string()))?;
        let mut set = Self::empty(file.version);
        for entry in file.patterns {
            set.patterns
                .push(ErrorPattern::compile(entry.name, &entry.pattern)?.with_kind(entry.kind));
        }
        Ok(set)
    }

    /// Read and parse a JSON pattern file.
    pub fn load(path: &Path) -> Result<Self, ProbeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProbeError::PatternFile(format!("{}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    /// Append a pattern at the lowest priority.
    pub fn with_pattern(mut self, pattern: ErrorPattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Put `newer` ahead of this set's patterns. The merged version is the
    /// higher of the two.
    pub fn overlay(self, newer: ErrorPatternSet) -> Self {
        let mut patterns = newer.patterns;
        patterns.extend(self.patterns);
        Self {
            version: self.version.max(newer.version),
            patterns,
        }
    }

    /// Only the patterns describing `kind` limits.
    pub fn for_kind(&self, kind: LimitKind) -> Self {
        Self {
            version: self.version,
            patterns: self
                .patterns
                .iter()
                .filter(|p| p.kind == kind)
                .cloned()
                .collect(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Return the first limit any pattern extracts, in pattern order.
    pub fn extract(&self, text: &str) -> Option<u32> {
        if text.is_empty() {
            return None;
        }
        self.patterns.iter().find_map(|p| p.extract(text))
    }

    /// Like [`extract`](Self::extract), also naming the matching pattern.
    pub fn extract_named(&self, text: &str) -> Option<(u32, &str)> {
        self.patterns
            .iter()
            .find_map(|p| p.extract(text).map(|v| (v, p.name.as_str())))
    }
}

/// Extract a token limit from error text using the built-in patterns.
pub fn extract_token_limit_from_error(text: &str) -> Option<u32> {
    BUILTIN.extract(text)
}
