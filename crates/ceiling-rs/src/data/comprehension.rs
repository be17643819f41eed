//! Needle comprehension checks.

use serde::{Deserialize, Serialize};

/// Outcome of comparing a model answer against the expected fact.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ComprehensionVerdict {
    pub correct: bool,
    pub answer: String,
    pub expected: String,
}

/// Case-insensitive substring check of a free-text answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComprehensionChecker;

impl ComprehensionChecker {
    /// Does `answer` contain `expected`, ignoring case?
    ///
    /// An empty or whitespace-only `expected` never matches.
    pub fn check(answer: &str, expected: &str) -> ComprehensionVerdict {
        let needle = expected.trim().to_lowercase();
        let correct = !needle.is_empty() && answer.to_lowercase().contains(&needle);
        ComprehensionVerdict {
            correct,
            answer: answer.to_string(),
            expected: expected.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_substring() {
        let verdict = ComprehensionChecker::check("The answer is Blue.", "blue");
        assert!(verdict.correct);
        assert_eq!(verdict.answer, "The answer is Blue.");
        assert_eq!(verdict.expected, "blue");
    }

    #[test]
    fn missing_fact_is_incorrect() {
        assert!(!ComprehensionChecker::check("I don't know.", "AMBER-FALCON-42").correct);
    }

    #[test]
    fn empty_expected_never_matches() {
        assert!(!ComprehensionChecker::check("anything", "").correct);
        assert!(!ComprehensionChecker::check("anything", "   ").correct);
    }

    #[test]
    fn surrounding_whitespace_in_expected_is_ignored() {
        assert!(ComprehensionChecker::check("code: amber-falcon-42", " AMBER-FALCON-42 ").correct);
    }
}
