//! Confidence labels for probe estimates.

use super::oracle::EvidenceSource;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trial-efficiency ratio above which a searched estimate is rated high.
pub const HIGH_EFFICIENCY_RATIO: f64 = 0.8;

/// How much a probe estimate can be trusted.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

/// Rate an estimate from the trials spent, where the bound came from, and
/// the estimated value.
///
/// A limit the endpoint stated itself is always `High`. A searched estimate
/// is `High` when the trial count is large relative to `log2(value)`, the
/// number of halvings needed to pin the value down from scratch. Never
/// returns `Low`; callers assign that when no bound was found at all.
pub fn calculate_confidence(trials: u32, evidence_source: EvidenceSource, value: u32) -> Confidence {
    if evidence_source == EvidenceSource::ValidationError {
        return Confidence::High;
    }
    let bits = f64::from(value).log2();
    if bits <= 0.0 {
        return Confidence::Medium;
    }
    if f64::from(trials) / bits > HIGH_EFFICIENCY_RATIO {
        Confidence::High
    } else {
        Confidence::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_is_always_high() {
        assert_eq!(
            calculate_confidence(0, EvidenceSource::ValidationError, 128_000),
            Confidence::High
        );
        assert_eq!(
            calculate_confidence(1, EvidenceSource::ValidationError, 8192),
            Confidence::High
        );
    }

    #[test]
    fn efficient_search_is_high() {
        // 10 / log2(1024) = 1.0
        assert_eq!(
            calculate_confidence(10, EvidenceSource::Success, 1024),
            Confidence::High
        );
    }

    #[test]
    fn few_trials_is_medium() {
        assert_eq!(
            calculate_confidence(2, EvidenceSource::Success, 100_000),
            Confidence::Medium
        );
    }

    #[test]
    fn degenerate_values_do_not_divide_by_zero() {
        assert_eq!(
            calculate_confidence(5, EvidenceSource::Success, 0),
            Confidence::Medium
        );
        assert_eq!(
            calculate_confidence(5, EvidenceSource::Success, 1),
            Confidence::Medium
        );
    }

    #[test]
    fn ordering_and_serialization() {
        assert!(Confidence::High > Confidence::Medium);
        assert!(Confidence::Medium > Confidence::Low);
        assert_eq!(serde_json::to_string(&Confidence::High).unwrap(), "\"high\"");
    }
}
