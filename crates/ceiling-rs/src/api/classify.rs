//! Classification of rejected probe requests.
//!
//! A rejected request is either a validation error (the endpoint judged the
//! requested size invalid, which is exactly the signal a probe looks for) or
//! some other API error such as rate limiting or a provider outage. Both are
//! negative search signals; the distinction feeds the outcome's
//! [`EvidenceSource`] and the logs.

use crate::search::EvidenceSource;

/// HTTP statuses that mean "your request is invalid".
const VALIDATION_STATUSES: [u16; 3] = [400, 413, 422];

/// Body phrases that mark a size or parameter validation failure.
const VALIDATION_MARKERS: [&str; 12] = [
    "context length",
    "context window",
    "too long",
    "too large",
    "exceeds",
    "exceeded",
    "maximum",
    "max_tokens",
    "must be less than",
    "must be <=",
    "invalid",
    "validation",
];

/// Whether a rejection looks like provider-side throttling.
pub fn is_rate_limited(status: Option<u16>, text: &str) -> bool {
    if status == Some(429) {
        return true;
    }
    let lower = text.to_lowercase();
    ["rate limit", "rate-limit", "too many requests", "quota"]
        .iter()
        .any(|p| lower.contains(p))
}

/// Whether a rejection is the endpoint declaring the request invalid.
pub fn is_validation_failure(status: Option<u16>, text: &str) -> bool {
    if is_rate_limited(status, text) {
        return false;
    }
    if status.is_some_and(|s| VALIDATION_STATUSES.contains(&s)) {
        return true;
    }
    let lower = text.to_lowercase();
    VALIDATION_MARKERS.iter().any(|p| lower.contains(p))
}

/// Evidence source for a rejected request.
pub fn classify_failure(status: Option<u16>, text: &str) -> EvidenceSource {
    if is_validation_failure(status, text) {
        EvidenceSource::ValidationError
    } else if status.is_some() || !text.is_empty() {
        EvidenceSource::ApiError
    } else {
        EvidenceSource::Error
    }
}
