//! Black-box limit discovery for LLM chat-completion endpoints.
//!
//! `ceiling-rs` measures two numbers providers rarely publish accurately: the
//! largest prompt an endpoint accepts (context window) and the largest
//! completion it will actually produce (max output tokens). The endpoint is
//! treated as an expensive, rate-limited oracle that answers "accepted" or
//! "rejected"; the crate converges on a bounded, confidence-rated estimate in
//! as few calls as it can.
//!
//! # Getting started
//!
//! ```ignore
//! use ceiling_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ProbeError> {
//!     let api_key = std::env::var("OPENROUTER_KEY").unwrap();
//!     let client = OpenRouterClient::new(api_key)?;
//!
//!     let probe = ContextWindowProbe::new(&client, ProbeConfig::default())
//!         .with_event_handler(&LoggingHandler);
//!     let result = probe.probe("openai/gpt-4o-mini").await?;
//!     println!("{result}");
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Run a probe:** [`ContextWindowProbe`](probe::ContextWindowProbe) (plain
//!   and needle-in-a-haystack variants) and
//!   [`MaxOutputTokensProbe`](probe::MaxOutputTokensProbe).
//! - **Search any monotone threshold:** implement
//!   [`ProbeOracle`](search::ProbeOracle) and drive a
//!   [`BoundarySearcher`](search::BoundarySearcher).
//! - **Talk to a different endpoint:** implement
//!   [`ProbeTransport`](api::ProbeTransport), or point
//!   [`OpenRouterClient::with_endpoint`] at any OpenAI-compatible URL.
//! - **Observe a run:** implement [`EventHandler`](events::EventHandler), or
//!   combine [`LoggingHandler`](events::LoggingHandler) and
//!   [`TrialLogHandler`](trial_log::TrialLogHandler) with
//!   [`CompositeEventHandler`](events::CompositeEventHandler).
//! - **Teach it a new vendor error format:** add a pattern to an
//!   [`ErrorPatternSet`](search::ErrorPatternSet) or load one from JSON.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`search`] | Boundary search, oracle trait, error-text extraction, confidence |
//! | [`probe`] | Context-window and max-output orchestrators and their results |
//! | [`data`] | Sized filler text, needle documents, comprehension checks |
//! | [`api`] | Transport seam and rejection classification |
//! | [`events`] | Search events and handlers |
//! | [`trial_log`] | Append-only JSONL record of every trial |
//! | [`config`] | [`ProbeConfig`](config::ProbeConfig) |

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod prelude;
pub mod probe;
pub mod search;
pub mod trial_log;

use api::{ProbeRequest, ProbeResponse, ProbeTransport, TransportFuture};
use error::ProbeError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Per-request timeout. Large prompts take a while to prefill.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Unused optional fields are omitted from
/// serialization.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderPreferences>,
}

/// Provider routing preferences.
#[derive(Serialize, Debug, Clone, Default)]
pub struct ProviderPreferences {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_fallbacks: Option<bool>,
}

impl ProviderPreferences {
    /// Pin requests to one provider. Fallbacks would blur the measurement.
    pub fn pinned(provider: impl Into<String>) -> Self {
        Self {
            order: Some(vec![provider.into()]),
            allow_fallbacks: Some(false),
        }
    }
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(content.into()),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: Option<RawResponseMessage>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

/// Error body wrapper returned with non-2xx statuses.
#[derive(Deserialize, Debug)]
struct RawErrorBody {
    error: ApiErrorResponse,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    metadata: Option<ApiErrorMetadata>,
}

/// Upstream provider detail. OpenRouter passes the provider's own error
/// text through in `raw`, which is often the only place a limit is stated.
#[derive(Deserialize, Debug)]
struct ApiErrorMetadata {
    #[serde(default)]
    raw: Option<serde_json::Value>,
    #[serde(default)]
    provider_name: Option<String>,
}

impl ApiErrorResponse {
    /// Numeric error code, when the API sent one.
    fn status(&self) -> Option<u16> {
        self.code
            .as_ref()
            .and_then(|c| c.as_u64())
            .and_then(|c| u16::try_from(c).ok())
    }

    /// The message with any upstream provider text appended.
    fn describe(&self) -> String {
        let mut text = self.message.clone();
        if let Some(meta) = &self.metadata {
            if let Some(raw) = &meta.raw {
                let raw = match raw {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                if !raw.is_empty() && raw != self.message {
                    text.push_str(" | ");
                    text.push_str(&raw);
                }
            }
            if let Some(provider) = &meta.provider_name {
                text.push_str(&format!(" (provider: {provider})"));
            }
        }
        text
    }
}

/// Token usage statistics.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Turn one HTTP exchange into a [`ProbeResponse`].
///
/// Every answer from the endpoint ends up here, including error statuses
/// and unparseable bodies; none of them are transport failures.
fn interpret_response(status: u16, text: &str) -> ProbeResponse {
    if !(200..300).contains(&status) {
        let detail = match serde_json::from_str::<RawErrorBody>(text) {
            Ok(body) => body.error.describe(),
            Err(_) => text.trim().to_string(),
        };
        return ProbeResponse::rejected(Some(status), format!("HTTP {status}: {detail}"));
    }

    let parsed: RawChatResponse = match serde_json::from_str(text) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("unparseable response body ({} bytes): {e}", text.len());
            return ProbeResponse::rejected(Some(status), format!("failed to parse response: {e}"));
        }
    };

    if let Some(err) = parsed.error {
        let code = err.status().or(Some(status));
        return ProbeResponse::rejected(code, err.describe());
    }

    if let Some(ref usage) = parsed.usage {
        debug!(
            "Token usage: prompt={}, completion={}, total={}",
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
            usage.total_tokens.unwrap_or(0),
        );
    }

    let choice = parsed.choices.and_then(|c| c.into_iter().next());
    let (content, finish_reason) = match choice {
        Some(c) => (c.message.and_then(|m| m.content), c.finish_reason),
        None => {
            debug!("LLM output: empty (no choices)");
            (None, None)
        }
    };
    ProbeResponse::completed(content, parsed.usage, finish_reason)
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for OpenRouter or any OpenAI-compatible
/// chat-completions endpoint.
pub struct OpenRouterClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) referer: String,
    pub(crate) title: String,
    endpoint: String,
    provider: Option<ProviderPreferences>,
}

impl OpenRouterClient {
    /// Create a new client with the given API key and default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProbeError> {
        Self::with_headers(api_key, "https://github.com/ceiling-rs", "ceiling-rs")
    }

    /// Create a new client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, ProbeError> {
        let client = build_http_client(DEFAULT_TIMEOUT)?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            referer: referer.into(),
            title: title.into(),
            endpoint: OPENROUTER_URL.to_string(),
            provider: None,
        })
    }

    /// Send requests to a different chat-completions URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Replace the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ProbeError> {
        self.client = build_http_client(timeout)?;
        Ok(self)
    }

    /// Attach provider routing preferences to every request.
    pub fn with_provider(mut self, provider: ProviderPreferences) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one probe request. No retries.
    async fn send(&self, model: &str, request: &ProbeRequest) -> Result<ProbeResponse, ProbeError> {
        let body = ChatRequest {
            model: model.to_string(),
            messages: request.messages.clone(),
            max_tokens: request.max_tokens,
            temperature: Some(request.temperature),
            provider: self.provider.clone(),
        };
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={}",
            model,
            body.messages.len(),
            body.max_tokens,
            request.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(&body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProbeError::Transport(format!("request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProbeError::Transport(format!("failed to read response: {e}")))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        Ok(interpret_response(status.as_u16(), &text))
    }
}

impl ProbeTransport for OpenRouterClient {
    fn probe_once<'a>(&'a self, model: &'a str, request: &'a ProbeRequest) -> TransportFuture<'a> {
        Box::pin(self.send(model, request))
    }
}

fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ProbeError> {
    reqwest::Client::builder()
        .user_agent("ceiling-rs/0.1")
        .timeout(timeout)
        .build()
        .map_err(|e| ProbeError::Config(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let sys = Message::system("hello");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content.as_deref(), Some("hello"));

        let user = Message::user("world");
        assert_eq!(user.role, MessageRole::User);
        assert_eq!(user.role.to_string(), "user");
    }

    #[test]
    fn chat_request_skips_none_fields() {
        let req = ChatRequest {
            model: "test-model".into(),
            messages: vec![Message::user("hi")],
            max_tokens: 16,
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["max_tokens"], 16);
        assert!(json.get("temperature").is_none());
        assert!(json.get("provider").is_none());

        let req = ChatRequest {
            provider: Some(ProviderPreferences::pinned("Together")),
            ..req
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["provider"]["order"][0], "Together");
        assert_eq!(json["provider"]["allow_fallbacks"], false);
    }

    #[test]
    fn completed_response_is_parsed() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "OK"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 4100, "completion_tokens": 1, "total_tokens": 4101}
        }"#;
        let resp = interpret_response(200, body);
        assert!(resp.success);
        assert_eq!(resp.content.as_deref(), Some("OK"));
        assert_eq!(resp.prompt_tokens(), Some(4100));
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn missing_usage_still_completes() {
        let body = r#"{"choices": [{"message": {"content": "OK"}, "finish_reason": "stop"}]}"#;
        let resp = interpret_response(200, body);
        assert!(resp.success);
        assert!(resp.usage.is_none());
    }

    #[test]
    fn http_error_keeps_upstream_text() {
        let body = r#"{"error": {"message": "Provider returned error", "code": 400,
            "metadata": {"raw": "This model's maximum context length is 8192 tokens.", "provider_name": "OpenAI"}}}"#;
        let resp = interpret_response(400, body);
        assert!(!resp.success);
        assert_eq!(resp.status, Some(400));
        assert!(resp.error_text.contains("maximum context length is 8192 tokens"));
        assert!(resp.error_text.contains("OpenAI"));
    }

    #[test]
    fn error_in_ok_body_is_rejected() {
        let body = r#"{"error": {"message": "Rate limit exceeded", "code": 429}}"#;
        let resp = interpret_response(200, body);
        assert!(!resp.success);
        assert_eq!(resp.status, Some(429));
        assert_eq!(resp.error_text, "Rate limit exceeded");
    }

    #[test]
    fn non_json_bodies_are_rejections() {
        let resp = interpret_response(502, "<html>Bad Gateway</html>");
        assert!(!resp.success);
        assert!(resp.error_text.contains("Bad Gateway"));

        let resp = interpret_response(200, "not json");
        assert!(!resp.success);
        assert!(resp.error_text.starts_with("failed to parse response"));
    }
}
