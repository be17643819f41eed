//! The single capability the probes need from the HTTP layer.
//!
//! [`ProbeTransport::probe_once`] sends one chat-completion request and
//! reports what came back. Implementations must not retry, and must keep two
//! failure kinds apart:
//!
//! - the endpoint answered but refused or errored (HTTP 4xx/5xx, or an
//!   `error` object in a 200 body): `Ok(ProbeResponse { success: false, .. })`
//! - no answer at all (connect, DNS, timeout, body read):
//!   `Err(ProbeError::Transport)`, which aborts the search.

use crate::error::ProbeError;
use crate::{Message, UsageInfo};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`ProbeTransport::probe_once`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ProbeResponse, ProbeError>> + Send + 'a>>;

/// Parameters for one probe request.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ProbeRequest {
    /// A single user message with deterministic sampling.
    pub fn user(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            messages: vec![Message::user(prompt)],
            max_tokens,
            temperature: 0.0,
        }
    }

    /// Prepend a system message.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.messages.insert(0, Message::system(system));
        self
    }
}

/// What the endpoint returned for one probe request.
#[derive(Debug, Clone, Default)]
pub struct ProbeResponse {
    /// The endpoint produced a completion.
    pub success: bool,
    /// HTTP status (or the API error code when it is numeric).
    pub status: Option<u16>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
    pub content: Option<String>,
    /// Error message when `success` is false.
    pub error_text: String,
}

impl ProbeResponse {
    /// A completed exchange.
    pub fn completed(
        content: Option<String>,
        usage: Option<UsageInfo>,
        finish_reason: Option<String>,
    ) -> Self {
        Self {
            success: true,
            status: Some(200),
            usage,
            finish_reason,
            content,
            error_text: String::new(),
        }
    }

    /// A refused or failed exchange.
    pub fn rejected(status: Option<u16>, error_text: impl Into<String>) -> Self {
        Self {
            success: false,
            status,
            error_text: error_text.into(),
            ..Default::default()
        }
    }

    pub fn prompt_tokens(&self) -> Option<u32> {
        self.usage.as_ref().and_then(|u| u.prompt_tokens)
    }

    pub fn completion_tokens(&self) -> Option<u32> {
        self.usage.as_ref().and_then(|u| u.completion_tokens)
    }

    /// Whether the provider stopped generation at the output-token cap.
    pub fn hit_length_limit(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
    }
}

/// Sends probe requests to a model endpoint.
pub trait ProbeTransport: Send + Sync {
    fn probe_once<'a>(&'a self, model: &'a str, request: &'a ProbeRequest) -> TransportFuture<'a>;
}
