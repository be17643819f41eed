//! API interaction layer between the probes and the model endpoint.
//!
//! - [`transport`]: the [`ProbeTransport`] seam: one request in, one
//!   [`ProbeResponse`] out, no retries. [`OpenRouterClient`](crate::OpenRouterClient)
//!   implements it for OpenAI-compatible chat-completions endpoints.
//! - [`classify`]: sorts rejected requests into validation errors and other
//!   API errors.

pub mod classify;
pub mod transport;

pub use classify::{classify_failure, is_rate_limited, is_validation_failure};
pub use transport::{ProbeRequest, ProbeResponse, ProbeTransport, TransportFuture};
