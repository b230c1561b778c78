//! The `LLMClient` capability set - the contract every provider adapter must
//! satisfy: a single blocking `complete` call (Design Note §9 - a driver
//! that wants concurrency drives multiple sessions, not pipelined providers
//! within one), plus the error classification (`is_retryable`/`is_fatal`)
//! retry logic above this layer depends on.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// A role in the provider conversation, per the §6 wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a `ProviderRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMessage {
    pub role: Role,
    pub content: String,
}

impl ProviderMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A tool the model may be offered, per §6's `tools?` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
}

/// `{messages, temperature?, max_tokens?, tools?}` - the request shape the
/// core depends on; adapters translate this to their provider's wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub messages: Vec<ProviderMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub tools: Option<Vec<ToolDescriptor>>,
}

/// Token accounting, when the provider reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// `{text, usage?, latency_ms, finish_reason}` - the response shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub text: String,
    pub usage: Option<TokenUsage>,
    pub latency_ms: u64,
    pub finish_reason: String,
}

/// `{streaming, function_calling, max_context}` - what a provider supports,
/// used by the LLM Contributor to decide whether to trim its memory slice
/// before prompting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub streaming: bool,
    pub function_calling: bool,
    pub max_context: u32,
}

/// The error taxonomy every provider adapter must classify its failures
/// into, per §4.3.
#[non_exhaustive]
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    /// Provider rate-limited the request. Retry with backoff.
    #[error("rate limited")]
    RateLimited,

    /// Transient failure (5xx, timeout, connection reset). Retry with
    /// backoff.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// Malformed request; retrying with the same input can't help.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication/authorization failed. Fatal for this contributor.
    #[error("auth error: {0}")]
    AuthError(String),

    /// The provider's response text didn't parse as the expected schema.
    /// Bounded retry with a clarifying prompt appendix.
    #[error("parse error: {0}")]
    ParseError(String),

    /// The caller's cancellation token fired mid-request.
    #[error("cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Whether the bounded-retry policy applies to this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited | ProviderError::Transient(_) | ProviderError::ParseError(_)
        )
    }

    /// Whether this error is fatal to the contributor (no retry, ever).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProviderError::InvalidRequest(_) | ProviderError::AuthError(_)
        )
    }
}

/// The capability set every provider adapter implements. `complete` is a
/// single blocking call: the core has no opinion on how an adapter achieves
/// it (a blocking `reqwest` client, or a `tokio::task::block_in_place` around
/// an async client); callers honour `cancel` by aborting the in-flight
/// request, not by polling it after the fact.
#[cfg_attr(feature = "testing", mockall::automock)]
pub trait LLMClient: Send + Sync {
    fn capabilities(&self) -> ProviderCapabilities;

    fn complete(
        &self,
        request: ProviderRequest,
        cancel: &CancellationToken,
    ) -> Result<ProviderResponse, ProviderError>;
}
