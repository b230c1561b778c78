//! `LLMClient` adapter for a local `llama.cpp` server's `/completion`
//! endpoint. Like `tgi`, the wire format takes a flattened prompt rather than
//! a chat `messages` array; `llama.cpp`'s own token accounting
//! (`tokens_evaluated`/`tokens_predicted`) maps onto `TokenUsage`.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use wayfarer_engine_ports::{
    LLMClient, ProviderCapabilities, ProviderError, ProviderRequest, ProviderResponse, Role,
    TokenUsage,
};

use crate::http_support::{bail_if_cancelled, build_client, classify_error_response, map_transport_error, DEFAULT_REQUEST_TIMEOUT};

fn flatten_prompt(request: &ProviderRequest) -> String {
    let mut prompt = String::new();
    for message in &request.messages {
        let label = match message.role {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        prompt.push_str(&format!("{label}: {}\n", message.content));
    }
    prompt.push_str("Assistant:");
    prompt
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    n_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: String,
    #[serde(default)]
    tokens_evaluated: u64,
    #[serde(default)]
    tokens_predicted: u64,
    stop: Option<bool>,
}

/// Client for a local `llama.cpp` server's `/completion`.
pub struct LlamaCppClient {
    client: reqwest::blocking::Client,
    base_url: String,
    max_context: u32,
}

impl LlamaCppClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_context: 4096,
        }
    }

    pub fn with_max_context(mut self, max_context: u32) -> Self {
        self.max_context = max_context;
        self
    }
}

impl LLMClient for LlamaCppClient {
    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: false,
            function_calling: false,
            max_context: self.max_context,
        }
    }

    fn complete(
        &self,
        request: ProviderRequest,
        cancel: &CancellationToken,
    ) -> Result<ProviderResponse, ProviderError> {
        bail_if_cancelled(cancel)?;

        let body = CompletionRequest {
            prompt: flatten_prompt(&request),
            n_predict: request.max_tokens,
            temperature: request.temperature,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/completion", self.base_url))
            .json(&body)
            .send()
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(classify_error_response(response));
        }

        let parsed: CompletionResponse = response
            .json()
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;
        let latency_ms = started.elapsed().as_millis() as u64;

        Ok(ProviderResponse {
            text: parsed.content,
            usage: Some(TokenUsage {
                prompt_tokens: parsed.tokens_evaluated,
                completion_tokens: parsed.tokens_predicted,
            }),
            latency_ms,
            finish_reason: if parsed.stop.unwrap_or(true) {
                "stop".to_string()
            } else {
                "length".to_string()
            },
        })
    }
}
