//! `LLMClient` adapter for a local text-generation-inference server's
//! `/generate` endpoint. Unlike the chat-completions adapters, TGI's
//! `/generate` takes a single flattened prompt string rather than a
//! `messages` array, so this adapter folds `ProviderRequest::messages` into
//! one prompt with role labels before sending.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use wayfarer_engine_ports::{
    LLMClient, ProviderCapabilities, ProviderError, ProviderRequest, ProviderResponse, Role,
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
struct GenerateParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_new_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    inputs: String,
    parameters: GenerateParameters,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    generated_text: String,
}

/// Client for a local text-generation-inference (TGI) server's `/generate`.
pub struct TgiClient {
    client: reqwest::blocking::Client,
    base_url: String,
    max_context: u32,
}

impl TgiClient {
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

impl LLMClient for TgiClient {
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

        let body = GenerateRequest {
            inputs: flatten_prompt(&request),
            parameters: GenerateParameters {
                max_new_tokens: request.max_tokens,
                temperature: request.temperature,
            },
        };

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/generate", self.base_url))
            .json(&body)
            .send()
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(classify_error_response(response));
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;
        let latency_ms = started.elapsed().as_millis() as u64;

        Ok(ProviderResponse {
            text: parsed.generated_text,
            usage: None,
            latency_ms,
            finish_reason: "stop".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfarer_engine_ports::ProviderMessage;

    #[test]
    fn flattens_messages_into_a_single_labelled_prompt() {
        let request = ProviderRequest {
            messages: vec![
                ProviderMessage::system("Be terse."),
                ProviderMessage::user("What's here?"),
            ],
            temperature: None,
            max_tokens: None,
            tools: None,
        };
        let prompt = flatten_prompt(&request);
        assert!(prompt.contains("System: Be terse."));
        assert!(prompt.contains("User: What's here?"));
        assert!(prompt.ends_with("Assistant:"));
    }

    #[test]
    fn cancellation_short_circuits_before_any_request() {
        let client = TgiClient::new("http://localhost:8081");
        let token = CancellationToken::new();
        token.cancel();
        let request = ProviderRequest {
            messages: vec![ProviderMessage::user("hi")],
            temperature: None,
            max_tokens: None,
            tools: None,
        };
        let err = client.complete(request, &token).unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled));
    }
}
