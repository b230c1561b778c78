//! `LLMClient` adapter for any OpenAI-compatible chat-completions endpoint
//! (Ollama's `/v1/chat/completions` shim, vLLM, OpenAI itself).

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use wayfarer_engine_ports::{
    LLMClient, ProviderCapabilities, ProviderError, ProviderRequest, ProviderResponse, Role,
    TokenUsage, ToolDescriptor,
};

use crate::http_support::{bail_if_cancelled, build_client, classify_error_response, map_transport_error, DEFAULT_REQUEST_TIMEOUT};

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct FunctionSpec {
    name: String,
    description: String,
}

#[derive(Debug, Serialize)]
struct ToolSpec {
    r#type: &'static str,
    function: FunctionSpec,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolSpec>>,
}

#[derive(Debug, Deserialize, Default)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

/// Client for any provider speaking the OpenAI chat-completions wire format.
pub struct OpenAiCompatibleClient {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_context: u32,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_timeout(base_url, model, api_key, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: build_client(timeout),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            max_context: 8192,
        }
    }

    pub fn with_max_context(mut self, max_context: u32) -> Self {
        self.max_context = max_context;
        self
    }
}

impl LLMClient for OpenAiCompatibleClient {
    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: false,
            function_calling: true,
            max_context: self.max_context,
        }
    }

    fn complete(
        &self,
        request: ProviderRequest,
        cancel: &CancellationToken,
    ) -> Result<ProviderResponse, ProviderError> {
        bail_if_cancelled(cancel)?;

        let body = ChatRequest {
            model: self.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| ChatMessage {
                    role: role_str(m.role),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: request.tools.map(|tools| {
                tools
                    .into_iter()
                    .map(|ToolDescriptor { name, description }| ToolSpec {
                        r#type: "function",
                        function: FunctionSpec { name, description },
                    })
                    .collect()
            }),
        };

        let started = Instant::now();
        let mut builder = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().map_err(map_transport_error)?;
        if !response.status().is_success() {
            return Err(classify_error_response(response));
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("no choices in response".to_string()))?;

        Ok(ProviderResponse {
            text: choice.message.content.unwrap_or_default(),
            usage: parsed.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
            latency_ms,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfarer_engine_ports::ProviderMessage;

    #[test]
    fn cancellation_short_circuits_before_any_request() {
        let client = OpenAiCompatibleClient::new("http://localhost:11434", "test-model", None);
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

    #[test]
    fn capabilities_report_function_calling() {
        let client = OpenAiCompatibleClient::new("http://localhost:11434", "test-model", None)
            .with_max_context(16384);
        let caps = client.capabilities();
        assert!(caps.function_calling);
        assert_eq!(caps.max_context, 16384);
    }
}
