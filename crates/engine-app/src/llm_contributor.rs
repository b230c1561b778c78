//! The LLM Contributor (C5): turns `WorldState` into a provider prompt,
//! parses the provider's structured JSON reply into a `StoryEvent`, and
//! presents itself to the coordinator through the same `Contributor`
//! protocol as the Scripted Scene Machine - as a secondary, since nothing in
//! this system defines how a model-backed contributor would perform the
//! scripted engine's atomic WorldState transition. A driver wanting an
//! LLM-only adventure still needs a primary; this type doesn't claim to be
//! one (`dispatch_primary` keeps the `Contributor` trait's default
//! `NotCapable`).

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use wayfarer_domain::{
    AgentTrigger, Choice, ContributorId, MemoryRequest, StoryEvent, TriggerKind, WorldState,
};
use wayfarer_engine_ports::{
    Contributor, ContributorCapabilities, ContributorError, ContributorOutcome, LLMClient,
    ProviderError, ProviderMessage, ProviderRequest,
};

use crate::scene_repository::SceneRepository;

/// Exponential backoff with full jitter for provider retries, with the
/// base/cap figures from §4.3 (0.5s base, 8s cap).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Full-jitter delay for the given (1-indexed) attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponential = self
            .backoff_base
            .as_millis()
            .saturating_mul(1u128 << attempt.min(16));
        let capped = exponential.min(self.backoff_cap.as_millis());
        let jittered = rand::thread_rng().gen_range(0..=capped.max(1)) as u64;
        Duration::from_millis(jittered)
    }
}

#[derive(Debug, Deserialize)]
struct RawChoice {
    command: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawReply {
    narration: Option<String>,
    #[serde(default)]
    choices: Vec<RawChoice>,
}

fn validate_reply(text: &str) -> Result<(String, Vec<Choice>), String> {
    let raw: RawReply =
        serde_json::from_str(text).map_err(|e| format!("reply is not valid JSON: {e}"))?;
    let narration = raw
        .narration
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| "reply is missing a non-empty \"narration\"".to_string())?;

    let mut seen = BTreeSet::new();
    let mut choices = Vec::new();
    for (index, choice) in raw.choices.into_iter().enumerate() {
        let command = choice
            .command
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| format!("choice at index {index} is missing a non-empty \"command\""))?
            .to_lowercase();
        let description = choice.description.filter(|d| !d.trim().is_empty()).ok_or_else(|| {
            format!("choice at index {index} is missing a non-empty \"description\"")
        })?;
        if seen.insert(command.clone()) {
            choices.push(Choice { command, description });
        }
    }
    Ok((narration, choices))
}

/// An LLM-backed secondary: assembles a deterministic prompt from
/// `WorldState`, drives `LLMClient::complete` through retry/backoff, and
/// validates the structured reply.
pub struct LlmContributor {
    id: ContributorId,
    client: Arc<dyn LLMClient>,
    repository: Arc<SceneRepository>,
    system_prompt: String,
    model_id: String,
    temperature: Option<f32>,
    retry_policy: RetryPolicy,
    parse_retry_max: u32,
    memory_request: MemoryRequest,
    subscribes_to_player_input: bool,
}

impl LlmContributor {
    pub fn new(
        id: ContributorId,
        client: Box<dyn LLMClient>,
        repository: Arc<SceneRepository>,
        system_prompt: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            id,
            client: Arc::from(client),
            repository,
            system_prompt: system_prompt.into(),
            model_id: model_id.into(),
            temperature: None,
            retry_policy: RetryPolicy::default(),
            parse_retry_max: 2,
            memory_request: MemoryRequest::default_window(),
            subscribes_to_player_input: true,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// §6's per-contributor `subscribes_to_player_input` knob: whether this
    /// contributor receives the broadcast `PlayerInput` trigger every turn
    /// in addition to any targeted messages queued for it.
    pub fn with_subscribes_to_player_input(mut self, subscribes: bool) -> Self {
        self.subscribes_to_player_input = subscribes;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_memory_request(mut self, request: MemoryRequest) -> Self {
        self.memory_request = request;
        self
    }

    pub fn replace_repository(&mut self, repository: Arc<SceneRepository>) {
        self.repository = repository;
    }

    /// Trims the configured memory window down when the provider's context
    /// budget is small (§4.3 capability negotiation).
    fn effective_memory_request(&self) -> MemoryRequest {
        let capabilities = self.client.capabilities();
        if capabilities.max_context >= 4096 {
            return self.memory_request.clone();
        }
        MemoryRequest {
            action_limit: (self.memory_request.action_limit / 2).max(1),
            observation_limit: (self.memory_request.observation_limit / 2).max(1),
            tag_filter: self.memory_request.tag_filter.clone(),
        }
    }

    fn system_message(&self) -> ProviderMessage {
        ProviderMessage::system(format!(
            "{}\n\nRespond with exactly one JSON object of the shape \
             {{\"narration\": string, \"choices\": [{{\"command\": string, \"description\": string}}], \"metadata\": object?}} \
             and nothing else - no prose before or after the object.",
            self.system_prompt
        ))
    }

    fn context_message(&self, world: &WorldState) -> Result<ProviderMessage, ContributorError> {
        let scene = self
            .repository
            .get(world.location())
            .ok_or_else(|| ContributorError::Failed(format!("unknown scene `{}`", world.location())))?;

        let choices: Vec<String> = scene
            .choices
            .iter()
            .map(|c| format!("- {} ({})", c.command, c.description))
            .collect();
        let inventory: Vec<String> = world.inventory().iter().map(|i| i.to_string()).collect();
        let history = world.history();
        let slice = world.memory().query(&self.effective_memory_request());

        let mut section = String::new();
        section.push_str(&format!("Current scene: {}\n", scene.description));
        section.push_str("Choices:\n");
        section.push_str(&choices.join("\n"));
        section.push_str(&format!("\nInventory: {}\n", inventory.join(", ")));
        section.push_str(&format!("Recent history: {}\n", history.join("; ")));
        section.push_str("Recent actions:\n");
        for entry in &slice.actions {
            section.push_str(&format!("- {}\n", entry.content));
        }
        section.push_str("Recent observations:\n");
        for entry in &slice.observations {
            section.push_str(&format!("- {}\n", entry.content));
        }
        Ok(ProviderMessage::user(section))
    }

    fn trigger_message(&self, triggers: &[AgentTrigger]) -> ProviderMessage {
        let mut section = String::from("Triggers this turn:\n");
        for trigger in triggers {
            match trigger.kind {
                TriggerKind::PlayerInput => {
                    section.push_str(&format!(
                        "- player input: {}\n",
                        trigger.payload.as_deref().unwrap_or("")
                    ));
                }
                TriggerKind::AgentMessage => {
                    section.push_str(&format!(
                        "- message from {}: {}\n",
                        trigger
                            .source_agent
                            .as_ref()
                            .map(|id| id.to_string())
                            .unwrap_or_else(|| "unknown".to_string()),
                        trigger.payload.as_deref().unwrap_or("")
                    ));
                }
                TriggerKind::System => {
                    section.push_str(&format!(
                        "- system event: {}\n",
                        trigger.payload.as_deref().unwrap_or("")
                    ));
                }
            }
        }
        ProviderMessage::user(section)
    }

    async fn respond(
        &mut self,
        world: &WorldState,
        triggers: &[AgentTrigger],
        cancel: &CancellationToken,
    ) -> Result<StoryEvent, ContributorError> {
        let mut messages = vec![
            self.system_message(),
            self.context_message(world)?,
            self.trigger_message(triggers),
        ];

        let mut provider_attempt = 0u32;
        let mut parse_attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(ContributorError::Provider(ProviderError::Cancelled));
            }

            let request = ProviderRequest {
                messages: messages.clone(),
                temperature: self.temperature,
                max_tokens: None,
                tools: None,
            };

            // The provider call is a blocking `reqwest` request (Design Note
            // §9); running it on the blocking thread pool instead of inline
            // gives the turn deadline's `tokio::time::timeout` an actual
            // yield point to observe, instead of a poll that never returns
            // control to the runtime until the whole request finishes.
            let client = Arc::clone(&self.client);
            let call_cancel = cancel.clone();
            let outcome = tokio::task::spawn_blocking(move || client.complete(request, &call_cancel))
                .await
                .map_err(|join_err| {
                    ContributorError::Failed(format!("provider call task panicked: {join_err}"))
                })?;

            match outcome {
                Ok(response) => match validate_reply(&response.text) {
                    Ok((narration, choices)) => {
                        let mut event = StoryEvent::new(narration, choices)
                            .with_metadata("latency_ms", response.latency_ms)
                            .with_metadata("model_id", self.model_id.clone())
                            .with_metadata("contributor_id", self.id.to_string());
                        if let Some(usage) = response.usage {
                            event = event
                                .with_metadata("prompt_tokens", usage.prompt_tokens)
                                .with_metadata("completion_tokens", usage.completion_tokens);
                        }
                        return Ok(event);
                    }
                    Err(message) => {
                        parse_attempt += 1;
                        if parse_attempt > self.parse_retry_max {
                            return Err(ContributorError::Provider(ProviderError::ParseError(
                                message,
                            )));
                        }
                        messages.push(ProviderMessage::user(format!(
                            "Your previous reply could not be parsed: {message}. \
                             Respond again with ONLY the JSON object described above."
                        )));
                        continue;
                    }
                },
                Err(err) => {
                    if err.is_retryable() {
                        provider_attempt += 1;
                        if provider_attempt > self.retry_policy.max_attempts {
                            return Err(ContributorError::Provider(err));
                        }
                        tokio::select! {
                            _ = tokio::time::sleep(self.retry_policy.delay_for_attempt(provider_attempt)) => {}
                            _ = cancel.cancelled() => {
                                return Err(ContributorError::Provider(ProviderError::Cancelled));
                            }
                        }
                        continue;
                    }
                    return Err(ContributorError::Provider(err));
                }
            }
        }
    }
}

#[async_trait]
impl Contributor for LlmContributor {
    fn id(&self) -> &ContributorId {
        &self.id
    }

    fn capabilities(&self) -> ContributorCapabilities {
        ContributorCapabilities {
            subscribes_to_player_input: self.subscribes_to_player_input,
        }
    }

    async fn dispatch_secondary(
        &mut self,
        world: &WorldState,
        triggers: &[AgentTrigger],
        cancel: &CancellationToken,
    ) -> Result<ContributorOutcome, ContributorError> {
        if triggers.is_empty() {
            return Ok(ContributorOutcome::silent());
        }
        let event = self.respond(world, triggers, cancel).await?;
        Ok(ContributorOutcome::event_only(event))
    }
}
