//! `SessionConfig` - the concrete struct enumerating §6's "Configuration
//! surface" field-for-field, loaded env-first with explicit defaults and no
//! implicit global state (Design Note §9). A driver may also build one
//! directly with struct-update syntax over `SessionConfig::default()`
//! instead of going through the environment.

use std::path::PathBuf;
use std::time::Duration;

use wayfarer_engine_app::{IsolationPolicy, SchemaMode};

/// Which wire format the configured co-narrator's `LLMClient` speaks,
/// selecting one of the adapters in `wayfarer-engine-adapters`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    OpenAiCompatible,
    AnthropicStyle,
    Tgi,
    LlamaCpp,
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai_compatible" | "openai" => Ok(ProviderKind::OpenAiCompatible),
            "anthropic_style" | "anthropic" => Ok(ProviderKind::AnthropicStyle),
            "tgi" => Ok(ProviderKind::Tgi),
            "llama_cpp" | "llamacpp" => Ok(ProviderKind::LlamaCpp),
            other => Err(format!("unknown provider_kind `{other}`")),
        }
    }
}

/// Optional configuration for the single reference co-narrator this
/// composition root wires up as a secondary contributor. A driver wanting
/// more than one LLM-backed secondary constructs additional `LlmContributor`s
/// directly and passes them to `Coordinator::new` itself; `SessionConfig`
/// covers the common one-co-narrator case §6 enumerates.
#[derive(Debug, Clone, PartialEq)]
pub struct ContributorConfig {
    pub contributor_id: String,
    pub provider_kind: ProviderKind,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model_id: String,
    pub system_prompt: String,
    pub temperature: Option<f32>,
    pub subscribes_to_player_input: bool,
}

/// Every knob named in §6's "Configuration surface" bullet list.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    // Scene loading.
    pub scene_path: PathBuf,
    pub start_scene: Option<String>,
    pub strict_schema: bool,

    // Memory.
    pub memory_capacity: usize,
    pub default_action_window: usize,
    pub default_observation_window: usize,

    // Coordinator / provider.
    pub turn_deadline: Option<Duration>,
    pub provider_request_timeout: Duration,
    pub retry_max_attempts: u32,
    pub retry_backoff_base: Duration,
    pub retry_backoff_cap: Duration,
    pub isolation_policy: IsolationPolicy,

    // Optional secondary co-narrator.
    pub contributor: Option<ContributorConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scene_path: PathBuf::from("scenes.json"),
            start_scene: None,
            strict_schema: true,
            memory_capacity: 200,
            default_action_window: 8,
            default_observation_window: 8,
            turn_deadline: None,
            provider_request_timeout: Duration::from_secs(60),
            retry_max_attempts: 3,
            retry_backoff_base: Duration::from_millis(500),
            retry_backoff_cap: Duration::from_secs(8),
            isolation_policy: IsolationPolicy::Quarantine,
            contributor: None,
        }
    }
}

impl SessionConfig {
    pub fn schema_mode(&self) -> SchemaMode {
        if self.strict_schema {
            SchemaMode::Strict
        } else {
            SchemaMode::Lenient
        }
    }

    /// Load from `WAYFARER_*` environment variables, falling back to
    /// `SessionConfig::default()` for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let contributor = std::env::var("WAYFARER_CONTRIBUTOR_BASE_URL")
            .ok()
            .map(|base_url| ContributorConfig {
                contributor_id: env_or("WAYFARER_CONTRIBUTOR_ID", "co-narrator".to_string()),
                provider_kind: std::env::var("WAYFARER_CONTRIBUTOR_PROVIDER_KIND")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_default(),
                base_url,
                api_key: std::env::var("WAYFARER_CONTRIBUTOR_API_KEY").ok(),
                model_id: env_or("WAYFARER_CONTRIBUTOR_MODEL_ID", "default-model".to_string()),
                system_prompt: env_or(
                    "WAYFARER_CONTRIBUTOR_SYSTEM_PROMPT",
                    "You are a narrative co-narrator adding brief, atmospheric color to a text adventure turn.".to_string(),
                ),
                temperature: std::env::var("WAYFARER_CONTRIBUTOR_TEMPERATURE")
                    .ok()
                    .and_then(|v| v.parse().ok()),
                subscribes_to_player_input: env_or(
                    "WAYFARER_CONTRIBUTOR_SUBSCRIBES_TO_PLAYER_INPUT",
                    true,
                ),
            });

        Self {
            scene_path: env_or(
                "WAYFARER_SCENE_PATH",
                defaults.scene_path.to_string_lossy().into_owned(),
            )
            .into(),
            start_scene: std::env::var("WAYFARER_START_SCENE").ok(),
            strict_schema: env_or("WAYFARER_STRICT_SCHEMA", defaults.strict_schema),
            memory_capacity: env_or("WAYFARER_MEMORY_CAPACITY", defaults.memory_capacity),
            default_action_window: env_or(
                "WAYFARER_DEFAULT_ACTION_WINDOW",
                defaults.default_action_window,
            ),
            default_observation_window: env_or(
                "WAYFARER_DEFAULT_OBSERVATION_WINDOW",
                defaults.default_observation_window,
            ),
            turn_deadline: std::env::var("WAYFARER_TURN_DEADLINE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis),
            provider_request_timeout: Duration::from_millis(env_or(
                "WAYFARER_PROVIDER_REQUEST_TIMEOUT_MS",
                defaults.provider_request_timeout.as_millis() as u64,
            )),
            retry_max_attempts: env_or("WAYFARER_RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts),
            retry_backoff_base: Duration::from_millis(env_or(
                "WAYFARER_RETRY_BACKOFF_BASE_MS",
                defaults.retry_backoff_base.as_millis() as u64,
            )),
            retry_backoff_cap: Duration::from_millis(env_or(
                "WAYFARER_RETRY_BACKOFF_CAP_MS",
                defaults.retry_backoff_cap.as_millis() as u64,
            )),
            isolation_policy: match std::env::var("WAYFARER_ISOLATION_POLICY").as_deref() {
                Ok("retry") => IsolationPolicy::Retry { max_attempts: 3 },
                _ => IsolationPolicy::Quarantine,
            },
            contributor,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_documented_values() {
        let config = SessionConfig::default();
        assert_eq!(config.default_action_window, 8);
        assert_eq!(config.default_observation_window, 8);
        assert_eq!(config.retry_max_attempts, 3);
        assert_eq!(config.retry_backoff_base, Duration::from_millis(500));
        assert_eq!(config.retry_backoff_cap, Duration::from_secs(8));
    }

    #[test]
    fn provider_kind_parses_known_aliases() {
        assert_eq!(
            "openai".parse::<ProviderKind>().unwrap(),
            ProviderKind::OpenAiCompatible
        );
        assert_eq!("tgi".parse::<ProviderKind>().unwrap(), ProviderKind::Tgi);
        assert!("bogus".parse::<ProviderKind>().is_err());
    }
}
