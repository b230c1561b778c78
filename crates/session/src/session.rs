//! The `Session` composition root: wires the Scene Repository, Scripted
//! Scene Machine, optional LLM co-narrator, and Multi-Agent Coordinator
//! together behind the Driver -> Core surface §6 names -
//! `new_session`/`advance`/`snapshot`/`restore`.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use wayfarer_domain::{ContributorId, SceneId, StoryEvent, WorldState};
use wayfarer_engine_adapters::{AnthropicStyleClient, LlamaCppClient, OpenAiCompatibleClient, TgiClient};
use wayfarer_engine_app::{
    Coordinator, LlmContributor, RetryPolicy, SceneRepository, ScriptedSceneMachine,
    SessionSnapshot, ToolRegistry,
};
use wayfarer_engine_ports::{Contributor, LLMClient};

use crate::config::{ContributorConfig, ProviderKind, SessionConfig};
use crate::error::SessionError;

const PRIMARY_ID: &str = "scripted-engine";

fn build_llm_client(contributor: &ContributorConfig) -> Box<dyn LLMClient> {
    match contributor.provider_kind {
        ProviderKind::OpenAiCompatible => Box::new(OpenAiCompatibleClient::new(
            contributor.base_url.clone(),
            contributor.model_id.clone(),
            contributor.api_key.clone(),
        )),
        ProviderKind::AnthropicStyle => Box::new(AnthropicStyleClient::new(
            contributor.base_url.clone(),
            contributor.model_id.clone(),
            contributor.api_key.clone().unwrap_or_default(),
        )),
        ProviderKind::Tgi => Box::new(TgiClient::new(contributor.base_url.clone())),
        ProviderKind::LlamaCpp => Box::new(LlamaCppClient::new(contributor.base_url.clone())),
    }
}

fn build_roster(
    config: &SessionConfig,
    repository: Arc<SceneRepository>,
) -> Result<Vec<Box<dyn Contributor>>, SessionError> {
    let primary_id = ContributorId::new(PRIMARY_ID)
        .map_err(|e| SessionError::InvalidContributorId(PRIMARY_ID.to_string(), e))?;
    let primary = ScriptedSceneMachine::new(primary_id, repository.clone(), ToolRegistry::new());

    let mut roster: Vec<Box<dyn Contributor>> = vec![Box::new(primary)];

    if let Some(contributor) = &config.contributor {
        let id = ContributorId::new(contributor.contributor_id.clone())
            .map_err(|e| SessionError::InvalidContributorId(contributor.contributor_id.clone(), e))?;
        let client = build_llm_client(contributor);
        let retry_policy = RetryPolicy {
            max_attempts: config.retry_max_attempts,
            backoff_base: config.retry_backoff_base,
            backoff_cap: config.retry_backoff_cap,
        };
        let mut secondary = LlmContributor::new(
            id,
            client,
            repository,
            contributor.system_prompt.clone(),
            contributor.model_id.clone(),
        )
        .with_retry_policy(retry_policy)
        .with_subscribes_to_player_input(contributor.subscribes_to_player_input);
        if let Some(temperature) = contributor.temperature {
            secondary = secondary.with_temperature(temperature);
        }
        roster.push(Box::new(secondary));
    }

    Ok(roster)
}

fn resolve_start_scene(
    config: &SessionConfig,
    repository: &SceneRepository,
) -> Result<SceneId, SessionError> {
    if let Some(raw) = &config.start_scene {
        let id = SceneId::new(raw.clone())
            .map_err(|_| SessionError::UnknownStartScene(raw.clone()))?;
        if !repository.contains(&id) {
            return Err(SessionError::UnknownStartScene(raw.clone()));
        }
        return Ok(id);
    }
    repository.start_scene().cloned().ok_or(SessionError::NoStartScene)
}

/// A live, advanceable narrative session: one `WorldState`, one
/// `Coordinator`, and the `SceneRepository` both were built against.
pub struct Session {
    world: WorldState,
    coordinator: Coordinator,
    repository: Arc<SceneRepository>,
    cancel: CancellationToken,
    config: SessionConfig,
}

impl Session {
    /// Load the scene graph named by `config.scene_path`, resolve a start
    /// scene, and build the primary plus optional co-narrator roster.
    pub fn new_session(actor: impl Into<String>, config: SessionConfig) -> Result<Self, SessionError> {
        let repository = Arc::new(SceneRepository::load(&config.scene_path, config.schema_mode())?);
        let start_scene = resolve_start_scene(&config, &repository)?;
        let roster = build_roster(&config, repository.clone())?;
        let coordinator = Coordinator::new(roster, config.isolation_policy)?;
        let world = WorldState::new(actor, start_scene, config.memory_capacity);

        Ok(Self {
            world,
            coordinator,
            repository,
            cancel: CancellationToken::new(),
            config,
        })
    }

    /// A clone of this session's cancellation handle. The driver cancels it
    /// to stop any further provider requests from starting; an adapter
    /// already mid-flight still runs to completion (Design Note §9 - a
    /// blocking `reqwest` call has no cancellation hook).
    pub fn cancellation_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn roster(&self) -> Vec<wayfarer_engine_app::RosterEntry> {
        self.coordinator.roster()
    }

    pub fn turn(&self) -> u64 {
        self.coordinator.turn()
    }

    /// Run one turn of player input through the coordinator. `save`, `load`,
    /// `status`, `help`, `tutorial`, and `quit` all come back as ordinary
    /// `StoryEvent`s with a `"builtin"` metadata key (§4.2); this composition
    /// root does not interpret them itself - a driver inspects the metadata
    /// and calls `snapshot`/`restore` (for `save`/`load`) on its own schedule.
    pub async fn advance(&mut self, input: &str) -> Result<StoryEvent, SessionError> {
        let deadline = self.config.turn_deadline.map(|d| Instant::now() + d);
        self.coordinator
            .advance(&mut self.world, input, &self.cancel, deadline)
            .await
            .map_err(SessionError::from)
    }

    pub fn snapshot(&self) -> Result<Vec<u8>, SessionError> {
        let snapshot = SessionSnapshot::capture(&self.world, &self.coordinator, Utc::now());
        Ok(snapshot.to_bytes()?)
    }

    /// Rebuild a `Session` from previously-captured `bytes`, using `config`
    /// to reload the same scene graph and roster shape the snapshot expects.
    /// Rejects a snapshot whose captured location the freshly loaded
    /// repository no longer has.
    pub fn restore(bytes: &[u8], config: SessionConfig) -> Result<Self, SessionError> {
        let snapshot = SessionSnapshot::from_bytes(bytes)?;
        let repository = Arc::new(SceneRepository::load(&config.scene_path, config.schema_mode())?);
        let world = snapshot.restore_world(&repository)?;

        let roster = build_roster(&config, repository.clone())?;
        let mut coordinator = Coordinator::new(roster, config.isolation_policy)?;
        snapshot.restore_coordinator(&mut coordinator);

        Ok(Self {
            world,
            coordinator,
            repository,
            cancel: CancellationToken::new(),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_scene_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "schema_version": 2,
                "start_scene": "hall",
                "scenes": {{
                    "hall": {{
                        "description": "A dusty hall.",
                        "choices": [{{"command": "take", "description": "Take the rusty key"}}],
                        "transitions": {{"take": {{"narration": "You take the key.", "item": "rusty-key"}}}}
                    }}
                }}
            }}"#
        )
        .unwrap();
        file
    }

    fn config_for(file: &tempfile::NamedTempFile) -> SessionConfig {
        SessionConfig {
            scene_path: file.path().to_path_buf(),
            ..SessionConfig::default()
        }
    }

    #[tokio::test]
    async fn new_session_advances_and_mutates_world() {
        let file = write_scene_file();
        let mut session = Session::new_session("player-1", config_for(&file)).unwrap();

        let event = session.advance("take").await.unwrap();
        assert_eq!(event.narration, "You take the key.");
        assert!(session.world().has_item(&wayfarer_domain::ItemId::new("rusty-key").unwrap()));
        assert_eq!(session.turn(), 1);
    }

    #[tokio::test]
    async fn snapshot_and_restore_round_trip_preserves_world() {
        let file = write_scene_file();
        let mut session = Session::new_session("player-1", config_for(&file)).unwrap();
        session.advance("take").await.unwrap();

        let bytes = session.snapshot().unwrap();
        let restored = Session::restore(&bytes, config_for(&file)).unwrap();

        assert_eq!(restored.turn(), session.turn());
        assert_eq!(
            restored.world().inventory(),
            session.world().inventory()
        );
        assert_eq!(restored.world().location(), session.world().location());
    }

    #[test]
    fn missing_start_scene_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"hall": {{"description": "A hall.", "choices": [], "transitions": {{}}}}}}"#
        )
        .unwrap();
        let config = SessionConfig {
            scene_path: file.path().to_path_buf(),
            start_scene: None,
            ..SessionConfig::default()
        };
        let err = Session::new_session("player-1", config).unwrap_err();
        assert!(matches!(err, SessionError::NoStartScene));
    }

    #[test]
    fn explicit_unknown_start_scene_is_reported() {
        let file = write_scene_file();
        let config = SessionConfig {
            scene_path: file.path().to_path_buf(),
            start_scene: Some("nowhere".to_string()),
            ..SessionConfig::default()
        };
        let err = Session::new_session("player-1", config).unwrap_err();
        assert!(matches!(err, SessionError::UnknownStartScene(_)));
    }
}
