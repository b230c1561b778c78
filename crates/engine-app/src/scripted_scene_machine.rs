//! The Scripted Scene Machine (C4): the deterministic, data-driven
//! contributor that resolves a command against a `SceneRepository`, mutates
//! `WorldState`, and emits a `StoryEvent`. This is always the coordinator's
//! primary contributor in the reference wiring (`wayfarer-session`).
//!
//! This type never touches `WorldState::memory`: the per-turn action and
//! observation mirror (§4.4 steps 1 and 8) is the Multi-Agent Coordinator's
//! responsibility, appended once before primary dispatch and once after the
//! turn's events are merged. Keeping the mirror at that single layer is what
//! makes "exactly once per turn" (§8 property 2) hold without the scene
//! machine and the coordinator each appending their own copy.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use wayfarer_domain::{
    AgentTrigger, Choice, ContributorId, MemoryRequest, Scene, SceneId, StoryEvent, Transition,
    WorldState,
};
use wayfarer_engine_ports::{Contributor, ContributorError};

use crate::scene_repository::{is_builtin_command, SceneRepository};
use crate::tool_registry::ToolRegistry;

/// Fatal failures the Scripted Scene Machine can raise. Everything else
/// (unknown commands, gated transitions) is handled inside `propose_event`
/// as an ordinary `StoryEvent`, never as an error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoryEngineError {
    /// `WorldState::location` names a scene the active repository doesn't
    /// have. Fatal to the session (§7) - the caller must restore from a
    /// snapshot or start anew.
    #[error("world state points at unknown scene `{0}`")]
    CorruptWorldState(SceneId),
}

fn default_failure_narration(transition: &Transition, world: &WorldState) -> String {
    let missing: Vec<String> = transition
        .requires
        .iter()
        .filter(|item| !world.has_item(item))
        .map(|item| item.to_string())
        .collect();
    if missing.is_empty() {
        "You can't do that yet.".to_string()
    } else {
        format!("You need {} first.", missing.join(", "))
    }
}

/// `propose_event(world, trigger) -> StoryEvent`, and the `Contributor`
/// adapter that lets the coordinator drive it as the primary.
pub struct ScriptedSceneMachine {
    id: ContributorId,
    repository: Arc<SceneRepository>,
    tools: ToolRegistry,
}

impl ScriptedSceneMachine {
    pub fn new(id: ContributorId, repository: Arc<SceneRepository>, tools: ToolRegistry) -> Self {
        Self {
            id,
            repository,
            tools,
        }
    }

    /// Atomically swap in a freshly reloaded scene repository between turns
    /// (Design Note §9: hot-reload via explicit replacement, no watcher
    /// thread). A turn already in flight keeps the repository it started
    /// with because it holds its own `Arc` clone via `current_scene`.
    pub fn replace_repository(&mut self, repository: Arc<SceneRepository>) {
        self.repository = repository;
    }

    fn current_scene(&self, world: &WorldState) -> Result<Scene, StoryEngineError> {
        self.repository
            .get(world.location())
            .cloned()
            .ok_or_else(|| StoryEngineError::CorruptWorldState(world.location().clone()))
    }

    fn handle_builtin(&self, command: &str, world: &WorldState, scene: &Scene) -> StoryEvent {
        let base = |narration: String, choices: Vec<Choice>| {
            StoryEvent::new(narration, choices).with_metadata("contributor_id", self.id.to_string())
        };
        match command {
            "look" => base(scene.description.clone(), scene.choices.clone())
                .with_metadata("location", scene.id.to_string()),
            "inventory" => {
                let items: Vec<String> = world.inventory().iter().map(|i| i.to_string()).collect();
                let narration = if items.is_empty() {
                    "You are carrying nothing.".to_string()
                } else {
                    format!("You are carrying: {}.", items.join(", "))
                };
                base(narration, scene.choices.clone()).with_metadata("items", items)
            }
            "journal" | "history" => {
                let entries = world.history();
                let narration = if entries.is_empty() {
                    "Your journal is empty.".to_string()
                } else {
                    entries.join(" ")
                };
                base(narration, scene.choices.clone())
                    .with_metadata("entries", entries.to_vec())
            }
            "recall" => {
                let slice = world.memory().query(&MemoryRequest::default_window());
                let mut lines = Vec::new();
                for action in &slice.actions {
                    lines.push(format!("You: {}", action.content));
                }
                for observation in &slice.observations {
                    lines.push(format!("...{}", observation.content));
                }
                let narration = if lines.is_empty() {
                    "Nothing comes to mind.".to_string()
                } else {
                    lines.join(" ")
                };
                base(narration, scene.choices.clone())
            }
            // help, status, save, load, tutorial, quit: metadata-only,
            // delegated to the driver (§4.2, §6).
            other => base(
                format!("(\"{other}\" is handled by the driver.)"),
                scene.choices.clone(),
            )
            .with_metadata("builtin", other.to_string()),
        }
    }

    fn tool_event(&self, result: wayfarer_engine_ports::ToolResult, scene: &Scene) -> StoryEvent {
        let mut event = StoryEvent::new(result.narration, scene.choices.clone())
            .with_metadata("ok", result.ok)
            .with_metadata("contributor_id", self.id.to_string());
        for (key, value) in result.metadata {
            event = event.with_metadata(key, value);
        }
        event
    }

    fn unknown_command_event(&self, command: &str, scene: &Scene) -> StoryEvent {
        let options: Vec<String> = scene.choices.iter().map(|c| c.command.clone()).collect();
        let narration = if options.is_empty() {
            format!("You can't \"{command}\" here.")
        } else {
            format!("You can't \"{command}\" here. Try: {}.", options.join(", "))
        };
        StoryEvent::new(narration, scene.choices.clone())
            .with_metadata("contributor_id", self.id.to_string())
    }

    fn apply_transition(
        &self,
        world: &mut WorldState,
        transition: &Transition,
    ) -> Result<StoryEvent, StoryEngineError> {
        if !world.has_all_items(transition.requires.iter()) {
            let narration = transition
                .failure_narration
                .clone()
                .unwrap_or_else(|| default_failure_narration(transition, world));
            let scene = self.current_scene(world)?;
            let event = StoryEvent::new(narration, scene.choices.clone())
                .with_metadata("location", scene.id.to_string())
                .with_metadata("items_granted", Vec::<String>::new())
                .with_metadata("items_consumed", Vec::<String>::new())
                .with_metadata("records_appended", Vec::<String>::new())
                .with_metadata("override_used", false)
                .with_metadata("contributor_id", self.id.to_string());
            return Ok(event);
        }

        let mut consumed = Vec::new();
        for item in &transition.consumes {
            world.consume_item(item);
            consumed.push(item.to_string());
        }
        let mut granted = Vec::new();
        if let Some(item) = &transition.item {
            world.grant_item(item.clone());
            granted.push(item.to_string());
        }
        let mut appended_records = Vec::new();
        for record in &transition.records {
            world.append_history(record.clone());
            appended_records.push(record.clone());
        }
        if let Some(target) = &transition.target {
            world.set_location(target.clone());
        }

        let mut narration = transition.narration.clone();
        let mut override_used: Value = Value::Bool(false);
        for (index, candidate) in transition.narration_overrides.iter().enumerate() {
            if candidate.matches(world.history(), world.inventory()) {
                narration = candidate.narration.clone();
                for record in &candidate.records {
                    world.append_history(record.clone());
                    appended_records.push(record.clone());
                }
                override_used = Value::from(index as u64);
                break;
            }
        }

        let scene = self.current_scene(world)?;
        let event = StoryEvent::new(narration, scene.choices.clone())
            .with_metadata("location", scene.id.to_string())
            .with_metadata("items_granted", granted)
            .with_metadata("items_consumed", consumed)
            .with_metadata("records_appended", appended_records)
            .with_metadata("override_used", override_used)
            .with_metadata("contributor_id", self.id.to_string());

        Ok(event)
    }

    /// The public operation: resolve `trigger` against `world` and emit a
    /// `StoryEvent`, mutating `world` as the resolved command dictates.
    pub fn propose_event(
        &self,
        world: &mut WorldState,
        trigger: &AgentTrigger,
    ) -> Result<StoryEvent, StoryEngineError> {
        let raw = trigger.payload.clone().unwrap_or_default();
        let trimmed = raw.trim();
        let (command_raw, argument) = match trimmed.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (trimmed, ""),
        };
        let command = command_raw.to_lowercase();

        let scene = self.current_scene(world)?;

        if is_builtin_command(&command) {
            tracing::debug!(command = %command, "resolved built-in command");
            return Ok(self.handle_builtin(&command, world, &scene));
        }

        if let Some(tool) = self.tools.get(&command) {
            tracing::debug!(command = %command, "dispatching to tool");
            let result = tool.run(argument, world);
            return Ok(self.tool_event(result, &scene));
        }

        if let Some(transition) = scene.transition_for(&command).cloned() {
            tracing::debug!(command = %command, scene = %scene.id, "resolved scene transition");
            return self.apply_transition(world, &transition);
        }

        tracing::debug!(command = %command, "unrecognised command");
        Ok(self.unknown_command_event(&command, &scene))
    }
}

#[async_trait]
impl Contributor for ScriptedSceneMachine {
    fn id(&self) -> &ContributorId {
        &self.id
    }

    async fn dispatch_primary(
        &mut self,
        world: &mut WorldState,
        trigger: &AgentTrigger,
        _cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<StoryEvent, ContributorError> {
        self.propose_event(world, trigger).map_err(|e| match e {
            StoryEngineError::CorruptWorldState(_) => ContributorError::Fatal(e.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_repository::SchemaMode;
    use serde_json::json;

    fn machine(doc: serde_json::Value) -> ScriptedSceneMachine {
        let repo = SceneRepository::from_value(&doc, SchemaMode::Strict).unwrap();
        ScriptedSceneMachine::new(
            ContributorId::new("scripted-engine").unwrap(),
            Arc::new(repo),
            ToolRegistry::new(),
        )
    }

    fn trigger(text: &str) -> AgentTrigger {
        AgentTrigger::player_input(text)
    }

    /// S1 - Gated transition fails then succeeds.
    #[test]
    fn s1_gated_transition_fails_then_succeeds() {
        let doc = json!({
            "gate": {
                "description": "A rusted gate bars the way.",
                "choices": [
                    {"command": "open", "description": "Open the gate"},
                    {"command": "back", "description": "Go back to the hall"}
                ],
                "transitions": {
                    "open": {
                        "narration": "The gate creaks open.",
                        "target": "courtyard",
                        "requires": ["rusty-key"],
                        "failure_narration": "The gate refuses."
                    },
                    "back": {"narration": "You return to the hall.", "target": "hall"}
                }
            },
            "hall": {
                "description": "A dusty hall.",
                "choices": [
                    {"command": "take", "description": "Take the rusty key"},
                    {"command": "forward", "description": "Go to the gate"}
                ],
                "transitions": {
                    "take": {"narration": "You take the rusty key.", "item": "rusty-key"},
                    "forward": {"narration": "You approach the gate.", "target": "gate"}
                }
            },
            "courtyard": {
                "description": "An open courtyard.",
                "choices": [],
                "transitions": {}
            }
        });
        let machine = machine(doc);
        let mut world =
            WorldState::new("player-1", SceneId::new("gate").unwrap(), 50);

        let event = machine.propose_event(&mut world, &trigger("open")).unwrap();
        assert_eq!(event.narration, "The gate refuses.");
        assert_eq!(world.location(), &SceneId::new("gate").unwrap());
        assert!(world.inventory().is_empty());

        machine
            .propose_event(&mut world, &trigger("back"))
            .unwrap();
        assert_eq!(world.location(), &SceneId::new("hall").unwrap());

        machine
            .propose_event(&mut world, &trigger("take"))
            .unwrap();
        assert!(world.has_item(&wayfarer_domain::ItemId::new("rusty-key").unwrap()));

        machine
            .propose_event(&mut world, &trigger("forward"))
            .unwrap();
        let event = machine.propose_event(&mut world, &trigger("open")).unwrap();
        assert_eq!(event.narration, "The gate creaks open.");
        assert_eq!(world.location(), &SceneId::new("courtyard").unwrap());
        assert!(world.has_item(&wayfarer_domain::ItemId::new("rusty-key").unwrap()));
    }

    /// S2 - Override fires only once history contains the required entry.
    #[test]
    fn s2_override_on_history() {
        let doc = json!({
            "lookout": {
                "description": "A windswept lookout.",
                "choices": [{"command": "signal", "description": "Signal the woods"}],
                "transitions": {
                    "signal": {
                        "narration": "The notes unravel.",
                        "narration_overrides": [
                            {
                                "narration": "The woods echo back.",
                                "requires_history_any": ["Picked up signal lesson"],
                                "records": ["Practiced the ranger signal"]
                            }
                        ]
                    }
                }
            }
        });
        let machine = machine(doc);
        let mut world =
            WorldState::new("player-1", SceneId::new("lookout").unwrap(), 50);

        let event = machine.propose_event(&mut world, &trigger("signal")).unwrap();
        assert_eq!(event.narration, "The notes unravel.");
        assert!(!world.has_history("Practiced the ranger signal"));

        world.append_history("Picked up signal lesson");
        let event = machine.propose_event(&mut world, &trigger("signal")).unwrap();
        assert_eq!(event.narration, "The woods echo back.");
        assert!(world.has_history("Practiced the ranger signal"));
    }

    #[test]
    fn idempotent_item_grant_property() {
        let doc = json!({
            "hall": {
                "description": "hall",
                "choices": [{"command": "take", "description": "Take the key"}],
                "transitions": {"take": {"narration": "Taken.", "item": "rusty-key"}}
            }
        });
        let machine = machine(doc);
        let mut world = WorldState::new("p1", SceneId::new("hall").unwrap(), 50);
        machine.propose_event(&mut world, &trigger("take")).unwrap();
        machine.propose_event(&mut world, &trigger("take")).unwrap();
        assert_eq!(world.inventory().len(), 1);
    }

    #[test]
    fn unknown_command_leaves_world_unchanged() {
        let doc = json!({
            "hall": {"description": "hall", "choices": [], "transitions": {}}
        });
        let machine = machine(doc);
        let mut world = WorldState::new("p1", SceneId::new("hall").unwrap(), 50);
        let event = machine.propose_event(&mut world, &trigger("juggle")).unwrap();
        assert!(event.narration.contains("juggle"));
        assert_eq!(world.history().len(), 0);
    }

    #[test]
    fn corrupt_world_state_is_fatal() {
        let doc = json!({
            "hall": {"description": "hall", "choices": [], "transitions": {}}
        });
        let machine = machine(doc);
        let mut world = WorldState::new("p1", SceneId::new("nowhere").unwrap(), 50);
        let err = machine.propose_event(&mut world, &trigger("look")).unwrap_err();
        assert!(matches!(err, StoryEngineError::CorruptWorldState(_)));
    }

    #[test]
    fn look_never_mutates_world() {
        let doc = json!({
            "hall": {"description": "A dusty hall.", "choices": [], "transitions": {}}
        });
        let machine = machine(doc);
        let mut world = WorldState::new("p1", SceneId::new("hall").unwrap(), 50);
        let before = world.history().len();
        let event = machine.propose_event(&mut world, &trigger("look")).unwrap();
        assert_eq!(event.narration, "A dusty hall.");
        assert_eq!(world.history().len(), before);
    }
}
