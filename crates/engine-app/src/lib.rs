//! Application layer for the Wayfarer narrative runtime: the Scene
//! Repository (C2), Tool Registry (C3), Scripted Scene Machine (C4), LLM
//! Contributor (C5), Multi-Agent Coordinator (C6), and Session Snapshot (C7).
//! Everything here is driven through the `Contributor`/`LLMClient`/`Tool`
//! ports from `wayfarer-engine-ports`; no concrete provider or storage
//! adapter lives in this crate.

pub mod coordinator;
pub mod llm_contributor;
pub mod scene_repository;
pub mod scripted_scene_machine;
pub mod snapshot;
pub mod tool_registry;

pub use coordinator::{Coordinator, CoordinatorError, IsolationPolicy, RosterEntry};
pub use llm_contributor::{LlmContributor, RetryPolicy};
pub use scene_repository::{SceneIssue, SceneLoadError, SceneRepository, SchemaMode, SceneValidationError};
pub use scripted_scene_machine::{ScriptedSceneMachine, StoryEngineError};
pub use snapshot::{SessionSnapshot, SnapshotError};
pub use tool_registry::{LoreChunk, LoreTool, ToolRegistry};
