//! Core domain types for the Wayfarer narrative runtime: `WorldState`, the
//! `MemoryLog`, the scene graph's node/edge types, and the turn-coordination
//! messaging primitives. No I/O, no async runtime - everything here is a
//! pure value type and its invariants.

pub mod error;
pub mod ids;
pub mod memory;
pub mod scene;
pub mod story_event;
pub mod trigger;
pub mod world_state;

pub use error::DomainError;
pub use ids::{ContributorId, ItemId, SceneId};
pub use memory::{MemoryEntry, MemoryKind, MemoryLog, MemoryRequest, MemorySlice};
pub use scene::{Choice, NarrationOverride, Scene, Transition};
pub use story_event::StoryEvent;
pub use trigger::{AgentTrigger, QueuedMessage, TargetAgent, TriggerKind};
pub use world_state::WorldState;
