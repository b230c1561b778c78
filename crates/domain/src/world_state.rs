//! `WorldState` - the per-session, mutated-by-contract context object
//! threaded through every turn.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::{ItemId, SceneId};
use crate::memory::MemoryLog;

/// Authoritative per-session state: current location, held items, the
/// append-only history of free-form records, and the rolling memory log.
///
/// Invariants upheld by construction and by every mutator on this type:
/// - `location` always names a scene the active repository knows about
///   (callers are responsible for validating against the repository before
///   committing a transition; `WorldState` itself has no repository handle).
/// - `inventory` is a set: granting an already-held item is a no-op.
/// - `history` is append-only within a turn; nothing here ever removes an
///   entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldState {
    pub actor: String,
    location: SceneId,
    inventory: BTreeSet<ItemId>,
    history: Vec<String>,
    memory: MemoryLog,
}

impl WorldState {
    /// Start a new session at `start_scene`.
    pub fn new(actor: impl Into<String>, start_scene: SceneId, memory_capacity: usize) -> Self {
        Self {
            actor: actor.into(),
            location: start_scene,
            inventory: BTreeSet::new(),
            history: Vec::new(),
            memory: MemoryLog::new(memory_capacity),
        }
    }

    pub fn location(&self) -> &SceneId {
        &self.location
    }

    /// Move to `target`. Callers validate `target` against the scene
    /// repository before calling this - `WorldState` has no repository
    /// handle to validate against itself.
    pub fn set_location(&mut self, target: SceneId) {
        self.location = target;
    }

    pub fn inventory(&self) -> &BTreeSet<ItemId> {
        &self.inventory
    }

    pub fn has_item(&self, item: &ItemId) -> bool {
        self.inventory.contains(item)
    }

    pub fn has_all_items<'a>(&self, items: impl IntoIterator<Item = &'a ItemId>) -> bool {
        items.into_iter().all(|i| self.inventory.contains(i))
    }

    /// Idempotent grant: adding an already-held item changes nothing.
    pub fn grant_item(&mut self, item: ItemId) {
        self.inventory.insert(item);
    }

    pub fn consume_item(&mut self, item: &ItemId) {
        self.inventory.remove(item);
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn has_history(&self, record: &str) -> bool {
        self.history.iter().any(|h| h == record)
    }

    /// Append-only: history never shrinks.
    pub fn append_history(&mut self, record: impl Into<String>) {
        self.history.push(record.into());
    }

    pub fn memory(&self) -> &MemoryLog {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryLog {
        &mut self.memory
    }

    /// Rebuild a `WorldState` from its constituent parts, for restoring a
    /// session snapshot. Callers are responsible for the same invariant
    /// `new` leaves to them: `location` must name a scene the repository
    /// the session restores against actually has.
    pub fn from_parts(
        actor: impl Into<String>,
        location: SceneId,
        inventory: BTreeSet<ItemId>,
        history: Vec<String>,
        memory: MemoryLog,
    ) -> Self {
        Self {
            actor: actor.into(),
            location,
            inventory,
            history,
            memory,
        }
    }
}
