//! The scene graph's node/edge types: `Scene`, `Choice`, `Transition`, and
//! `NarrationOverride`. These are the typed values a `SceneRepository`
//! produces after validating raw JSON - by the time anything in
//! `wayfarer-engine-app` touches a `Scene`, every field has already been
//! checked, so no runtime code here branches on shape.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ids::{ItemId, SceneId};

/// One command a player may issue while in a scene, surfaced to the driver
/// so it can render an affordance list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub command: String,
    pub description: String,
}

/// A conditional narration block. The first override (in declared order)
/// whose filters all pass wins; later overrides in the same transition never
/// contribute narration or records in that turn.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NarrationOverride {
    pub narration: String,
    #[serde(default)]
    pub requires_history_all: Vec<String>,
    #[serde(default)]
    pub requires_history_any: Vec<String>,
    #[serde(default)]
    pub forbids_history_any: Vec<String>,
    #[serde(default)]
    pub requires_inventory_all: Vec<ItemId>,
    #[serde(default)]
    pub requires_inventory_any: Vec<ItemId>,
    #[serde(default)]
    pub forbids_inventory_any: Vec<ItemId>,
    #[serde(default)]
    pub records: Vec<String>,
}

impl NarrationOverride {
    /// Whether every provided filter passes against the given history and
    /// inventory. An absent filter is vacuously true; an empty `_all` list is
    /// vacuously true (nothing required); an empty `_any` list is vacuously
    /// false (nothing present, so "any" can't be satisfied) - matching the
    /// filter semantics of §4.2.
    pub fn matches(&self, history: &[String], inventory: &BTreeSet<ItemId>) -> bool {
        let all_in_history = |items: &[String]| items.iter().all(|h| history.iter().any(|x| x == h));
        let any_in_history = |items: &[String]| {
            if items.is_empty() {
                false
            } else {
                items.iter().any(|h| history.iter().any(|x| x == h))
            }
        };
        let none_in_history = |items: &[String]| !items.iter().any(|h| history.iter().any(|x| x == h));

        let all_in_inventory = |items: &[ItemId]| items.iter().all(|i| inventory.contains(i));
        let any_in_inventory = |items: &[ItemId]| {
            if items.is_empty() {
                false
            } else {
                items.iter().any(|i| inventory.contains(i))
            }
        };
        let none_in_inventory = |items: &[ItemId]| !items.iter().any(|i| inventory.contains(i));

        (self.requires_history_all.is_empty() || all_in_history(&self.requires_history_all))
            && (self.requires_history_any.is_empty() || any_in_history(&self.requires_history_any))
            && (self.forbids_history_any.is_empty() || none_in_history(&self.forbids_history_any))
            && (self.requires_inventory_all.is_empty() || all_in_inventory(&self.requires_inventory_all))
            && (self.requires_inventory_any.is_empty() || any_in_inventory(&self.requires_inventory_any))
            && (self.forbids_inventory_any.is_empty() || none_in_inventory(&self.forbids_inventory_any))
    }
}

/// An edge in the scene graph: what happens when a command is issued in a
/// scene where it resolves to this transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub narration: String,
    #[serde(default)]
    pub target: Option<SceneId>,
    #[serde(default)]
    pub item: Option<ItemId>,
    #[serde(default)]
    pub requires: BTreeSet<ItemId>,
    #[serde(default)]
    pub consumes: BTreeSet<ItemId>,
    #[serde(default)]
    pub failure_narration: Option<String>,
    #[serde(default)]
    pub records: Vec<String>,
    #[serde(default)]
    pub narration_overrides: Vec<NarrationOverride>,
}

/// A node in the scene graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub id: SceneId,
    pub description: String,
    pub choices: Vec<Choice>,
    pub transitions: BTreeMap<String, Transition>,
}

impl Scene {
    pub fn transition_for(&self, command: &str) -> Option<&Transition> {
        self.transitions.get(command)
    }
}
