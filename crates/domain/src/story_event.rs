//! `StoryEvent` - the single merged turn output the coordinator hands back
//! to the driver.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scene::Choice;

/// One contributor's (or the coordinator's merged) narration + choices +
/// namespaced metadata for a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryEvent {
    pub narration: String,
    pub choices: Vec<Choice>,
    /// Namespaced by contributor id, e.g. `"scripted-engine"` or a provider
    /// contributor's configured id plus top-level coordinator keys
    /// (`turn`, `primary_location`, `active_contributors`).
    pub metadata: BTreeMap<String, Value>,
}

impl StoryEvent {
    pub fn new(narration: impl Into<String>, choices: Vec<Choice>) -> Self {
        Self {
            narration: narration.into(),
            choices,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
