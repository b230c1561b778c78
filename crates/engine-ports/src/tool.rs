//! The Tool Registry's side-channel contract (C3): `{name, description,
//! run(argument, world) -> ToolResult}`. A tool receives a read-only view of
//! `WorldState`, enforced by the type system (`&WorldState`, not
//! `&mut WorldState`) rather than by a documentation comment a caller could
//! ignore.

use std::collections::BTreeMap;

use serde_json::Value;
use wayfarer_domain::WorldState;

/// The result of running a tool. `ok = false` is a clean failure: the
/// engine still emits `narration` as the turn's event, just with `ok: false`
/// stamped into metadata, rather than propagating an error.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub narration: String,
    pub metadata: BTreeMap<String, Value>,
    pub ok: bool,
}

impl ToolResult {
    pub fn success(narration: impl Into<String>) -> Self {
        Self {
            narration: narration.into(),
            metadata: BTreeMap::new(),
            ok: true,
        }
    }

    pub fn failure(narration: impl Into<String>) -> Self {
        Self {
            narration: narration.into(),
            metadata: BTreeMap::new(),
            ok: false,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A named side-channel handler invoked by the Scripted Scene Machine when a
/// command matches `name()`. Tools never mutate `WorldState` and never fail
/// loudly - a tool that can't complete its job returns `ToolResult::failure`.
#[cfg_attr(feature = "testing", mockall::automock)]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn run(&self, argument: &str, world: &WorldState) -> ToolResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_result_carries_ok_false() {
        let result = ToolResult::failure("The lore archive is silent on that.");
        assert!(!result.ok);
        assert_eq!(result.narration, "The lore archive is silent on that.");
    }

    #[test]
    fn with_metadata_accumulates() {
        let result = ToolResult::success("Found it.").with_metadata("matches", 2);
        assert_eq!(result.metadata.get("matches").unwrap(), 2);
    }
}
