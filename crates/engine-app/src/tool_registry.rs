//! The Tool Registry (C3): a lookup from command name to a registered
//! [`Tool`], plus a reference tool implementation (`LoreTool`) for a
//! keyword-indexed lore lookup, without pulling in a bundled template
//! catalogue (out of scope per §1).

use std::collections::BTreeMap;

use wayfarer_engine_ports::Tool;

/// Maps a command name to the tool that handles it. Lookups are
/// case-insensitive, matching the Scripted Scene Machine's command
/// normalisation.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_lowercase(), tool);
    }

    pub fn get(&self, command: &str) -> Option<&dyn Tool> {
        self.tools.get(&command.to_lowercase()).map(|t| t.as_ref())
    }

    pub fn contains(&self, command: &str) -> bool {
        self.tools.contains_key(&command.to_lowercase())
    }
}

/// An in-memory, keyword-indexed lore lookup: the reference Tool
/// implementation. A real deployment would back this with the editor's
/// compendium (out of scope, §1); here it's a flat `Vec<LoreChunk>` searched
/// by substring, which is enough to exercise the C3 contract end to end.
#[derive(Debug, Clone)]
pub struct LoreChunk {
    pub keywords: Vec<String>,
    pub text: String,
}

pub struct LoreTool {
    chunks: Vec<LoreChunk>,
}

impl LoreTool {
    pub fn new(chunks: Vec<LoreChunk>) -> Self {
        Self { chunks }
    }
}

impl Tool for LoreTool {
    fn name(&self) -> &str {
        "lore"
    }

    fn description(&self) -> &str {
        "Looks up known lore by keyword."
    }

    fn run(&self, argument: &str, _world: &wayfarer_domain::WorldState) -> wayfarer_engine_ports::ToolResult {
        let needle = argument.trim().to_lowercase();
        if needle.is_empty() {
            return wayfarer_engine_ports::ToolResult::failure(
                "Ask the archive about something specific.",
            );
        }
        let hit = self
            .chunks
            .iter()
            .find(|chunk| chunk.keywords.iter().any(|k| k.to_lowercase() == needle));
        match hit {
            Some(chunk) => wayfarer_engine_ports::ToolResult::success(chunk.text.clone()),
            None => wayfarer_engine_ports::ToolResult::failure(
                "The lore archive is silent on that.",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfarer_domain::{SceneId, WorldState};

    fn world() -> WorldState {
        WorldState::new("player-1", SceneId::new("hall").unwrap(), 10)
    }

    #[test]
    fn registry_lookup_is_case_insensitive() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(LoreTool::new(vec![])));
        assert!(registry.contains("LORE"));
        assert!(registry.get("lore").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn lore_tool_matches_on_keyword() {
        let tool = LoreTool::new(vec![LoreChunk {
            keywords: vec!["ranger".into()],
            text: "Rangers once guarded these woods.".into(),
        }]);
        let result = tool.run("ranger", &world());
        assert!(result.ok);
        assert_eq!(result.narration, "Rangers once guarded these woods.");
    }

    #[test]
    fn lore_tool_fails_cleanly_on_miss() {
        let tool = LoreTool::new(vec![]);
        let result = tool.run("dragons", &world());
        assert!(!result.ok);
    }
}
