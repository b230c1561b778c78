//! `AgentTrigger`/`TargetAgent`/`QueuedMessage` - the cross-contributor
//! messaging primitives the coordinator routes between turns.
//!
//! `TargetAgent` is a sum type (Design Note §9: "make `target_agent` a sum
//! type so tests can exhaustively exercise both") rather than an
//! `Option<ContributorId>` with an implicit "None means broadcast"
//! convention - the two cases are spelled out so a `match` is exhaustive and
//! a reader never has to remember what `None` means here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ContributorId;

/// Routing target for a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetAgent {
    /// Delivered to every active contributor except the source.
    Broadcast,
    /// Delivered only to the named contributor.
    Specific(ContributorId),
}

/// What caused a contributor to be invoked on a given turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    PlayerInput,
    AgentMessage,
    System,
}

/// A message that causes a contributor to be invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTrigger {
    pub kind: TriggerKind,
    pub payload: Option<String>,
    pub source_agent: Option<ContributorId>,
    pub target_agent: TargetAgent,
    pub metadata: BTreeMap<String, Value>,
}

impl AgentTrigger {
    pub fn player_input(payload: impl Into<String>) -> Self {
        Self {
            kind: TriggerKind::PlayerInput,
            payload: Some(payload.into()),
            source_agent: None,
            target_agent: TargetAgent::Broadcast,
            metadata: BTreeMap::new(),
        }
    }

    pub fn agent_message(
        source: ContributorId,
        target: TargetAgent,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            kind: TriggerKind::AgentMessage,
            payload: Some(payload.into()),
            source_agent: Some(source),
            target_agent: target,
            metadata: BTreeMap::new(),
        }
    }

    /// Whether this trigger should be delivered to `contributor`, given who
    /// produced it (a contributor is never delivered its own broadcast).
    pub fn is_addressed_to(&self, contributor: &ContributorId) -> bool {
        match &self.target_agent {
            TargetAgent::Broadcast => self.source_agent.as_ref() != Some(contributor),
            TargetAgent::Specific(target) => target == contributor,
        }
    }
}

/// A trigger queued for a future turn, stamped with the turn it was
/// scheduled on. Delivered no earlier than `scheduled_turn + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub trigger: AgentTrigger,
    pub scheduled_turn: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(s: &str) -> ContributorId {
        ContributorId::new(s).unwrap()
    }

    #[test]
    fn broadcast_excludes_source() {
        let trigger = AgentTrigger::agent_message(cid("raven"), TargetAgent::Broadcast, "ping");
        assert!(!trigger.is_addressed_to(&cid("raven")));
        assert!(trigger.is_addressed_to(&cid("scripted-engine")));
    }

    #[test]
    fn specific_only_matches_named_target() {
        let trigger = AgentTrigger::agent_message(
            cid("raven"),
            TargetAgent::Specific(cid("raven")),
            "ping",
        );
        assert!(trigger.is_addressed_to(&cid("raven")));
        assert!(!trigger.is_addressed_to(&cid("other")));
    }

    #[test]
    fn player_input_has_no_source_and_broadcasts() {
        let trigger = AgentTrigger::player_input("open gate");
        assert_eq!(trigger.target_agent, TargetAgent::Broadcast);
        assert!(trigger.source_agent.is_none());
    }
}
