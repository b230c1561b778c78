//! Session Snapshot (C7): the on-disk JSON shape for a session's
//! `WorldState`, memory log, and coordinator pending-message queue /
//! quarantine list, and the codec between that shape and the live types.
//!
//! `wayfarer-engine-app` owns only the codec - a session driver in
//! `wayfarer-session` decides where the bytes live.

use std::collections::{BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wayfarer_domain::{ContributorId, ItemId, MemoryEntry, MemoryLog, QueuedMessage, SceneId, WorldState};

use crate::coordinator::Coordinator;
use crate::scene_repository::SceneRepository;

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MemorySnapshot {
    capacity: usize,
    entries: Vec<MemoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WorldSnapshot {
    actor: String,
    location: SceneId,
    inventory: BTreeSet<ItemId>,
    history: Vec<String>,
    memory: MemorySnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CoordinatorSnapshot {
    turn: u64,
    pending_queue: Vec<QueuedMessage>,
    quarantined: Vec<ContributorId>,
}

/// `{schema_version, captured_at, world, coordinator}` - the documented
/// snapshot shape (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    schema_version: u32,
    captured_at: DateTime<Utc>,
    world: WorldSnapshot,
    coordinator: CoordinatorSnapshot,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("snapshot targets schema version {0}, this build only restores version {SCHEMA_VERSION}")]
    UnsupportedSchemaVersion(u32),

    #[error("snapshot location `{0}` does not exist in the active scene repository")]
    UnknownLocation(SceneId),
}

impl SessionSnapshot {
    /// Capture `world` and `coordinator` as of `captured_at`.
    pub fn capture(world: &WorldState, coordinator: &Coordinator, captured_at: DateTime<Utc>) -> Self {
        let memory = world.memory();
        Self {
            schema_version: SCHEMA_VERSION,
            captured_at,
            world: WorldSnapshot {
                actor: world.actor.clone(),
                location: world.location().clone(),
                inventory: world.inventory().clone(),
                history: world.history().to_vec(),
                memory: MemorySnapshot {
                    capacity: memory.capacity(),
                    entries: memory.iter().cloned().collect(),
                },
            },
            coordinator: CoordinatorSnapshot {
                turn: coordinator.turn(),
                pending_queue: coordinator.pending_queue().iter().cloned().collect(),
                quarantined: coordinator.quarantined_ids(),
            },
        }
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_slice(bytes)?;
        if snapshot.schema_version != SCHEMA_VERSION {
            return Err(SnapshotError::UnsupportedSchemaVersion(snapshot.schema_version));
        }
        Ok(snapshot)
    }

    /// Rebuild the captured `WorldState`, rejecting a snapshot whose
    /// location `repository` no longer has.
    pub fn restore_world(&self, repository: &SceneRepository) -> Result<WorldState, SnapshotError> {
        if !repository.contains(&self.world.location) {
            return Err(SnapshotError::UnknownLocation(self.world.location.clone()));
        }
        let mut memory = MemoryLog::new(self.world.memory.capacity);
        for entry in &self.world.memory.entries {
            memory.append(entry.clone());
        }
        Ok(WorldState::from_parts(
            self.world.actor.clone(),
            self.world.location.clone(),
            self.world.inventory.clone(),
            self.world.history.clone(),
            memory,
        ))
    }

    /// Apply this snapshot's turn counter, pending queue, and quarantine
    /// list onto a `Coordinator` already built with the snapshot's roster.
    pub fn restore_coordinator(&self, coordinator: &mut Coordinator) {
        coordinator.restore_state(
            self.coordinator.turn,
            self.coordinator.pending_queue.iter().cloned().collect::<VecDeque<_>>(),
            &self.coordinator.quarantined,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::IsolationPolicy;
    use crate::scene_repository::SchemaMode;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;
    use wayfarer_domain::{AgentTrigger, StoryEvent, TargetAgent};
    use wayfarer_engine_ports::{Contributor, ContributorError, ContributorOutcome};

    struct EchoPrimary {
        id: ContributorId,
    }

    #[async_trait]
    impl Contributor for EchoPrimary {
        fn id(&self) -> &ContributorId {
            &self.id
        }

        async fn dispatch_primary(
            &mut self,
            _world: &mut WorldState,
            trigger: &AgentTrigger,
            _cancel: &CancellationToken,
        ) -> Result<StoryEvent, ContributorError> {
            Ok(StoryEvent::new(
                format!("You {}.", trigger.payload.as_deref().unwrap_or("")),
                Vec::new(),
            ))
        }
    }

    struct PingingSecondary {
        id: ContributorId,
    }

    #[async_trait]
    impl Contributor for PingingSecondary {
        fn id(&self) -> &ContributorId {
            &self.id
        }

        async fn dispatch_secondary(
            &mut self,
            _world: &WorldState,
            triggers: &[AgentTrigger],
            _cancel: &CancellationToken,
        ) -> Result<ContributorOutcome, ContributorError> {
            if triggers
                .iter()
                .any(|t| matches!(t.payload.as_deref(), Some("wait") | Some("ping")))
            {
                return Ok(ContributorOutcome::event_only(StoryEvent::new(
                    "A bell tolls.",
                    Vec::new(),
                ))
                .with_trigger(AgentTrigger::agent_message(
                    self.id.clone(),
                    TargetAgent::Specific(self.id.clone()),
                    "ping",
                )));
            }
            Ok(ContributorOutcome::silent())
        }
    }

    fn repository() -> SceneRepository {
        let doc = json!({
            "hall": {
                "description": "A hall.",
                "choices": [],
                "transitions": {}
            }
        });
        SceneRepository::from_value(&doc, SchemaMode::Strict).unwrap()
    }

    #[tokio::test]
    async fn s6_snapshot_round_trip_mid_queue() {
        let mut coordinator = Coordinator::new(
            vec![
                Box::new(EchoPrimary {
                    id: ContributorId::new("scripted").unwrap(),
                }),
                Box::new(PingingSecondary {
                    id: ContributorId::new("bell").unwrap(),
                }),
            ],
            IsolationPolicy::Quarantine,
        )
        .unwrap();

        let mut world = WorldState::new("player-1", SceneId::new("hall").unwrap(), 50);
        coordinator
            .advance(&mut world, "wait", &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(coordinator.pending_queue().len(), 1);

        let captured_at = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let snapshot = SessionSnapshot::capture(&world, &coordinator, captured_at);
        let bytes = snapshot.to_bytes().unwrap();
        let restored_snapshot = SessionSnapshot::from_bytes(&bytes).unwrap();
        assert_eq!(restored_snapshot, snapshot);

        let repository = repository();
        let mut restored_world = restored_snapshot.restore_world(&repository).unwrap();
        let mut restored_coordinator = Coordinator::new(
            vec![
                Box::new(EchoPrimary {
                    id: ContributorId::new("scripted").unwrap(),
                }),
                Box::new(PingingSecondary {
                    id: ContributorId::new("bell").unwrap(),
                }),
            ],
            IsolationPolicy::Quarantine,
        )
        .unwrap();
        restored_snapshot.restore_coordinator(&mut restored_coordinator);
        assert_eq!(restored_coordinator.turn(), coordinator.turn());
        assert_eq!(
            restored_coordinator.pending_queue().len(),
            coordinator.pending_queue().len()
        );

        // Turn 2: the secondary receives the queued `ping` exactly as it
        // would have without the round trip.
        let event = restored_coordinator
            .advance(
                &mut restored_world,
                "look",
                &CancellationToken::new(),
                None,
            )
            .await
            .unwrap();
        assert!(event.narration.contains("A bell tolls."));

        let round_tripped_bytes = SessionSnapshot::capture(
            &restored_world,
            &restored_coordinator,
            restored_snapshot.captured_at(),
        );
        assert_eq!(round_tripped_bytes.coordinator.turn, 2);
    }

    #[test]
    fn rejects_unknown_location() {
        let mut world = WorldState::new("player-1", SceneId::new("hall").unwrap(), 10);
        world.set_location(SceneId::new("nowhere").unwrap());
        let coordinator = Coordinator::new(
            vec![Box::new(EchoPrimary {
                id: ContributorId::new("scripted").unwrap(),
            })],
            IsolationPolicy::Quarantine,
        )
        .unwrap();
        let snapshot = SessionSnapshot::capture(&world, &coordinator, Utc::now());
        let err = snapshot.restore_world(&repository()).unwrap_err();
        assert!(matches!(err, SnapshotError::UnknownLocation(_)));
    }

    #[test]
    fn rejects_future_schema_version() {
        let world = WorldState::new("player-1", SceneId::new("hall").unwrap(), 10);
        let coordinator = Coordinator::new(
            vec![Box::new(EchoPrimary {
                id: ContributorId::new("scripted").unwrap(),
            })],
            IsolationPolicy::Quarantine,
        )
        .unwrap();
        let mut snapshot = SessionSnapshot::capture(&world, &coordinator, Utc::now());
        snapshot.schema_version = SCHEMA_VERSION + 1;
        let bytes = snapshot.to_bytes().unwrap();
        let err = SessionSnapshot::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, SnapshotError::UnsupportedSchemaVersion(_)));
    }
}
