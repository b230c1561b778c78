//! The Multi-Agent Coordinator (C6): drives one session's turn loop,
//! dispatching the roster's primary then its secondaries, merging their
//! output into a single `StoryEvent`, and routing inter-contributor triggers
//! between turns.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use wayfarer_domain::{
    AgentTrigger, ContributorId, MemoryEntry, MemoryKind, QueuedMessage, StoryEvent, WorldState,
};
use wayfarer_engine_ports::{Contributor, ContributorError};

/// How the coordinator treats a secondary contributor that raises.
///
/// `Retry` resolves the Design Note §9 ambiguity left by the two named
/// policies (`quarantine`, `retry`) without their precise interaction
/// spelled out: a `Retry`-policy contributor is given `max_attempts`
/// consecutive turn failures before it is quarantined like any other; a
/// successful dispatch resets its failure count. See DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationPolicy {
    Quarantine,
    Retry { max_attempts: u32 },
}

impl Default for IsolationPolicy {
    fn default() -> Self {
        IsolationPolicy::Quarantine
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Active,
    Quarantined,
}

struct Seat {
    contributor: Box<dyn Contributor>,
    status: Status,
    consecutive_failures: u32,
}

/// A read-only view of one roster seat, for driver introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub id: ContributorId,
    pub is_primary: bool,
    pub quarantined: bool,
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("coordinator roster must have at least one contributor (the primary)")]
    EmptyRoster,

    /// The primary reported a failure that leaves `WorldState` unusable for
    /// any future turn. Fatal to the session - the caller restores from a
    /// snapshot or starts a new one.
    #[error("session is no longer usable: {0}")]
    CorruptWorldState(String),

    #[error("turn deadline exceeded")]
    DeadlineExceeded,
}

const NARRATION_SEPARATOR: &str = "\n\n";

fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|d| d.saturating_duration_since(Instant::now()))
}

/// Owns the roster, the pending inter-contributor queue, and the turn
/// counter for one session. `advance` is the coordinator's single public
/// operation (§4.4).
pub struct Coordinator {
    seats: Vec<Seat>,
    pending_queue: VecDeque<QueuedMessage>,
    turn: u64,
    isolation_policy: IsolationPolicy,
}

impl Coordinator {
    pub fn new(
        contributors: Vec<Box<dyn Contributor>>,
        isolation_policy: IsolationPolicy,
    ) -> Result<Self, CoordinatorError> {
        if contributors.is_empty() {
            return Err(CoordinatorError::EmptyRoster);
        }
        Ok(Self {
            seats: contributors
                .into_iter()
                .map(|contributor| Seat {
                    contributor,
                    status: Status::Active,
                    consecutive_failures: 0,
                })
                .collect(),
            pending_queue: VecDeque::new(),
            turn: 0,
            isolation_policy,
        })
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn pending_queue(&self) -> &VecDeque<QueuedMessage> {
        &self.pending_queue
    }

    /// Restore a coordinator's turn counter and pending queue from a
    /// snapshot, keeping the roster and isolation policy the driver already
    /// constructed it with. Quarantine state from the snapshot is applied by
    /// id; ids absent from the current roster are ignored.
    pub fn restore_state(
        &mut self,
        turn: u64,
        pending_queue: VecDeque<QueuedMessage>,
        quarantined: &[ContributorId],
    ) {
        self.turn = turn;
        self.pending_queue = pending_queue;
        for seat in &mut self.seats {
            seat.status = if quarantined.contains(seat.contributor.id()) {
                Status::Quarantined
            } else {
                Status::Active
            };
        }
    }

    pub fn roster(&self) -> Vec<RosterEntry> {
        self.seats
            .iter()
            .enumerate()
            .map(|(i, seat)| RosterEntry {
                id: seat.contributor.id().clone(),
                is_primary: i == 0,
                quarantined: seat.status == Status::Quarantined,
            })
            .collect()
    }

    pub fn quarantined_ids(&self) -> Vec<ContributorId> {
        self.seats
            .iter()
            .filter(|seat| seat.status == Status::Quarantined)
            .map(|seat| seat.contributor.id().clone())
            .collect()
    }

    fn drain_due_triggers(&mut self) -> Vec<AgentTrigger> {
        let turn = self.turn;
        let mut due = Vec::new();
        let mut keep = VecDeque::new();
        while let Some(queued) = self.pending_queue.pop_front() {
            if queued.scheduled_turn <= turn {
                due.push(queued.trigger);
            } else {
                keep.push_back(queued);
            }
        }
        self.pending_queue = keep;
        due
    }

    fn apply_failure(&mut self, index: usize) {
        let seat = &mut self.seats[index];
        match self.isolation_policy {
            IsolationPolicy::Quarantine => seat.status = Status::Quarantined,
            IsolationPolicy::Retry { max_attempts } => {
                seat.consecutive_failures += 1;
                if seat.consecutive_failures >= max_attempts {
                    seat.status = Status::Quarantined;
                }
            }
        }
    }

    /// Run one turn: dispatch the primary, drain and dispatch to active
    /// secondaries, merge, and enqueue follow-up triggers. `deadline` is an
    /// absolute instant; `cancel` is checked between every contributor
    /// dispatch.
    pub async fn advance(
        &mut self,
        world: &mut WorldState,
        player_input: &str,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<StoryEvent, CoordinatorError> {
        self.turn += 1;
        let pre_turn_world = world.clone();

        world.memory_mut().append(MemoryEntry::new(
            MemoryKind::Action,
            player_input.to_string(),
            [],
            chrono::Utc::now(),
        ));

        let input_trigger = AgentTrigger::player_input(player_input);

        let primary_event = {
            let primary = &mut self.seats[0].contributor;
            let dispatch = primary.dispatch_primary(world, &input_trigger, cancel);
            let result = match remaining(deadline) {
                Some(budget) => match tokio::time::timeout(budget, dispatch).await {
                    Ok(r) => r,
                    Err(_) => return Err(CoordinatorError::DeadlineExceeded),
                },
                None => dispatch.await,
            };
            match result {
                Ok(event) => event,
                Err(ContributorError::Fatal(message)) => {
                    return Err(CoordinatorError::CorruptWorldState(message));
                }
                Err(other) => {
                    *world = pre_turn_world;
                    return Ok(StoryEvent::new(
                        format!("The story falters: {other}"),
                        Vec::new(),
                    )
                    .with_metadata("error", "primary_failed")
                    .with_metadata("turn", self.turn));
                }
            }
        };

        let due_triggers = self.drain_due_triggers();
        let mut newly_quarantined = Vec::new();
        let mut secondary_events: Vec<(ContributorId, StoryEvent)> = Vec::new();
        let mut enqueued = Vec::new();

        for index in 1..self.seats.len() {
            if self.seats[index].status != Status::Active {
                continue;
            }
            if cancel.is_cancelled() {
                break;
            }

            let contributor_id = self.seats[index].contributor.id().clone();
            let mut triggers: Vec<AgentTrigger> = due_triggers
                .iter()
                .filter(|t| t.is_addressed_to(&contributor_id))
                .cloned()
                .collect();
            if self.seats[index].contributor.capabilities().subscribes_to_player_input
                && input_trigger.is_addressed_to(&contributor_id)
            {
                triggers.push(input_trigger.clone());
            }

            let dispatch = self.seats[index]
                .contributor
                .dispatch_secondary(world, &triggers, cancel);
            let result = match remaining(deadline) {
                Some(budget) => match tokio::time::timeout(budget, dispatch).await {
                    Ok(r) => r,
                    Err(_) => return Err(CoordinatorError::DeadlineExceeded),
                },
                None => dispatch.await,
            };

            match result {
                Ok(outcome) => {
                    self.seats[index].consecutive_failures = 0;
                    if let Some(event) = outcome.event {
                        secondary_events.push((contributor_id.clone(), event));
                    }
                    for trigger in outcome.new_triggers {
                        enqueued.push(trigger);
                    }
                }
                Err(ContributorError::NotCapable) => {}
                Err(_failure) => {
                    self.apply_failure(index);
                    if self.seats[index].status == Status::Quarantined {
                        newly_quarantined.push(contributor_id);
                    }
                }
            }
        }

        for trigger in enqueued {
            self.pending_queue.push_back(QueuedMessage {
                trigger,
                scheduled_turn: self.turn + 1,
            });
        }

        let mut narration = primary_event.narration.clone();
        let mut choices = primary_event.choices.clone();
        let mut seen_commands: std::collections::BTreeSet<String> = choices
            .iter()
            .map(|c| c.command.to_lowercase())
            .collect();
        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert(
            self.seats[0].contributor.id().to_string(),
            serde_json::to_value(&primary_event.metadata).unwrap_or(Value::Null),
        );

        for (contributor_id, event) in &secondary_events {
            if !event.narration.is_empty() {
                narration.push_str(NARRATION_SEPARATOR);
                narration.push_str(&event.narration);
            }
            for choice in &event.choices {
                let key = choice.command.to_lowercase();
                if seen_commands.insert(key) {
                    choices.push(choice.clone());
                }
            }
            metadata.insert(
                contributor_id.to_string(),
                serde_json::to_value(&event.metadata).unwrap_or(Value::Null),
            );
        }

        metadata.insert("turn".to_string(), Value::from(self.turn));
        metadata.insert(
            "primary_location".to_string(),
            primary_event
                .metadata
                .get("location")
                .cloned()
                .unwrap_or(Value::Null),
        );
        metadata.insert(
            "active_contributors".to_string(),
            Value::from(
                self.seats
                    .iter()
                    .filter(|seat| seat.status == Status::Active)
                    .map(|seat| seat.contributor.id().to_string())
                    .collect::<Vec<_>>(),
            ),
        );
        if !newly_quarantined.is_empty() {
            metadata.insert(
                "quarantined".to_string(),
                Value::from(
                    newly_quarantined
                        .iter()
                        .map(|id| id.to_string())
                        .collect::<Vec<_>>(),
                ),
            );
        }

        world.memory_mut().append(MemoryEntry::new(
            MemoryKind::Observation,
            narration.clone(),
            [],
            chrono::Utc::now(),
        ));

        Ok(StoryEvent {
            narration,
            choices,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use wayfarer_domain::{Choice, SceneId};
    use wayfarer_engine_ports::ContributorOutcome;

    struct StubPrimary {
        id: ContributorId,
    }

    #[async_trait]
    impl Contributor for StubPrimary {
        fn id(&self) -> &ContributorId {
            &self.id
        }

        async fn dispatch_primary(
            &mut self,
            _world: &mut WorldState,
            _trigger: &AgentTrigger,
            _cancel: &CancellationToken,
        ) -> Result<StoryEvent, ContributorError> {
            Ok(StoryEvent::new(
                "You step forward.",
                vec![Choice {
                    command: "north".into(),
                    description: "Go north".into(),
                }],
            )
            .with_metadata("location", "hall"))
        }
    }

    struct StubSecondary {
        id: ContributorId,
        fail: bool,
    }

    #[async_trait]
    impl Contributor for StubSecondary {
        fn id(&self) -> &ContributorId {
            &self.id
        }

        async fn dispatch_secondary(
            &mut self,
            _world: &WorldState,
            _triggers: &[AgentTrigger],
            _cancel: &CancellationToken,
        ) -> Result<ContributorOutcome, ContributorError> {
            if self.fail {
                return Err(ContributorError::Failed("raven fled".into()));
            }
            Ok(ContributorOutcome::event_only(StoryEvent::new(
                "A raven watches.",
                vec![
                    Choice {
                        command: "north".into(),
                        description: "duplicate".into(),
                    },
                    Choice {
                        command: "wave".into(),
                        description: "Wave at the raven".into(),
                    },
                ],
            )))
        }
    }

    fn world() -> WorldState {
        WorldState::new("player-1", SceneId::new("hall").unwrap(), 50)
    }

    /// S3 - coordinator merge.
    #[tokio::test]
    async fn s3_coordinator_merge() {
        let mut coordinator = Coordinator::new(
            vec![
                Box::new(StubPrimary {
                    id: ContributorId::new("scripted").unwrap(),
                }),
                Box::new(StubSecondary {
                    id: ContributorId::new("stub").unwrap(),
                    fail: false,
                }),
            ],
            IsolationPolicy::Quarantine,
        )
        .unwrap();

        let mut w = world();
        let event = coordinator
            .advance(&mut w, "forward", &CancellationToken::new(), None)
            .await
            .unwrap();

        assert!(event.narration.starts_with("You step forward."));
        assert!(event.narration.contains("A raven watches."));
        assert_eq!(event.choices.len(), 2);
        assert_eq!(event.choices[0].command, "north");
        assert_eq!(event.choices[1].command, "wave");
        assert_eq!(coordinator.turn(), 1);
        assert!(event.metadata.contains_key("scripted"));
        assert!(event.metadata.contains_key("stub"));
    }

    /// S4 - quarantine on secondary failure.
    #[tokio::test]
    async fn s4_quarantine_on_secondary_failure() {
        let mut coordinator = Coordinator::new(
            vec![
                Box::new(StubPrimary {
                    id: ContributorId::new("scripted").unwrap(),
                }),
                Box::new(StubSecondary {
                    id: ContributorId::new("stub").unwrap(),
                    fail: true,
                }),
            ],
            IsolationPolicy::Quarantine,
        )
        .unwrap();

        let mut w = world();
        let event = coordinator
            .advance(&mut w, "forward", &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(event.narration, "You step forward.");
        assert_eq!(event.choices.len(), 1);
        let quarantined = event.metadata.get("quarantined").unwrap();
        assert_eq!(quarantined, &serde_json::json!(["stub"]));

        assert!(coordinator
            .roster()
            .iter()
            .find(|r| r.id.as_str() == "stub")
            .unwrap()
            .quarantined);

        // Next advance does not re-invoke the quarantined contributor.
        let event2 = coordinator
            .advance(&mut w, "forward", &CancellationToken::new(), None)
            .await
            .unwrap();
        assert_eq!(event2.narration, "You step forward.");
    }

    #[tokio::test]
    async fn empty_roster_is_rejected() {
        let result = Coordinator::new(vec![], IsolationPolicy::Quarantine);
        assert!(matches!(result, Err(CoordinatorError::EmptyRoster)));
    }

    #[tokio::test]
    async fn primary_failure_rolls_back_world_and_memory() {
        struct FailingPrimary {
            id: ContributorId,
        }
        #[async_trait]
        impl Contributor for FailingPrimary {
            fn id(&self) -> &ContributorId {
                &self.id
            }
            async fn dispatch_primary(
                &mut self,
                world: &mut WorldState,
                _trigger: &AgentTrigger,
                _cancel: &CancellationToken,
            ) -> Result<StoryEvent, ContributorError> {
                world.grant_item(wayfarer_domain::ItemId::new("ghost-item").unwrap());
                Err(ContributorError::Failed("boom".into()))
            }
        }

        let mut coordinator = Coordinator::new(
            vec![Box::new(FailingPrimary {
                id: ContributorId::new("scripted").unwrap(),
            })],
            IsolationPolicy::Quarantine,
        )
        .unwrap();

        let mut w = world();
        let before_memory_len = w.memory().len();
        let event = coordinator
            .advance(&mut w, "open", &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(event.metadata.get("error").unwrap(), "primary_failed");
        assert!(w.inventory().is_empty());
        assert_eq!(w.memory().len(), before_memory_len);
    }
}
