//! The `Contributor` trait: the single protocol both the Scripted Scene
//! Machine (primary) and an LLM Contributor (secondary) present to the
//! Multi-Agent Coordinator, per §4.3's "the LLM Contributor presents itself
//! to the coordinator with the same protocol as the scripted engine."
//!
//! The two dispatch methods differ in WorldState access, not in the
//! trigger-in/event-and-triggers-out shape: `dispatch_primary` gets
//! `&mut WorldState` because only the primary ever mutates it (§4.4 step 3);
//! `dispatch_secondary` gets `&WorldState`, enforced by the type system, so a
//! secondary contributor literally cannot compile a mutation into its
//! `decide` step. A contributor that is only ever used as a primary or only
//! ever used as a secondary simply doesn't override the other method's
//! default, which reports `ContributorError::NotCapable`.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use wayfarer_domain::{AgentTrigger, ContributorId, StoryEvent, WorldState};

use crate::llm_client::ProviderError;

/// What the coordinator needs to know about a contributor to schedule it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContributorCapabilities {
    /// Whether this contributor should receive the broadcast `PlayerInput`
    /// trigger every turn (§4.4 step 4), independent of any targeted
    /// messages queued for it.
    pub subscribes_to_player_input: bool,
}

impl Default for ContributorCapabilities {
    fn default() -> Self {
        Self {
            subscribes_to_player_input: true,
        }
    }
}

/// Zero-or-one `StoryEvent` plus zero-or-more triggers to enqueue for future
/// turns - exactly what §4.4 step 5 says a secondary dispatch returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContributorOutcome {
    pub event: Option<StoryEvent>,
    pub new_triggers: Vec<AgentTrigger>,
}

impl ContributorOutcome {
    pub fn event_only(event: StoryEvent) -> Self {
        Self {
            event: Some(event),
            new_triggers: Vec::new(),
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn with_trigger(mut self, trigger: AgentTrigger) -> Self {
        self.new_triggers.push(trigger);
        self
    }
}

/// Failure from a contributor's dispatch. The coordinator classifies and
/// records these (§7); they never propagate to the driver as a panic or a
/// bare exception.
#[derive(Debug, Error, Clone)]
pub enum ContributorError {
    /// A provider-backed contributor's retry budget was exhausted, or it hit
    /// a non-retryable provider error.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A local, non-provider failure (e.g. a malformed transition reached at
    /// runtime). Recoverable at the turn level: the coordinator rolls back
    /// and surfaces a diagnostic event, the session stays usable.
    #[error("{0}")]
    Failed(String),

    /// A failure that leaves the contributor's view of the world unusable
    /// for any future turn (e.g. `WorldState` pointing at a scene the active
    /// repository no longer has). The coordinator does not roll forward from
    /// this - the session itself must be restored from a snapshot or
    /// restarted.
    #[error("{0}")]
    Fatal(String),

    /// This contributor doesn't implement the dispatch method that was
    /// called (e.g. a secondary-only contributor was asked to act as
    /// primary).
    #[error("contributor does not support this dispatch mode")]
    NotCapable,
}

/// A participant in a turn. Primary or secondary, scripted or model-backed -
/// the coordinator only ever talks to this trait.
#[async_trait]
pub trait Contributor: Send + Sync {
    fn id(&self) -> &ContributorId;

    fn capabilities(&self) -> ContributorCapabilities {
        ContributorCapabilities::default()
    }

    /// Invoked only for the roster's primary contributor, exactly once per
    /// turn, with the `PlayerInput` trigger. Mutates `world` as its
    /// transition dictates. `cancel` is the session's cancellation token -
    /// a contributor that suspends on I/O (a provider call) must honour it
    /// instead of ignoring it or fabricating its own.
    async fn dispatch_primary(
        &mut self,
        _world: &mut WorldState,
        _trigger: &AgentTrigger,
        _cancel: &CancellationToken,
    ) -> Result<StoryEvent, ContributorError> {
        Err(ContributorError::NotCapable)
    }

    /// Invoked for each active secondary contributor, with every trigger
    /// addressed to it this turn (possibly more than one, possibly zero if
    /// only the player-input broadcast applies). Observes the post-primary
    /// `world`; never mutates it. `cancel` is the same token `dispatch_primary`
    /// receives, threaded by the coordinator.
    async fn dispatch_secondary(
        &mut self,
        _world: &WorldState,
        _triggers: &[AgentTrigger],
        _cancel: &CancellationToken,
    ) -> Result<ContributorOutcome, ContributorError> {
        Err(ContributorError::NotCapable)
    }
}
