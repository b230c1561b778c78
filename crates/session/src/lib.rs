//! Wayfarer Session - the composition root. Wires `wayfarer-domain`'s types,
//! `wayfarer-engine-app`'s Scene Repository / Scripted Scene Machine / LLM
//! Contributor / Multi-Agent Coordinator / Session Snapshot, and
//! `wayfarer-engine-adapters`'s provider clients into the single
//! `Session` a driver (CLI, server, test harness) actually holds.
//!
//! Nothing below this crate knows about environment variables, file paths,
//! or HTTP; nothing above it should need to know how a `Coordinator` merges
//! two contributors' output. This is the seam.

pub mod config;
pub mod error;
pub mod session;

pub use config::{ContributorConfig, ProviderKind, SessionConfig};
pub use error::SessionError;
pub use session::Session;
