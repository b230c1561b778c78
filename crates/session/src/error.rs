//! `SessionError` - the one error type the composition root's public surface
//! returns, wrapping each lower layer's own error type by `#[from]`.

use thiserror::Error;
use wayfarer_engine_app::{CoordinatorError, SceneLoadError, SnapshotError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    SceneLoad(#[from] SceneLoadError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("scene repository has no configured or inferable start scene")]
    NoStartScene,

    #[error("start scene `{0}` does not exist in the loaded scene repository")]
    UnknownStartScene(String),

    #[error("invalid contributor id `{0}`: {1}")]
    InvalidContributorId(String, wayfarer_domain::DomainError),
}
