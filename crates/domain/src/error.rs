//! Unified error type for the domain layer.
//!
//! Mirrors the rest of the stack: a single `thiserror` enum per layer rather
//! than forcing callers to thread `String`/`anyhow::Error` through pure
//! domain operations.

use thiserror::Error;

/// Errors raised by domain-layer operations (id validation, WorldState
/// mutation, MemoryLog bookkeeping).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A validated identifier failed its shape check.
    #[error("invalid id: {0}")]
    InvalidId(String),

    /// An operation referenced a scene/item that isn't known in the current
    /// context (e.g. a snapshot naming a scene id the active repository
    /// doesn't have).
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// A value failed validation (non-empty string required, etc).
    #[error("validation failed: {0}")]
    Validation(String),
}

impl DomainError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_stable() {
        assert_eq!(
            DomainError::invalid_id("bad").to_string(),
            "invalid id: bad"
        );
        assert_eq!(
            DomainError::not_found("Scene", "gate").to_string(),
            "Scene not found: gate"
        );
    }
}
