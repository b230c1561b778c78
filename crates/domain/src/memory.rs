//! `MemoryLog` - a bounded FIFO of tagged entries, and the slicing contract
//! (`MemoryRequest`) contributors use to pull a window of it for prompt
//! assembly.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two kinds of entry the engine ever appends: the player's (or a
/// contributor's) action, and the narration that resulted from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Action,
    Observation,
}

/// A single entry in the rolling memory log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub kind: MemoryKind,
    pub content: String,
    pub tags: HashSet<String>,
    pub timestamp: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn new(
        kind: MemoryKind,
        content: impl Into<String>,
        tags: impl IntoIterator<Item = String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            content: content.into(),
            tags: tags.into_iter().collect(),
            timestamp,
        }
    }
}

/// The slicing contract a contributor uses to pull a bounded window of the
/// log for prompt assembly. `tag_filter` is an intersection filter: when
/// non-empty, only entries carrying at least one of the listed tags survive
/// the slice (applied before the per-kind limit).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryRequest {
    pub action_limit: usize,
    pub observation_limit: usize,
    pub tag_filter: Vec<String>,
}

impl MemoryRequest {
    /// The LLM Contributor's documented defaults: last 8 actions, last 8
    /// observations, no tag filter.
    pub fn default_window() -> Self {
        Self {
            action_limit: 8,
            observation_limit: 8,
            tag_filter: Vec::new(),
        }
    }
}

/// A slice returned from `MemoryLog::query`, newest-last within each kind
/// (matching the log's own insertion order).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySlice {
    pub actions: Vec<MemoryEntry>,
    pub observations: Vec<MemoryEntry>,
}

/// A bounded, append-only-until-capacity FIFO of memory entries. Oldest
/// entries are evicted once `capacity` is exceeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryLog {
    capacity: usize,
    entries: VecDeque<MemoryEntry>,
}

impl MemoryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry, evicting the oldest if at capacity.
    pub fn append(&mut self, entry: MemoryEntry) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Returns the last `n` entries of `kind`, oldest-first (i.e. in the
    /// order they'd be replayed), matching insertion order.
    pub fn last_n(&self, kind: MemoryKind, n: usize) -> Vec<MemoryEntry> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.kind == kind)
            .take(n)
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect()
    }

    /// Entries carrying `tag`, in insertion order.
    pub fn filter_by_tag(&self, tag: &str) -> Vec<MemoryEntry> {
        self.entries
            .iter()
            .filter(|e| e.tags.contains(tag))
            .cloned()
            .collect()
    }

    /// Slice the log per a `MemoryRequest`, for prompt assembly.
    pub fn query(&self, request: &MemoryRequest) -> MemorySlice {
        let passes_tag_filter = |entry: &MemoryEntry| {
            request.tag_filter.is_empty()
                || request.tag_filter.iter().any(|t| entry.tags.contains(t))
        };

        let filtered: Vec<&MemoryEntry> = self.entries.iter().filter(|e| passes_tag_filter(e)).collect();

        let take_last = |kind: MemoryKind, limit: usize| -> Vec<MemoryEntry> {
            filtered
                .iter()
                .rev()
                .filter(|e| e.kind == kind)
                .take(limit)
                .map(|e| (*e).clone())
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect()
        };

        MemorySlice {
            actions: take_last(MemoryKind::Action, request.action_limit),
            observations: take_last(MemoryKind::Observation, request.observation_limit),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.iter()
    }
}
