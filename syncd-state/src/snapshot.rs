//! Bounded history of prior states, used for rollback.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use syncd_core::ProjectState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub checksum: String,
    pub state: ProjectState,
}

impl StateSnapshot {
    pub fn capture(state: &ProjectState, reason: impl Into<String>) -> Self {
        Self {
            version: state.version,
            timestamp: Utc::now(),
            reason: reason.into(),
            checksum: state.checksum.clone(),
            state: state.clone(),
        }
    }
}

/// Oldest-evicted ring of snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    capacity: usize,
    entries: VecDeque<StateSnapshot>,
}

impl SnapshotHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(64)),
        }
    }

    pub fn from_entries(capacity: usize, entries: Vec<StateSnapshot>) -> Self {
        let mut history = Self::new(capacity);
        for snapshot in entries {
            history.push(snapshot);
        }
        history
    }

    pub fn push(&mut self, snapshot: StateSnapshot) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    pub fn find(&self, version: u64) -> Option<&StateSnapshot> {
        self.entries.iter().rev().find(|s| s.version == version)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_vec(&self) -> Vec<StateSnapshot> {
        self.entries.iter().cloned().collect()
    }
}
