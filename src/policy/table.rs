//! Sharded value table.
//!
//! Maps (State, Action) to a running value estimate plus an update count.
//! Entries are created lazily on first visit and never removed. The table is
//! sharded so reads and writes for different states proceed in parallel; the
//! read-modify-write for one entry is serialized by its shard's write lock.
//! Snapshots clone shard by shard and never hold a global lock.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::action::{Action, ACTION_COUNT};
use crate::features::State;

const SHARD_COUNT: usize = 16;

/// One (State, Action) estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QEntry {
    pub value: f32,
    pub updates: u64,
}

type StateRow = [QEntry; ACTION_COUNT];

/// Point-in-time copy of the table, used for checkpointing and inspection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub state: State,
    pub action: Action,
    pub value: f32,
    pub updates: u64,
}

pub struct ValueTable {
    shards: Vec<RwLock<HashMap<State, StateRow>>>,
    initial_value: f32,
}

impl ValueTable {
    pub fn new(initial_value: f32) -> Self {
        Self {
            shards: (0..SHARD_COUNT)
                .map(|_| RwLock::new(HashMap::new()))
                .collect(),
            initial_value,
        }
    }

    fn shard_for(&self, state: &State) -> &RwLock<HashMap<State, StateRow>> {
        let mut hasher = DefaultHasher::new();
        state.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }

    fn fresh_row(&self) -> StateRow {
        [QEntry {
            value: self.initial_value,
            updates: 0,
        }; ACTION_COUNT]
    }

    /// Values for every action in a state, or None if the state is unseen.
    pub fn row(&self, state: &State) -> Option<[f32; ACTION_COUNT]> {
        let shard = self.shard_for(state).read();
        shard.get(state).map(|row| {
            let mut out = [0.0; ACTION_COUNT];
            for (i, entry) in row.iter().enumerate() {
                out[i] = entry.value;
            }
            out
        })
    }

    /// Value for a single entry, or None if the state is unseen.
    pub fn value(&self, state: &State, action: Action) -> Option<f32> {
        let shard = self.shard_for(state).read();
        shard.get(state).map(|row| row[action.index()].value)
    }

    /// Apply `q <- q + alpha * (reward - q)` to one entry, creating the
    /// state row lazily. The shard write lock serializes the
    /// read-modify-write for this entry.
    pub fn apply_update(&self, state: &State, action: Action, learning_rate: f32, reward: f32) {
        let mut shard = self.shard_for(state).write();
        let row = shard
            .entry(state.clone())
            .or_insert_with(|| self.fresh_row());
        let entry = &mut row[action.index()];
        entry.value += learning_rate * (reward - entry.value);
        entry.updates += 1;
    }

    /// Number of distinct states with at least one entry.
    pub fn state_count(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    /// Clone the table shard by shard. Decision processing keeps running on
    /// the shards not currently being copied.
    pub fn snapshot(&self) -> TableSnapshot {
        let mut entries = Vec::new();
        for shard in &self.shards {
            let guard = shard.read();
            for (state, row) in guard.iter() {
                for (action, entry) in Action::ALL.iter().zip(row.iter()) {
                    entries.push(SnapshotEntry {
                        state: state.clone(),
                        action: *action,
                        value: entry.value,
                        updates: entry.updates,
                    });
                }
            }
        }
        TableSnapshot { entries }
    }

    /// Replace table contents from a snapshot (startup restore).
    pub fn restore(&self, snapshot: &TableSnapshot) {
        for entry in &snapshot.entries {
            let mut shard = self.shard_for(&entry.state).write();
            let row = shard
                .entry(entry.state.clone())
                .or_insert_with(|| self.fresh_row());
            row[entry.action.index()] = QEntry {
                value: entry.value,
                updates: entry.updates,
            };
        }
    }
}
