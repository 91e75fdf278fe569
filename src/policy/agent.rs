//! Epsilon-greedy policy agent.
//!
//! Owns the value table exclusively. `decide` explores with the configured
//! probability and otherwise exploits the best-known action; `update` is the
//! sole mutator of the table. Statistics are plain atomic reads and never
//! block decision-making.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::action::{Action, ACTION_COUNT};
use super::table::{TableSnapshot, ValueTable};
use crate::features::State;

/// Counters carried across restarts alongside the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCounters {
    pub total_updates: u64,
    pub total_decisions: u64,
    pub exploration_count: u64,
}

/// Read-only view for the statistics surface.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AgentStatistics {
    pub total_updates: u64,
    pub total_decisions: u64,
    pub exploration_count: u64,
    pub exploration_ratio: f64,
    pub table_size: usize,
    pub exploration_rate: f32,
    pub learning_rate: f32,
}

pub struct PolicyAgent {
    table: ValueTable,
    /// f32 bits; stored atomically so the operator can retune it live.
    exploration_rate: AtomicU32,
    learning_rate: f32,
    total_decisions: AtomicU64,
    exploration_count: AtomicU64,
    total_updates: AtomicU64,
}

impl PolicyAgent {
    pub fn new(exploration_rate: f32, learning_rate: f32, initial_value: f32) -> Self {
        Self {
            table: ValueTable::new(initial_value),
            exploration_rate: AtomicU32::new(exploration_rate.clamp(0.0, 1.0).to_bits()),
            learning_rate,
            total_decisions: AtomicU64::new(0),
            exploration_count: AtomicU64::new(0),
            total_updates: AtomicU64::new(0),
        }
    }

    pub fn exploration_rate(&self) -> f32 {
        f32::from_bits(self.exploration_rate.load(Ordering::Relaxed))
    }

    /// Operator control; clamped to [0,1].
    pub fn set_exploration_rate(&self, rate: f32) {
        self.exploration_rate
            .store(rate.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Select an action for the given state.
    ///
    /// Unseen states carry identical neutral values for every action, so the
    /// first visit draws uniformly regardless of the exploration rate. Seen
    /// states explore with the configured probability and otherwise take the
    /// highest-valued action, ties breaking toward the least intrusive one.
    pub fn decide(&self, state: &State) -> Action {
        self.decide_with_rng(state, &mut rand::thread_rng())
    }

    pub fn decide_with_rng<R: Rng>(&self, state: &State, rng: &mut R) -> Action {
        self.total_decisions.fetch_add(1, Ordering::Relaxed);

        let row = match self.table.row(state) {
            Some(row) if rng.gen::<f32>() >= self.exploration_rate() => row,
            _ => {
                self.exploration_count.fetch_add(1, Ordering::Relaxed);
                return Action::ALL[rng.gen_range(0..ACTION_COUNT)];
            }
        };

        let mut best = Action::Allow;
        let mut best_value = f32::NEG_INFINITY;
        for action in Action::ALL {
            let value = row[action.index()];
            // strict comparison: ties keep the earlier (less intrusive) action
            if value > best_value {
                best = action;
                best_value = value;
            }
        }
        best
    }

    /// Single-step bandit update: `q <- q + alpha * (reward - q)`.
    ///
    /// Sole mutator of the value table; per-entry serialization happens in
    /// the table's shard locking.
    pub fn update(&self, state: &State, action: Action, reward: f32) {
        self.table
            .apply_update(state, action, self.learning_rate, reward);
        self.total_updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Direct value lookup for operational inspection.
    pub fn q_value(&self, state: &State, action: Action) -> Option<f32> {
        self.table.value(state, action)
    }

    /// Aggregates may trail in-flight decisions by a few counts.
    pub fn statistics(&self) -> AgentStatistics {
        let decisions = self.total_decisions.load(Ordering::Relaxed);
        let explorations = self.exploration_count.load(Ordering::Relaxed);
        AgentStatistics {
            total_updates: self.total_updates.load(Ordering::Relaxed),
            total_decisions: decisions,
            exploration_count: explorations,
            exploration_ratio: if decisions > 0 {
                explorations as f64 / decisions as f64
            } else {
                0.0
            },
            table_size: self.table.state_count(),
            exploration_rate: self.exploration_rate(),
            learning_rate: self.learning_rate,
        }
    }

    pub fn counters(&self) -> AgentCounters {
        AgentCounters {
            total_updates: self.total_updates.load(Ordering::Relaxed),
            total_decisions: self.total_decisions.load(Ordering::Relaxed),
            exploration_count: self.exploration_count.load(Ordering::Relaxed),
        }
    }

    pub fn table_snapshot(&self) -> TableSnapshot {
        self.table.snapshot()
    }

    /// Seed table and counters from a loaded checkpoint.
    pub fn restore(&self, snapshot: &TableSnapshot, counters: AgentCounters) {
        self.table.restore(snapshot);
        self.total_updates
            .store(counters.total_updates, Ordering::Relaxed);
        self.total_decisions
            .store(counters.total_decisions, Ordering::Relaxed);
        self.exploration_count
            .store(counters.exploration_count, Ordering::Relaxed);
    }
}

// ============================================================================
// TESTS
// ============================================================================
