//! Learned enforcement policy.
//!
//! An epsilon-greedy contextual bandit over the discretized state space.
//! Each request is an independent episode: the value update uses only the
//! immediate reward, never a discounted future-value term.
//!
//! ## Structure
//! - `action`: the closed six-way action enumeration
//! - `table`: sharded value table, the only shared mutable hot-path state
//! - `agent`: decide / update / statistics

pub mod action;
pub mod agent;
pub mod table;

pub use action::{Action, ACTION_COUNT};
pub use agent::{AgentStatistics, PolicyAgent};
pub use table::{QEntry, TableSnapshot, ValueTable};
