//! Reward calculation.
//!
//! Converts (action, attack score, outcome) into the scalar that drives the
//! online learning update. Ground truth is approximated by comparing the
//! attack score against a configured threshold. Pure and deterministic.

use serde::{Deserialize, Serialize};

use crate::executor::Outcome;
use crate::policy::Action;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Reward constants. All configurable; defaults follow the shipped tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardConfig {
    /// Scores above this count as a true attack.
    pub attack_threshold: f32,
    /// Attack correctly blocked/challenged.
    pub attack_blocked: f32,
    /// Benign request correctly allowed.
    pub legitimate_allowed: f32,
    /// Benign request blocked (hurts users the most).
    pub false_positive: f32,
    /// Attack allowed through.
    pub false_negative: f32,
    /// Bonus for handling benign traffic with monitoring/sanitization
    /// instead of blocking.
    pub efficiency_bonus: f32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            attack_threshold: 0.5,
            attack_blocked: 1.0,
            legitimate_allowed: 0.5,
            false_positive: -2.0,
            false_negative: -1.5,
            efficiency_bonus: 0.2,
        }
    }
}

// ============================================================================
// CALCULATOR
// ============================================================================

/// Intermediate action scaling, relative to the full block/allow rewards.
/// SANITIZE partially stops an attack (0.7) and mildly risks breaking a
/// benign request (0.8); THROTTLE slows an attack without stopping it (0.5)
/// and annoys a benign user (0.6).
const SANITIZE_ATTACK_FACTOR: f32 = 0.7;
const SANITIZE_BENIGN_FACTOR: f32 = 0.8;
const THROTTLE_ATTACK_FACTOR: f32 = 0.5;
const THROTTLE_BENIGN_FACTOR: f32 = 0.6;

#[derive(Debug, Clone)]
pub struct RewardCalculator {
    config: RewardConfig,
}

impl RewardCalculator {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Score a decision.
    ///
    /// The engine passes the *proposed* action here so the policy is
    /// credited for what it would have done, independent of safety or mode
    /// overrides. An executor failure means the request effectively went
    /// through, so the action is scored as ALLOW regardless of intent.
    pub fn reward(&self, action: Action, attack_score: f32, outcome: &Outcome) -> f32 {
        let is_attack = attack_score > self.config.attack_threshold;
        let effective = if matches!(outcome, Outcome::Failed { .. }) {
            Action::Allow
        } else {
            action
        };

        let mut reward = match effective {
            Action::Block | Action::Challenge => {
                if is_attack {
                    self.config.attack_blocked
                } else {
                    self.config.false_positive
                }
            }
            Action::Allow | Action::LogOnly => {
                if is_attack {
                    self.config.false_negative
                } else {
                    self.config.legitimate_allowed
                }
            }
            Action::Sanitize => {
                if is_attack {
                    self.config.attack_blocked * SANITIZE_ATTACK_FACTOR
                } else {
                    self.config.legitimate_allowed * SANITIZE_BENIGN_FACTOR
                }
            }
            Action::Throttle => {
                if is_attack {
                    self.config.attack_blocked * THROTTLE_ATTACK_FACTOR
                } else {
                    self.config.legitimate_allowed * THROTTLE_BENIGN_FACTOR
                }
            }
        };

        if !is_attack && matches!(effective, Action::LogOnly | Action::Sanitize) {
            reward += self.config.efficiency_bonus;
        }

        reward
    }
}

impl Default for RewardCalculator {
    fn default() -> Self {
        Self::new(RewardConfig::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
