//! Engine configuration.
//!
//! All tunables live in one serde-friendly struct so a deployment can
//! carry a single JSON file. Every field has a default; an empty `{}`
//! config is valid and yields a passive-mode engine with the built-in
//! safety rules.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::executor::ExecutorConfig;
use crate::features::discretize::{BinConfig, BinConfigError};
use crate::reward::RewardConfig;
use crate::safety::{SafetyConfigError, SafetyRules};

// ============================================================================
// MODE
// ============================================================================

/// Deployment mode. Passive observes and learns without enforcing;
/// enforcing executes the policy's decisions for real.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Passive,
    Enforcing,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Passive => "passive",
            Mode::Enforcing => "enforcing",
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        if constants::is_enforcing_enabled() {
            Mode::Enforcing
        } else {
            Mode::Passive
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    RateOutOfRange { field: &'static str, value: f32 },
    Bins(BinConfigError),
    Safety(SafetyConfigError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "config parse error: {}", e),
            ConfigError::RateOutOfRange { field, value } => {
                write!(f, "config field {} must be in [0, 1], got {}", field, value)
            }
            ConfigError::Bins(e) => write!(f, "config bin error: {}", e),
            ConfigError::Safety(e) => write!(f, "config safety rule error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err)
    }
}

// ============================================================================
// ENGINE CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mode: Mode,
    /// Epsilon: probability of exploring on a known state.
    pub exploration_rate: f32,
    /// Alpha: step size for value updates.
    pub learning_rate: f32,
    /// Starting value for unseen (state, action) pairs.
    pub initial_value: f32,
    /// Score substituted when the classifier fails.
    pub neutral_score: f32,
    /// Requests between checkpoint saves. 0 disables periodic saves.
    pub checkpoint_interval: u64,
    pub checkpoint_path: PathBuf,
    /// Directory for decision JSONL files. None disables the file sink.
    pub decision_log_dir: Option<PathBuf>,
    pub bins: BinConfig,
    pub safety: SafetyRules,
    pub executor: ExecutorConfig,
    pub reward: RewardConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            exploration_rate: constants::get_exploration_rate(),
            learning_rate: constants::get_learning_rate(),
            initial_value: constants::DEFAULT_INITIAL_VALUE,
            neutral_score: constants::DEFAULT_NEUTRAL_SCORE,
            checkpoint_interval: constants::get_checkpoint_interval(),
            checkpoint_path: crate::checkpoint::default_checkpoint_path(),
            decision_log_dir: None,
            bins: BinConfig::default(),
            safety: SafetyRules::default(),
            executor: ExecutorConfig::default(),
            reward: RewardConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file. Missing fields fall back to defaults.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::check_rate("exploration_rate", self.exploration_rate)?;
        Self::check_rate("learning_rate", self.learning_rate)?;
        Self::check_rate("neutral_score", self.neutral_score)?;
        self.bins.validate().map_err(ConfigError::Bins)?;
        // compile rules now so a bad pattern fails at startup
        crate::safety::SafetyLayer::new(&self.safety).map_err(ConfigError::Safety)?;
        Ok(())
    }

    fn check_rate(field: &'static str, value: f32) -> Result<(), ConfigError> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::RateOutOfRange { field, value });
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
