//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! To change a default learning rate or checkpoint cadence, only edit
//! this file.

/// Default exploration rate (epsilon)
pub const DEFAULT_EXPLORATION_RATE: f32 = 0.1;

/// Default learning rate (alpha)
pub const DEFAULT_LEARNING_RATE: f32 = 0.1;

/// Default initial value for unseen (state, action) pairs
pub const DEFAULT_INITIAL_VALUE: f32 = 0.0;

/// Default attack score substituted when the classifier fails
pub const DEFAULT_NEUTRAL_SCORE: f32 = 0.5;

/// Default number of requests between checkpoint saves
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 100;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "adaptive-waf-core";

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Get exploration rate from environment or use default
pub fn get_exploration_rate() -> f32 {
    std::env::var("WAF_EXPLORATION_RATE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_EXPLORATION_RATE)
}

/// Get learning rate from environment or use default
pub fn get_learning_rate() -> f32 {
    std::env::var("WAF_LEARNING_RATE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_LEARNING_RATE)
}

/// Get checkpoint interval from environment or use default
pub fn get_checkpoint_interval() -> u64 {
    std::env::var("WAF_CHECKPOINT_INTERVAL")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_CHECKPOINT_INTERVAL)
}

/// Check if the engine starts in enforcing mode
pub fn is_enforcing_enabled() -> bool {
    std::env::var("WAF_ENFORCING")
        .map(|s| s.to_lowercase() == "true" || s == "1")
        .unwrap_or(false)
}
