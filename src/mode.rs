//! Enforcement mode controller.
//!
//! A per-engine toggle between passive observation and active enforcement.
//! Set at startup, flipped only by explicit operator action, read on every
//! request as a single atomic flag. In passive mode the executed action is
//! always LOG_ONLY; the safety-adjusted action still lands in the decision
//! record so the policy keeps learning from what it would have done.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Mode;
use crate::policy::Action;

pub struct ModeController {
    enforcing: AtomicBool,
}

impl ModeController {
    pub fn new(mode: Mode) -> Self {
        Self {
            enforcing: AtomicBool::new(mode == Mode::Enforcing),
        }
    }

    pub fn mode(&self) -> Mode {
        if self.enforcing.load(Ordering::Relaxed) {
            Mode::Enforcing
        } else {
            Mode::Passive
        }
    }

    pub fn is_enforcing(&self) -> bool {
        self.enforcing.load(Ordering::Relaxed)
    }

    /// Operator toggle; never flipped by the learning loop.
    pub fn set_enforcing(&self, enforcing: bool) {
        self.enforcing.store(enforcing, Ordering::Relaxed);
    }

    /// Downgrade the effective action when passive.
    pub fn apply(&self, action: Action) -> Action {
        if self.is_enforcing() {
            action
        } else {
            Action::LogOnly
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passive_forces_log_only() {
        let mode = ModeController::new(Mode::Passive);
        for action in Action::ALL {
            assert_eq!(mode.apply(action), Action::LogOnly);
        }
    }

    #[test]
    fn test_enforcing_passes_through() {
        let mode = ModeController::new(Mode::Enforcing);
        for action in Action::ALL {
            assert_eq!(mode.apply(action), action);
        }
    }

    #[test]
    fn test_operator_toggle() {
        let mode = ModeController::new(Mode::Passive);
        assert_eq!(mode.mode(), Mode::Passive);
        mode.set_enforcing(true);
        assert_eq!(mode.mode(), Mode::Enforcing);
        assert_eq!(mode.apply(Action::Block), Action::Block);
    }
}
