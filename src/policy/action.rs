//! Enforcement actions.

use serde::{Deserialize, Serialize};

/// Number of actions. Must match `Action::ALL.len()`.
pub const ACTION_COUNT: usize = 6;

/// What the WAF can do with a request.
///
/// Variants are ordered by increasing intrusiveness; ties in the policy's
/// value estimates break toward the least intrusive action, biasing toward
/// availability over aggressiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Forward request unchanged.
    Allow,
    /// Forward unchanged, mark for logging.
    LogOnly,
    /// Strip high-risk tokens, then forward.
    Sanitize,
    /// Withhold forwarding, answer with a verification prompt.
    Challenge,
    /// Forward after a fixed delay.
    Throttle,
    /// Do not forward, answer with a rejection status.
    Block,
}

impl Action {
    /// All actions in intrusiveness order.
    pub const ALL: [Action; ACTION_COUNT] = [
        Action::Allow,
        Action::LogOnly,
        Action::Sanitize,
        Action::Challenge,
        Action::Throttle,
        Action::Block,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::LogOnly => "log_only",
            Action::Sanitize => "sanitize",
            Action::Challenge => "challenge",
            Action::Throttle => "throttle",
            Action::Block => "block",
        }
    }

    /// Position in the intrusiveness ordering, also the value-table slot.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<Action> {
        Action::ALL.get(index).copied()
    }

    pub fn from_str(s: &str) -> Option<Action> {
        Action::ALL.iter().copied().find(|a| a.as_str() == s)
    }

    /// Restrictive actions withhold or reject the request.
    pub fn is_restrictive(&self) -> bool {
        matches!(self, Action::Challenge | Action::Block)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_by_intrusiveness() {
        assert!(Action::Allow < Action::LogOnly);
        assert!(Action::Challenge < Action::Block);
        for (i, a) in Action::ALL.iter().enumerate() {
            assert_eq!(a.index(), i);
            assert_eq!(Action::from_index(i), Some(*a));
        }
    }

    #[test]
    fn test_round_trip_names() {
        for a in Action::ALL {
            assert_eq!(Action::from_str(a.as_str()), Some(a));
        }
        assert_eq!(Action::from_str("nuke"), None);
    }

    #[test]
    fn test_serde_snake_case() {
        assert_eq!(serde_json::to_string(&Action::LogOnly).unwrap(), "\"log_only\"");
        let back: Action = serde_json::from_str("\"block\"").unwrap();
        assert_eq!(back, Action::Block);
    }
}
