//! Hard-constraint safety layer.
//!
//! An ordered, short-circuiting rule list evaluated before any action is
//! executed. The first matching rule wins and its output is final - the
//! policy's proposal is discarded entirely. This layer never learns and
//! never reads the value table; it is configuration plus request
//! inspection, auditable independently of the learned policy.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::policy::Action;
use crate::request::Request;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Safety rule parameters, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyRules {
    /// Path prefixes that may never be silently dropped. A BLOCK proposal
    /// downgrades to CHALLENGE; nothing here forces a bare ALLOW.
    pub protected_prefixes: Vec<String>,
    /// Source-address patterns for internal ranges; BLOCK downgrades to
    /// CHALLENGE for these callers.
    pub internal_sources: Vec<String>,
    /// Health-check paths that are always allowed unconditionally.
    pub health_checks: Vec<String>,
}

impl Default for SafetyRules {
    fn default() -> Self {
        Self {
            protected_prefixes: vec![
                r"^/admin".to_string(),
                r"^/api/auth".to_string(),
                r"^/metrics".to_string(),
            ],
            internal_sources: vec![
                r"^127\.".to_string(),
                r"^192\.168\.".to_string(),
                r"^10\.".to_string(),
                r"^172\.(1[6-9]|2[0-9]|3[0-1])\.".to_string(),
                r"^::1$".to_string(),
                r"^fe80:".to_string(),
            ],
            health_checks: vec![r"^/health$".to_string(), r"^/ping$".to_string()],
        }
    }
}

/// A pattern failed to compile. Startup-fatal by design.
#[derive(Debug)]
pub struct SafetyConfigError {
    pub pattern: String,
    pub source: regex::Error,
}

impl std::fmt::Display for SafetyConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid safety pattern {:?}: {}", self.pattern, self.source)
    }
}

impl std::error::Error for SafetyConfigError {}

// ============================================================================
// SAFETY LAYER
// ============================================================================

pub struct SafetyLayer {
    protected: Vec<Regex>,
    internal: Vec<Regex>,
    health: Vec<Regex>,
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, SafetyConfigError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|source| SafetyConfigError {
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

impl SafetyLayer {
    pub fn new(rules: &SafetyRules) -> Result<Self, SafetyConfigError> {
        Ok(Self {
            protected: compile_all(&rules.protected_prefixes)?,
            internal: compile_all(&rules.internal_sources)?,
            health: compile_all(&rules.health_checks)?,
        })
    }

    /// Apply the rule list top-down; the first matching rule decides.
    ///
    /// 1. Protected prefix: BLOCK downgrades to CHALLENGE, anything else
    ///    passes through (never silently drop admin traffic, never trust a
    ///    bare allow either).
    /// 2. Internal source AND a BLOCK proposal: downgrade to CHALLENGE.
    ///    An internal source alone matches nothing, so internal traffic
    ///    still reaches the health-check rule.
    /// 3. Health check: forced ALLOW.
    /// 4. No match: the proposal stands.
    pub fn adjust(&self, request: &Request, proposed: Action) -> Action {
        if self.is_protected(&request.path) {
            return if proposed == Action::Block {
                Action::Challenge
            } else {
                proposed
            };
        }
        if self.is_internal(&request.source) && proposed == Action::Block {
            return Action::Challenge;
        }
        if self.is_health_check(&request.path) {
            return Action::Allow;
        }
        proposed
    }

    pub fn is_protected(&self, path: &str) -> bool {
        self.protected.iter().any(|re| re.is_match(path))
    }

    pub fn is_internal(&self, source: &str) -> bool {
        self.internal.iter().any(|re| re.is_match(source))
    }

    pub fn is_health_check(&self, path: &str) -> bool {
        self.health.iter().any(|re| re.is_match(path))
    }
}

// ============================================================================
// TESTS
// ============================================================================
