//! Attack scoring.
//!
//! The engine treats the classifier as pluggable: anything that maps a
//! request to a score in [0, 1] works. The built-in `HeuristicScorer`
//! runs on the syntactic counts the feature extractor already computes,
//! so scoring adds no extra parsing pass.

use std::sync::Arc;

use crate::features::extract;
use crate::request::Request;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub enum ScorerError {
    /// The scorer backend failed. The engine substitutes the configured
    /// neutral score and continues.
    Backend(String),
    /// The backend produced a score outside [0, 1] or a non-finite value.
    InvalidScore(f32),
}

impl std::fmt::Display for ScorerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScorerError::Backend(msg) => write!(f, "scorer backend error: {}", msg),
            ScorerError::InvalidScore(v) => write!(f, "scorer produced invalid score: {}", v),
        }
    }
}

impl std::error::Error for ScorerError {}

// ============================================================================
// TRAIT
// ============================================================================

/// Maps a request to an attack likelihood in [0, 1].
pub trait AttackScorer: Send + Sync {
    fn score(&self, request: &Request) -> Result<f32, ScorerError>;

    fn name(&self) -> &str {
        "unnamed"
    }
}

impl<T: AttackScorer + ?Sized> AttackScorer for Arc<T> {
    fn score(&self, request: &Request) -> Result<f32, ScorerError> {
        (**self).score(request)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// ============================================================================
// HEURISTIC SCORER
// ============================================================================

/// Rule-based scorer over syntactic request features.
///
/// Each triggered signal contributes a fixed weight; the sum is capped
/// at 1.0. Deliberately coarse, it exists to bootstrap learning before
/// a trained model is available.
#[derive(Debug, Default, Clone)]
pub struct HeuristicScorer;

impl HeuristicScorer {
    pub fn new() -> Self {
        Self
    }
}

impl AttackScorer for HeuristicScorer {
    fn score(&self, request: &Request) -> Result<f32, ScorerError> {
        let syn = extract::analyze(request);

        let mut score = 0.0f32;
        if syn.sql_keyword_count > 0 {
            score += 0.3;
        }
        if syn.quote_count > 2 {
            score += 0.2;
        }
        if syn.comment_pattern_count > 0 {
            score += 0.3;
        }
        if syn.or_and_count > 0 {
            score += 0.2;
        }
        if syn.entropy > 5.0 {
            score += 0.1;
        }
        if syn.encoding_depth > 1 {
            score += 0.2;
        }

        Ok(score.min(1.0))
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_benign_request_scores_low() {
        let req = Request::new("GET", "/products", "203.0.113.9");
        let score = HeuristicScorer::new().score(&req).unwrap();
        assert!(score < 0.3, "benign score was {}", score);
    }

    #[test]
    fn test_sql_injection_scores_high() {
        let req = Request::new("GET", "/search", "203.0.113.9")
            .with_query("q=' OR '1'='1' UNION SELECT password FROM users --");
        let score = HeuristicScorer::new().score(&req).unwrap();
        assert!(score > 0.5, "injection score was {}", score);
    }

    #[test]
    fn test_score_is_capped_at_one() {
        let req = Request::new("POST", "/login", "203.0.113.9")
            .with_body("' OR 1=1 UNION SELECT * FROM users WHERE name='admin'--; DROP TABLE logs; /* %2527%2527 */ '''")
            .with_query("u=%2527%2527&p=%2527");
        let score = HeuristicScorer::new().score(&req).unwrap();
        assert!(score <= 1.0);
        assert!(score >= 0.8, "stacked signals score was {}", score);
    }
}
