//! Feature discretization into a bounded categorical state space.
//!
//! Each feature slot is bucketed against a fixed, startup-validated boundary
//! list; the state key is the concatenation of bin indices. The function is
//! total: every valid feature vector maps to exactly one state, which bounds
//! the value-table size.

use serde::{Deserialize, Serialize};

use super::layout::FEATURE_COUNT;
use super::vector::FeatureVector;

/// Per-feature bins can never exceed this (keeps state keys single-digit).
pub const MAX_BINS_PER_FEATURE: usize = 9;

// ============================================================================
// STATE
// ============================================================================

/// Discrete bucket key summarizing a request's feature vector.
///
/// Two requests whose features fall in the same bins map to the same state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(String);

impl State {
    /// Build from raw bin indices. Used by tests and checkpoint restore.
    pub fn from_bins(bins: &[u8]) -> Self {
        let mut key = String::with_capacity(bins.len());
        for &b in bins {
            key.push(char::from(b'0' + b.min(9)));
        }
        State(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// BIN CONFIGURATION
// ============================================================================

/// Bin boundaries per feature, in layout order. A value lands in bin `k`
/// where `k` is the number of boundaries it exceeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinConfig {
    pub boundaries: Vec<Vec<f32>>,
}

impl Default for BinConfig {
    fn default() -> Self {
        Self {
            boundaries: vec![
                vec![0.3, 0.7],    // attack_score
                vec![0.5, 2.5],    // sql_keyword_count
                vec![0.5, 2.5],    // quote_count
                vec![0.5, 1.5],    // semicolon_count
                vec![0.5, 1.5],    // comment_pattern_count
                vec![0.5, 1.5],    // or_and_count
                vec![0.1, 0.25],   // special_char_ratio
                vec![3.0, 4.5],    // entropy
                vec![0.5, 1.5],    // encoding_depth
                vec![2.5, 4.5],    // path_depth
                vec![64.0, 512.0], // payload_length
                vec![0.5],         // method_is_post
            ],
        }
    }
}

/// Invalid bin configuration. Startup-fatal: once the loop is live the
/// discretizer is total by construction.
#[derive(Debug)]
pub enum BinConfigError {
    WrongFeatureCount { expected: usize, actual: usize },
    TooManyBins { feature: usize, bins: usize },
    Unsorted { feature: usize },
    NotFinite { feature: usize },
}

impl std::fmt::Display for BinConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinConfigError::WrongFeatureCount { expected, actual } => {
                write!(f, "bin config covers {} features, layout has {}", actual, expected)
            }
            BinConfigError::TooManyBins { feature, bins } => {
                write!(f, "feature {} has {} bins (max {})", feature, bins, MAX_BINS_PER_FEATURE)
            }
            BinConfigError::Unsorted { feature } => {
                write!(f, "boundaries for feature {} are not strictly ascending", feature)
            }
            BinConfigError::NotFinite { feature } => {
                write!(f, "boundaries for feature {} contain non-finite values", feature)
            }
        }
    }
}

impl std::error::Error for BinConfigError {}

impl BinConfig {
    pub fn validate(&self) -> Result<(), BinConfigError> {
        if self.boundaries.len() != FEATURE_COUNT {
            return Err(BinConfigError::WrongFeatureCount {
                expected: FEATURE_COUNT,
                actual: self.boundaries.len(),
            });
        }
        for (i, bounds) in self.boundaries.iter().enumerate() {
            if bounds.len() + 1 > MAX_BINS_PER_FEATURE {
                return Err(BinConfigError::TooManyBins {
                    feature: i,
                    bins: bounds.len() + 1,
                });
            }
            if bounds.iter().any(|b| !b.is_finite()) {
                return Err(BinConfigError::NotFinite { feature: i });
            }
            if bounds.windows(2).any(|w| w[0] >= w[1]) {
                return Err(BinConfigError::Unsorted { feature: i });
            }
        }
        Ok(())
    }
}

// ============================================================================
// DISCRETIZER
// ============================================================================

/// Total, deterministic FeatureVector -> State mapping.
#[derive(Debug, Clone)]
pub struct Discretizer {
    bins: BinConfig,
}

impl Discretizer {
    pub fn new(bins: BinConfig) -> Result<Self, BinConfigError> {
        bins.validate()?;
        Ok(Self { bins })
    }

    pub fn discretize(&self, vector: &FeatureVector) -> State {
        let mut key = String::with_capacity(FEATURE_COUNT);
        for (value, bounds) in vector.values.iter().zip(self.bins.boundaries.iter()) {
            // NaN compares false against every boundary and lands in bin 0.
            let bin = bounds.iter().filter(|&&b| *value > b).count() as u8;
            key.push(char::from(b'0' + bin));
        }
        State(key)
    }
}

impl Default for Discretizer {
    fn default() -> Self {
        Self {
            bins: BinConfig::default(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::extract::build;
    use crate::request::Request;

    #[test]
    fn test_discretize_deterministic() {
        let d = Discretizer::default();
        let req = Request::new("GET", "/login", "1.2.3.4").with_query("id=1' OR 1=1");
        let fv = build(&req, 0.85);
        assert_eq!(d.discretize(&fv), d.discretize(&fv));
    }

    #[test]
    fn test_same_bins_same_state() {
        let d = Discretizer::default();
        let a = build(&Request::new("GET", "/api/user", "1.1.1.1").with_query("id=1"), 0.0);
        let b = build(&Request::new("GET", "/api/item", "2.2.2.2").with_query("id=9"), 0.0);
        assert_eq!(d.discretize(&a), d.discretize(&b));
    }

    #[test]
    fn test_state_key_length_matches_layout() {
        let d = Discretizer::default();
        let fv = build(&Request::new("GET", "/x", "1.1.1.1"), 0.5);
        assert_eq!(d.discretize(&fv).as_str().len(), crate::features::FEATURE_COUNT);
    }

    #[test]
    fn test_boundary_semantics() {
        // value must exceed the boundary to move up a bin
        let d = Discretizer::default();
        let mut fv = crate::features::FeatureVector::new();
        fv.set_by_name("attack_score", 0.3);
        let low = d.discretize(&fv);
        fv.set_by_name("attack_score", 0.31);
        let mid = d.discretize(&fv);
        assert_ne!(low, mid);
        assert_eq!(low.as_str().as_bytes()[0], b'0');
        assert_eq!(mid.as_str().as_bytes()[0], b'1');
    }

    #[test]
    fn test_nan_is_total() {
        let d = Discretizer::default();
        let mut fv = crate::features::FeatureVector::new();
        fv.set_by_name("entropy", f32::NAN);
        // still produces a state, NaN lands in bin 0
        let state = d.discretize(&fv);
        assert_eq!(state.as_str().len(), crate::features::FEATURE_COUNT);
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        let mut cfg = BinConfig::default();
        cfg.boundaries[0] = vec![0.7, 0.3];
        assert!(matches!(cfg.validate(), Err(BinConfigError::Unsorted { feature: 0 })));

        let mut cfg = BinConfig::default();
        cfg.boundaries.pop();
        assert!(matches!(
            cfg.validate(),
            Err(BinConfigError::WrongFeatureCount { .. })
        ));

        let mut cfg = BinConfig::default();
        cfg.boundaries[3] = vec![f32::NAN];
        assert!(matches!(cfg.validate(), Err(BinConfigError::NotFinite { feature: 3 })));
    }
}
