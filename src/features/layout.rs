//! Feature layout - centralized feature definition.
//!
//! ## Rules (NEVER break these):
//! 1. Add feature -> increment FEATURE_VERSION
//! 2. Change order -> increment FEATURE_VERSION
//! 3. Remove feature -> increment FEATURE_VERSION
//!
//! The layout hash ties checkpoints and decision records to the schema they
//! were produced under; a mismatch refuses to load rather than corrupting
//! learned state.

use crc32fast::Hasher;
use once_cell::sync::Lazy;

/// Current feature layout version.
/// MUST be incremented when the layout changes.
pub const FEATURE_VERSION: u8 = 1;

/// Feature names in the exact order they appear in the vector.
/// This is the single source of truth for the feature layout.
pub const FEATURE_LAYOUT: &[&str] = &[
    // === Classifier (0) ===
    "attack_score",          // 0: offline classifier score in [0,1]
    // === SQL injection indicators (1-5) ===
    "sql_keyword_count",     // 1: SQL/script keywords after decoding
    "quote_count",           // 2: single + double quotes
    "semicolon_count",       // 3: statement separators
    "comment_pattern_count", // 4: --, /*, */, #
    "or_and_count",          // 5: " or " / " and " occurrences
    // === Statistical (6-8) ===
    "special_char_ratio",    // 6: non-alphanumeric, non-space ratio
    "entropy",               // 7: Shannon entropy of the combined text
    "encoding_depth",        // 8: nested percent-encoding layers
    // === Shape (9-11) ===
    "path_depth",            // 9: path segment count
    "payload_length",        // 10: combined text length
    "method_is_post",        // 11: 1.0 for POST, else 0.0
];

/// Total number of features.
/// IMPORTANT: must match FEATURE_LAYOUT.len()!
pub const FEATURE_COUNT: usize = 12;

/// Index of a feature by name.
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_LAYOUT.iter().position(|&n| n == name)
}

static LAYOUT_HASH: Lazy<u32> = Lazy::new(|| {
    let mut hasher = Hasher::new();
    hasher.update(&[FEATURE_VERSION]);
    for name in FEATURE_LAYOUT {
        hasher.update(name.as_bytes());
        hasher.update(&[0]); // separator
    }
    hasher.finalize()
});

/// CRC32 hash of the layout, used to detect mismatches at load time.
pub fn layout_hash() -> u32 {
    *LAYOUT_HASH
}

/// Layout incompatibility between stored data and the running engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutMismatchError {
    pub expected_version: u8,
    pub expected_hash: u32,
    pub actual_version: u8,
    pub actual_hash: u32,
}

impl std::fmt::Display for LayoutMismatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "feature layout mismatch: expected v{} ({:08x}), got v{} ({:08x})",
            self.expected_version, self.expected_hash, self.actual_version, self.actual_hash
        )
    }
}

impl std::error::Error for LayoutMismatchError {}

/// Validate a stored (version, hash) pair against the running layout.
pub fn validate_layout(version: u8, hash: u32) -> Result<(), LayoutMismatchError> {
    if version == FEATURE_VERSION && hash == layout_hash() {
        Ok(())
    } else {
        Err(LayoutMismatchError {
            expected_version: FEATURE_VERSION,
            expected_hash: layout_hash(),
            actual_version: version,
            actual_hash: hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_count_matches() {
        assert_eq!(FEATURE_LAYOUT.len(), FEATURE_COUNT);
    }

    #[test]
    fn test_layout_hash_stable() {
        assert_eq!(layout_hash(), layout_hash());
    }

    #[test]
    fn test_validate_layout_rejects_wrong_version() {
        assert!(validate_layout(FEATURE_VERSION, layout_hash()).is_ok());
        let err = validate_layout(FEATURE_VERSION + 1, layout_hash()).unwrap_err();
        assert_eq!(err.actual_version, FEATURE_VERSION + 1);
        assert!(validate_layout(FEATURE_VERSION, layout_hash() ^ 1).is_err());
    }

    #[test]
    fn test_feature_index() {
        assert_eq!(feature_index("attack_score"), Some(0));
        assert_eq!(feature_index("method_is_post"), Some(FEATURE_COUNT - 1));
        assert_eq!(feature_index("nonexistent"), None);
    }
}
