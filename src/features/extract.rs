//! Feature extraction from parsed requests.
//!
//! All text (path, query, body, a short list of high-risk headers) is
//! recursively percent-decoded and analyzed for SQL-injection indicators and
//! statistical properties. Extraction is pure and never aborts the pipeline:
//! a structurally empty request yields zeroed syntactic features plus the
//! supplied attack score.

use super::layout::FEATURE_COUNT;
use super::vector::FeatureVector;
use crate::request::Request;

/// Keywords commonly seen in injection payloads, matched on word boundaries
/// after decoding.
pub const SQL_KEYWORDS: &[&str] = &[
    "select", "union", "insert", "update", "delete", "drop", "create", "alter", "exec",
    "execute", "script", "javascript", "onerror", "onload", "alert", "prompt", "confirm",
    "eval", "expression",
];

/// SQL comment markers.
pub const SQL_COMMENTS: &[&str] = &["--", "/*", "*/", "#"];

/// Headers worth analyzing for injected content.
const RISKY_HEADERS: &[&str] = &["Cookie", "User-Agent", "Referer"];

/// Decoding depth cap; deeper nesting is treated as already decoded.
const MAX_DECODE_DEPTH: usize = 10;

// ============================================================================
// SYNTACTIC FEATURES
// ============================================================================

/// Raw syntactic counts shared by the feature builder and the heuristic
/// scorer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Syntactic {
    pub sql_keyword_count: u32,
    pub quote_count: u32,
    pub semicolon_count: u32,
    pub comment_pattern_count: u32,
    pub or_and_count: u32,
    pub special_char_ratio: f32,
    pub entropy: f32,
    pub encoding_depth: u32,
    pub payload_length: u32,
}

/// Analyze the combined decoded text of a request.
pub fn analyze(request: &Request) -> Syntactic {
    let combined = combined_text(request);
    if combined.is_empty() {
        return Syntactic::default();
    }

    let (decoded, depth) = decode_fully(&combined);
    let lower = decoded.to_lowercase();

    Syntactic {
        sql_keyword_count: count_sql_keywords(&lower),
        quote_count: count_char(&decoded, '\'') + count_char(&decoded, '"'),
        semicolon_count: count_char(&decoded, ';'),
        comment_pattern_count: SQL_COMMENTS
            .iter()
            .map(|p| decoded.matches(p).count() as u32)
            .sum(),
        or_and_count: (lower.matches(" or ").count() + lower.matches(" and ").count()) as u32,
        special_char_ratio: special_char_ratio(&decoded),
        entropy: shannon_entropy(&decoded),
        encoding_depth: depth as u32,
        payload_length: decoded.chars().count() as u32,
    }
}

/// Build the full feature vector for a request and its attack score.
///
/// The score is clamped to [0,1]; everything else is derived from the
/// request itself.
pub fn build(request: &Request, attack_score: f32) -> FeatureVector {
    let syn = analyze(request);
    let mut values = [0.0f32; FEATURE_COUNT];
    values[0] = attack_score.clamp(0.0, 1.0);
    values[1] = syn.sql_keyword_count as f32;
    values[2] = syn.quote_count as f32;
    values[3] = syn.semicolon_count as f32;
    values[4] = syn.comment_pattern_count as f32;
    values[5] = syn.or_and_count as f32;
    values[6] = syn.special_char_ratio;
    values[7] = syn.entropy;
    values[8] = syn.encoding_depth as f32;
    values[9] = path_depth(&request.path) as f32;
    values[10] = syn.payload_length as f32;
    values[11] = if request.method.eq_ignore_ascii_case("POST") {
        1.0
    } else {
        0.0
    };
    FeatureVector::from_values(values)
}

// ============================================================================
// TEXT HELPERS
// ============================================================================

fn combined_text(request: &Request) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if !request.path.is_empty() {
        parts.push(&request.path);
    }
    if let Some(q) = request.query.as_deref() {
        if !q.is_empty() {
            parts.push(q);
        }
    }
    if let Some(b) = request.body.as_deref() {
        if !b.trim().is_empty() {
            parts.push(b);
        }
    }
    let mut combined = parts.join(" ");
    for name in RISKY_HEADERS {
        if let Some(value) = request.headers.get(name) {
            if !value.is_empty() {
                combined.push(' ');
                combined.push_str(value);
            }
        }
    }
    combined
}

/// One pass of application/x-www-form-urlencoded decoding.
fn decode_once(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                    (Some(h), Some(l)) => {
                        out.push(h * 16 + l);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decode until stable (bounded), returning the text and the layer count.
fn decode_fully(text: &str) -> (String, usize) {
    let mut prev = text.to_string();
    let mut depth = 0;
    for _ in 0..MAX_DECODE_DEPTH {
        let decoded = decode_once(&prev);
        if decoded == prev {
            break;
        }
        depth += 1;
        prev = decoded;
    }
    (prev, depth)
}

fn count_char(text: &str, c: char) -> u32 {
    text.chars().filter(|&x| x == c).count() as u32
}

fn count_sql_keywords(lower: &str) -> u32 {
    let mut count = 0u32;
    for keyword in SQL_KEYWORDS {
        let mut start = 0;
        while let Some(pos) = lower[start..].find(keyword) {
            let abs = start + pos;
            let end = abs + keyword.len();
            let before_ok = abs == 0
                || !lower[..abs]
                    .chars()
                    .next_back()
                    .map_or(false, |c| c.is_alphanumeric() || c == '_');
            let after_ok = end >= lower.len()
                || !lower[end..]
                    .chars()
                    .next()
                    .map_or(false, |c| c.is_alphanumeric() || c == '_');
            if before_ok && after_ok {
                count += 1;
            }
            start = end;
        }
    }
    count
}

fn special_char_ratio(text: &str) -> f32 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let special = text
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count();
    special as f32 / total as f32
}

/// Shannon entropy over characters; high values hint at obfuscation.
fn shannon_entropy(text: &str) -> f32 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let mut counts = std::collections::HashMap::new();
    for c in text.chars() {
        *counts.entry(c).or_insert(0usize) += 1;
    }
    let len = total as f32;
    let mut entropy = 0.0f32;
    for &count in counts.values() {
        let p = count as f32 / len;
        entropy -= p * p.log2();
    }
    entropy
}

fn path_depth(path: &str) -> u32 {
    path.split('/').filter(|s| !s.is_empty()).count() as u32
}

// ============================================================================
// TESTS
// ============================================================================
