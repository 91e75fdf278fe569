//! Action execution on the traffic path.
//!
//! Maps a final action to a concrete effect: forward, forward-sanitized,
//! forward-after-delay, challenge, or reject. Forwarding goes through the
//! [`Upstream`] trait so deployments can plug in a real proxy hop, and
//! tests a mock. Execution failures become [`Outcome::Failed`] - never an
//! error - and the decision loop treats them as ALLOW (fail-open).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policy::{Action, ACTION_COUNT};
use crate::request::Request;

// ============================================================================
// OUTCOMES
// ============================================================================

/// What actually happened to the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Forwarded { status: u16 },
    ForwardedModified { status: u16 },
    ForwardedDelayed { delay_ms: u64, status: u16 },
    ChallengeIssued { status: u16 },
    Rejected { status: u16 },
    /// Forwarding path unreachable or stalled; treated as ALLOW upstream.
    Failed { reason: String },
}

impl Outcome {
    /// Did the request reach the protected service?
    pub fn delivered(&self) -> bool {
        matches!(
            self,
            Outcome::Forwarded { .. }
                | Outcome::ForwardedModified { .. }
                | Outcome::ForwardedDelayed { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Forwarded { .. } => "forwarded",
            Outcome::ForwardedModified { .. } => "forwarded_modified",
            Outcome::ForwardedDelayed { .. } => "forwarded_delayed",
            Outcome::ChallengeIssued { .. } => "challenge_issued",
            Outcome::Rejected { .. } => "rejected",
            Outcome::Failed { .. } => "failed",
        }
    }
}

// ============================================================================
// UPSTREAM
// ============================================================================

#[derive(Debug)]
pub enum UpstreamError {
    Transport(String),
    Timeout,
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamError::Transport(msg) => write!(f, "upstream transport error: {}", msg),
            UpstreamError::Timeout => write!(f, "upstream timed out"),
        }
    }
}

impl std::error::Error for UpstreamError {}

/// Forwarding hop toward the protected service.
pub trait Upstream: Send + Sync {
    /// Deliver the (possibly sanitized) request, bounded by `timeout`.
    /// Returns the upstream HTTP status.
    fn forward(&self, request: &Request, timeout: Duration) -> Result<u16, UpstreamError>;
}

/// Real forwarding hop over HTTP.
pub struct HttpUpstream {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpUpstream {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: ureq::Agent::new(),
        }
    }
}

impl Upstream for HttpUpstream {
    fn forward(&self, request: &Request, timeout: Duration) -> Result<u16, UpstreamError> {
        let url = format!("{}{}", self.base_url, request.target());
        let mut call = self.agent.request(&request.method, &url).timeout(timeout);
        for (name, value) in request.headers.iter() {
            call = call.set(name, value);
        }
        let response = match &request.body {
            Some(body) => call.send_string(body),
            None => call.call(),
        };
        match response {
            Ok(resp) => Ok(resp.status()),
            // upstream answered with an error status; still a delivery
            Err(ureq::Error::Status(code, _)) => Ok(code),
            Err(ureq::Error::Transport(t)) => Err(UpstreamError::Transport(t.to_string())),
        }
    }
}

/// Observation-only deployments: nothing is actually forwarded by the core.
pub struct NullUpstream;

impl Upstream for NullUpstream {
    fn forward(&self, _request: &Request, _timeout: Duration) -> Result<u16, UpstreamError> {
        Ok(200)
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Tokens stripped from path/query/body by SANITIZE.
    pub sanitize_tokens: Vec<String>,
    /// Fixed delay for THROTTLE, capped by the request budget.
    pub throttle_delay_ms: u64,
    /// Rejection status for BLOCK.
    pub block_status: u16,
    /// Status used when issuing a challenge.
    pub challenge_status: u16,
    /// Per-request forwarding budget.
    pub forward_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            sanitize_tokens: crate::features::extract::SQL_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            throttle_delay_ms: 500,
            block_status: 403,
            challenge_status: 429,
            forward_timeout_ms: 5_000,
        }
    }
}

// ============================================================================
// EXECUTOR
// ============================================================================

pub struct ActionExecutor {
    upstream: std::sync::Arc<dyn Upstream>,
    config: ExecutorConfig,
    counts: [AtomicU64; ACTION_COUNT],
}

impl ActionExecutor {
    pub fn new(upstream: std::sync::Arc<dyn Upstream>, config: ExecutorConfig) -> Self {
        Self {
            upstream,
            config,
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Apply `action` to `request`.
    ///
    /// Never returns an error: a broken forwarding path surfaces as
    /// [`Outcome::Failed`] and the caller fails open.
    pub fn execute(&self, request: &Request, action: Action) -> Outcome {
        self.counts[action.index()].fetch_add(1, Ordering::Relaxed);
        let budget = Duration::from_millis(self.config.forward_timeout_ms);

        match action {
            Action::Allow | Action::LogOnly => match self.upstream.forward(request, budget) {
                Ok(status) => Outcome::Forwarded { status },
                Err(err) => Outcome::Failed {
                    reason: err.to_string(),
                },
            },
            Action::Sanitize => {
                let (sanitized, modified) = self.sanitize(request);
                match self.upstream.forward(&sanitized, budget) {
                    Ok(status) if modified => Outcome::ForwardedModified { status },
                    Ok(status) => Outcome::Forwarded { status },
                    Err(err) => Outcome::Failed {
                        reason: err.to_string(),
                    },
                }
            }
            Action::Challenge => Outcome::ChallengeIssued {
                status: self.config.challenge_status,
            },
            Action::Throttle => {
                let delay = Duration::from_millis(self.config.throttle_delay_ms).min(budget);
                std::thread::sleep(delay);
                let remaining = budget.saturating_sub(delay);
                match self.upstream.forward(request, remaining.max(Duration::from_millis(1))) {
                    Ok(status) => Outcome::ForwardedDelayed {
                        delay_ms: delay.as_millis() as u64,
                        status,
                    },
                    Err(err) => Outcome::Failed {
                        reason: err.to_string(),
                    },
                }
            }
            Action::Block => Outcome::Rejected {
                status: self.config.block_status,
            },
        }
    }

    /// Strip configured high-risk tokens and SQL punctuation from the
    /// mutable request fields, returning the copy and whether it changed.
    fn sanitize(&self, request: &Request) -> (Request, bool) {
        let mut out = request.clone();
        let mut modified = false;
        let cleaned = self.sanitize_text(&out.path);
        if cleaned != out.path {
            out.path = cleaned;
            modified = true;
        }
        if let Some(query) = out.query.as_mut() {
            let cleaned = self.sanitize_text(query);
            if cleaned != *query {
                *query = cleaned;
                modified = true;
            }
        }
        if let Some(body) = out.body.as_mut() {
            let cleaned = self.sanitize_text(body);
            if cleaned != *body {
                *body = cleaned;
                modified = true;
            }
        }
        (out, modified)
    }

    fn sanitize_text(&self, text: &str) -> String {
        let mut cleaned = text.to_string();
        for token in &self.config.sanitize_tokens {
            let token_lower = token.to_lowercase();
            if token_lower.is_empty() {
                continue;
            }
            cleaned = strip_token(&cleaned, &token_lower);
        }
        for pattern in ["--", "/*", "*/", ";"] {
            cleaned = cleaned.replace(pattern, "");
        }
        cleaned
    }

    /// Per-action execution counts, in action order.
    pub fn execution_counts(&self) -> [u64; ACTION_COUNT] {
        let mut out = [0; ACTION_COUNT];
        for (i, count) in self.counts.iter().enumerate() {
            out[i] = count.load(Ordering::Relaxed);
        }
        out
    }
}

/// Case-insensitive token removal. All matching walks char boundaries of
/// the original text; lowercasing happens per char during comparison, so
/// mixed-width characters (whose lowercase form changes byte length) never
/// shift the offsets used for slicing.
fn strip_token(text: &str, token_lower: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut skip_until = 0;
    for (i, c) in text.char_indices() {
        if i < skip_until {
            continue;
        }
        if let Some(end) = match_token_at(text, i, token_lower) {
            skip_until = end;
            continue;
        }
        out.push(c);
    }
    out
}

/// If `token_lower` matches at byte offset `start`, return the byte offset
/// one past the match. A match that ends inside one character's lowercase
/// expansion is not a match.
fn match_token_at(text: &str, start: usize, token_lower: &str) -> Option<usize> {
    let mut needle = token_lower.chars().peekable();
    for (off, c) in text[start..].char_indices() {
        for lc in c.to_lowercase() {
            match needle.next() {
                Some(n) if n == lc => {}
                _ => return None,
            }
        }
        if needle.peek().is_none() {
            return Some(start + off + c.len_utf8());
        }
    }
    None
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct FailingUpstream;
    impl Upstream for FailingUpstream {
        fn forward(&self, _r: &Request, _t: Duration) -> Result<u16, UpstreamError> {
            Err(UpstreamError::Transport("connection refused".to_string()))
        }
    }

    /// Records the request it saw, so sanitization can be asserted.
    struct CapturingUpstream {
        seen: parking_lot::Mutex<Option<Request>>,
    }
    impl Upstream for CapturingUpstream {
        fn forward(&self, r: &Request, _t: Duration) -> Result<u16, UpstreamError> {
            *self.seen.lock() = Some(r.clone());
            Ok(200)
        }
    }

    fn executor(upstream: Arc<dyn Upstream>) -> ActionExecutor {
        let config = ExecutorConfig {
            throttle_delay_ms: 1,
            ..Default::default()
        };
        ActionExecutor::new(upstream, config)
    }

    #[test]
    fn test_allow_forwards_unchanged() {
        let ex = executor(Arc::new(NullUpstream));
        let req = Request::new("GET", "/api/user", "1.2.3.4");
        assert_eq!(ex.execute(&req, Action::Allow), Outcome::Forwarded { status: 200 });
        assert_eq!(ex.execute(&req, Action::LogOnly), Outcome::Forwarded { status: 200 });
    }

    #[test]
    fn test_block_rejects_without_forwarding() {
        let ex = executor(Arc::new(FailingUpstream));
        let req = Request::new("GET", "/x", "1.2.3.4");
        // upstream would fail, but BLOCK never touches it
        assert_eq!(ex.execute(&req, Action::Block), Outcome::Rejected { status: 403 });
    }

    #[test]
    fn test_challenge_withholds_forwarding() {
        let ex = executor(Arc::new(FailingUpstream));
        let req = Request::new("GET", "/x", "1.2.3.4");
        assert_eq!(
            ex.execute(&req, Action::Challenge),
            Outcome::ChallengeIssued { status: 429 }
        );
    }

    #[test]
    fn test_sanitize_strips_tokens() {
        let capturing = Arc::new(CapturingUpstream {
            seen: parking_lot::Mutex::new(None),
        });
        let ex = executor(capturing.clone());
        let req = Request::new("GET", "/login", "1.2.3.4")
            .with_query("id=1 UNION SELECT password; --");
        let outcome = ex.execute(&req, Action::Sanitize);
        assert!(matches!(outcome, Outcome::ForwardedModified { status: 200 }));

        let forwarded = capturing.seen.lock().clone().unwrap();
        let query = forwarded.query.unwrap();
        let lower = query.to_lowercase();
        assert!(!lower.contains("union"));
        assert!(!lower.contains("select"));
        assert!(!query.contains("--"));
        assert!(!query.contains(';'));
    }

    #[test]
    fn test_sanitize_handles_mixed_width_unicode() {
        // U+023A uppercases 2 bytes -> lowercase 3; U+2126 goes 3 -> 2.
        // Total length is preserved, per-char offsets are not.
        let capturing = Arc::new(CapturingUpstream {
            seen: parking_lot::Mutex::new(None),
        });
        let ex = executor(capturing.clone());
        let req = Request::new("GET", "/login", "1.2.3.4")
            .with_query("\u{023A}select\u{2126}");
        let outcome = ex.execute(&req, Action::Sanitize);
        assert!(matches!(outcome, Outcome::ForwardedModified { status: 200 }));

        let forwarded = capturing.seen.lock().clone().unwrap();
        let query = forwarded.query.unwrap();
        assert!(!query.to_lowercase().contains("select"));
        assert!(query.contains('\u{023A}'));
        assert!(query.contains('\u{2126}'));
    }

    #[test]
    fn test_sanitize_case_insensitive_across_repeats() {
        let ex = executor(Arc::new(NullUpstream));
        let req = Request::new("GET", "/x", "1.2.3.4")
            .with_query("SeLeCt a UNION select b");
        let (sanitized, modified) = ex.sanitize(&req);
        assert!(modified);
        let query = sanitized.query.unwrap().to_lowercase();
        assert!(!query.contains("select"));
        assert!(!query.contains("union"));
    }

    #[test]
    fn test_sanitize_clean_request_not_marked_modified() {
        let ex = executor(Arc::new(NullUpstream));
        let req = Request::new("GET", "/api/user", "1.2.3.4").with_query("id=123");
        assert_eq!(ex.execute(&req, Action::Sanitize), Outcome::Forwarded { status: 200 });
    }

    #[test]
    fn test_throttle_reports_delay() {
        let ex = executor(Arc::new(NullUpstream));
        let req = Request::new("GET", "/x", "1.2.3.4");
        match ex.execute(&req, Action::Throttle) {
            Outcome::ForwardedDelayed { delay_ms, status } => {
                assert_eq!(delay_ms, 1);
                assert_eq!(status, 200);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_upstream_failure_becomes_failed_outcome() {
        let ex = executor(Arc::new(FailingUpstream));
        let req = Request::new("GET", "/x", "1.2.3.4");
        let outcome = ex.execute(&req, Action::Allow);
        assert!(matches!(outcome, Outcome::Failed { .. }));
        assert!(!outcome.delivered());
    }

    #[test]
    fn test_execution_counts() {
        let ex = executor(Arc::new(NullUpstream));
        let req = Request::new("GET", "/x", "1.2.3.4");
        ex.execute(&req, Action::Allow);
        ex.execute(&req, Action::Allow);
        ex.execute(&req, Action::Block);
        let counts = ex.execution_counts();
        assert_eq!(counts[Action::Allow.index()], 2);
        assert_eq!(counts[Action::Block.index()], 1);
        assert_eq!(counts[Action::Throttle.index()], 0);
    }
}
