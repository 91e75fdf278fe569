//! Parsed HTTP request record.
//!
//! The capture/reassembly collaborator hands the engine fully parsed
//! requests; nothing in the core touches raw packets. A `Request` is
//! immutable once captured - the executor works on sanitized copies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// HEADERS
// ============================================================================

/// Ordered header list with case-insensitive lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }

    /// First value for `name`, matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ============================================================================
// REQUEST
// ============================================================================

/// One intercepted HTTP request, as supplied by the capture collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Correlation identifier assigned at capture time.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub method: String,
    /// Decoded request path, without query string.
    pub path: String,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub headers: Headers,
    /// Textual source address (IPv4/IPv6).
    pub source: String,
    /// Intercepted port context.
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Request {
    /// Minimal constructor used by tests and simulators.
    pub fn new(method: &str, path: &str, source: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: method.to_string(),
            path: path.to_string(),
            query: None,
            body: None,
            headers: Headers::new(),
            source: source.to_string(),
            port: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_query(mut self, query: &str) -> Self {
        self.query = Some(query.to_string());
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Path plus query, as sent upstream.
    pub fn target(&self) -> String {
        match &self.query {
            Some(q) if !q.is_empty() => format!("{}?{}", self.path, q),
            _ => self.path.clone(),
        }
    }

    /// Cookie pairs parsed from the `Cookie` header.
    pub fn cookies(&self) -> Vec<(String, String)> {
        let Some(raw) = self.headers.get("Cookie") else {
            return Vec::new();
        };
        raw.split(';')
            .filter_map(|part| {
                let (k, v) = part.split_once('=')?;
                Some((k.trim().to_string(), v.trim().to_string()))
            })
            .collect()
    }

    /// A request with no analyzable text at all.
    pub fn is_structurally_empty(&self) -> bool {
        self.path.is_empty()
            && self.query.as_deref().map_or(true, str::is_empty)
            && self.body.as_deref().map_or(true, str::is_empty)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_case_insensitive() {
        let req = Request::new("GET", "/api/user", "1.2.3.4")
            .with_header("User-Agent", "curl/8.0");
        assert_eq!(req.headers.get("user-agent"), Some("curl/8.0"));
        assert_eq!(req.headers.get("USER-AGENT"), Some("curl/8.0"));
        assert_eq!(req.headers.get("Referer"), None);
    }

    #[test]
    fn test_target_includes_query() {
        let req = Request::new("GET", "/api/user", "1.2.3.4").with_query("id=123");
        assert_eq!(req.target(), "/api/user?id=123");
        let bare = Request::new("GET", "/api/user", "1.2.3.4");
        assert_eq!(bare.target(), "/api/user");
    }

    #[test]
    fn test_cookie_parsing() {
        let req = Request::new("GET", "/", "1.2.3.4")
            .with_header("Cookie", "session=abc; lang=en");
        let cookies = req.cookies();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0], ("session".to_string(), "abc".to_string()));
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let json = r#"{"method":"GET","path":"/x","source":"10.0.0.1"}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert_eq!(req.method, "GET");
        assert!(req.query.is_none());
        assert!(req.headers.is_empty());
    }
}
