pub mod client;

pub use client::{HttpOptions, TargetClient, MAX_BODY_BYTES};

use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};

/// Which project key a probe request authenticates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyRole {
    Anon,
    Service,
    None,
}

/// A single request a probe sends to the target, relative to its base URL.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub method: Method,
    pub path: String,
    pub key: KeyRole,
    pub body: Option<Value>,
}

impl ProbeRequest {
    pub fn get(path: impl Into<String>, key: KeyRole) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            key,
            body: None,
        }
    }

    /// Redacted description for result details. Keys are never recorded.
    pub fn describe(&self) -> Value {
        json!({
            "method": self.method.as_str(),
            "path": self.path,
            "key": self.key,
            "body": self.body,
        })
    }
}

/// Captured response of a probe request.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status: u16,
    pub body: String,
}

const BODY_EXCERPT_LEN: usize = 512;

impl ProbeResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }

    pub fn describe(&self) -> Value {
        json!({
            "status": self.status,
            "body_excerpt": excerpt(&self.body, BODY_EXCERPT_LEN),
        })
    }
}

/// Truncates on a char boundary, appending an ellipsis when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_never_contains_key_material() {
        let req = ProbeRequest::get("/rest/v1/", KeyRole::Anon);
        let v = req.describe();
        assert_eq!(v["method"], "GET");
        assert_eq!(v["key"], "anon");
    }

    #[test]
    fn test_excerpt_truncates() {
        assert_eq!(excerpt("abcdef", 3), "abc…");
        assert_eq!(excerpt("abc", 3), "abc");
    }

    #[test]
    fn test_response_helpers() {
        let resp = ProbeResponse { status: 200, body: "[1,2]".to_string() };
        assert!(resp.is_success());
        assert_eq!(resp.json().unwrap().as_array().unwrap().len(), 2);
        let resp = ProbeResponse { status: 401, body: "nope".to_string() };
        assert!(!resp.is_success());
        assert!(resp.json().is_none());
    }
}
