use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttackStatus {
    Pending,
    Running,
    Breached,
    Secure,
    Error,
    Skipped,
}

impl AttackStatus {
    /// Whether a result with this status may appear in a finished scan.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttackStatus::Pending | AttackStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttackStatus::Pending => "pending",
            AttackStatus::Running => "running",
            AttackStatus::Breached => "breached",
            AttackStatus::Secure => "secure",
            AttackStatus::Error => "error",
            AttackStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for AttackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a probe ended in `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The probe reported a failure of its own (network, unexpected response).
    ProbeFailure,
    Timeout,
    /// The scan was cancelled while the probe was running and it did not
    /// finish inside the grace period.
    Cancelled,
    Panic,
    /// The probe returned a result still marked pending or running.
    InvalidResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

/// Structured request/response/error context for a result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttackDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

/// Outcome of one probe execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackResult {
    pub attack_id: String,
    pub status: AttackStatus,
    pub breached: bool,
    pub summary: String,
    #[serde(default)]
    pub details: AttackDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

impl AttackResult {
    fn new(attack_id: &str, status: AttackStatus, summary: impl Into<String>) -> Self {
        Self {
            attack_id: attack_id.to_string(),
            status,
            breached: status == AttackStatus::Breached,
            summary: summary.into(),
            details: AttackDetails::default(),
            evidence: None,
            timestamp: Utc::now(),
            duration_ms: 0,
        }
    }

    pub fn breached(attack_id: &str, summary: impl Into<String>) -> Self {
        Self::new(attack_id, AttackStatus::Breached, summary)
    }

    pub fn secure(attack_id: &str, summary: impl Into<String>) -> Self {
        Self::new(attack_id, AttackStatus::Secure, summary)
    }

    pub fn skipped(attack_id: &str, summary: impl Into<String>) -> Self {
        Self::new(attack_id, AttackStatus::Skipped, summary)
    }

    pub fn error(attack_id: &str, kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut result = Self::new(attack_id, AttackStatus::Error, message.clone());
        result.details.error = Some(ErrorDetail { kind, message });
        result
    }

    pub fn with_evidence(mut self, evidence: serde_json::Value) -> Self {
        self.evidence = Some(evidence);
        self
    }

    pub fn with_request(mut self, request: serde_json::Value) -> Self {
        self.details.request = Some(request);
        self
    }

    pub fn with_response(mut self, response: serde_json::Value) -> Self {
        self.details.response = Some(response);
        self
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.details.error.as_ref().map(|e| e.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_keep_flag_in_sync() {
        assert!(AttackResult::breached("a", "x").breached);
        assert!(!AttackResult::secure("a", "x").breached);
        assert!(!AttackResult::skipped("a", "x").breached);
    }

    #[test]
    fn test_error_carries_kind() {
        let r = AttackResult::error("a", ErrorKind::Timeout, "probe exceeded 5s");
        assert_eq!(r.status, AttackStatus::Error);
        assert_eq!(r.error_kind(), Some(ErrorKind::Timeout));
        assert_eq!(r.summary, "probe exceeded 5s");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!AttackStatus::Pending.is_terminal());
        assert!(!AttackStatus::Running.is_terminal());
        assert!(AttackStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_serialized_shape() {
        let r = AttackResult::error("rls-1", ErrorKind::ProbeFailure, "boom");
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["attack_id"], "rls-1");
        assert_eq!(v["status"], "error");
        assert_eq!(v["details"]["error"]["kind"], "probe_failure");
        assert!(v.get("evidence").is_none());
    }
}
