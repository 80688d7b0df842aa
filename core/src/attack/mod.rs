pub mod cancel;
pub mod context;
pub mod result;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use cancel::CancelSignal;
pub use context::{AttackContext, TargetConfig};
pub use result::{AttackDetails, AttackResult, AttackStatus, ErrorDetail, ErrorKind};

/// API surface a probe targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackCategory {
    Rls,
    Auth,
    Storage,
    Functions,
    Realtime,
    Vibecoder,
    Api,
    Database,
    /// Any value this build does not know about. Never part of a rollup.
    #[serde(other)]
    Unknown,
}

impl AttackCategory {
    /// Every rollup key, in report order.
    pub const ALL: [AttackCategory; 8] = [
        AttackCategory::Rls,
        AttackCategory::Auth,
        AttackCategory::Storage,
        AttackCategory::Functions,
        AttackCategory::Realtime,
        AttackCategory::Vibecoder,
        AttackCategory::Api,
        AttackCategory::Database,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttackCategory::Rls => "rls",
            AttackCategory::Auth => "auth",
            AttackCategory::Storage => "storage",
            AttackCategory::Functions => "functions",
            AttackCategory::Realtime => "realtime",
            AttackCategory::Vibecoder => "vibecoder",
            AttackCategory::Api => "api",
            AttackCategory::Database => "database",
            AttackCategory::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, AttackCategory::Unknown)
    }
}

impl fmt::Display for AttackCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AttackCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AttackCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown attack category '{}'", s))
    }
}

/// Severity of a successful breach, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
    #[serde(other)]
    Unknown,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
            Severity::Unknown => "unknown",
        }
    }

    /// Rollup bucket for this severity. Unknown values are filed under `low`,
    /// the same fallback the risk score uses.
    pub fn bucket(&self) -> Severity {
        match self {
            Severity::Unknown => Severity::Low,
            other => *other,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .iter()
            .copied()
            .find(|sev| sev.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown severity '{}'", s))
    }
}

/// Capability contract every probe implements.
///
/// A vector is a self-contained value: static classification metadata plus one
/// asynchronous probe. The engine never looks inside `execute`; it only bounds
/// it in time, isolates its faults and stamps the returned result.
///
/// Implementations should poll `cancel` at their I/O boundaries and return
/// whatever partial result they have once it fires.
#[async_trait]
pub trait AttackVector: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn category(&self) -> AttackCategory;
    fn severity(&self) -> Severity;

    fn tags(&self) -> &[String] {
        &[]
    }

    async fn execute(&self, ctx: &AttackContext, cancel: &CancelSignal) -> AttackResult;

    /// Serializable snapshot of the static metadata.
    fn meta(&self) -> VectorMeta {
        VectorMeta {
            id: self.id().to_string(),
            name: self.name().to_string(),
            description: self.description().to_string(),
            category: self.category(),
            severity: self.severity(),
            tags: self.tags().to_vec(),
        }
    }
}

/// Static metadata of a registered vector, detached from its probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorMeta {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: AttackCategory,
    pub severity: Severity,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl VectorMeta {
    /// Placeholder for a result whose attack id is not in the catalog.
    pub fn unresolved(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            category: AttackCategory::Unknown,
            severity: Severity::Unknown,
            tags: Vec::new(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}
