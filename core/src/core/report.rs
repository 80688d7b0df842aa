use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attack::{AttackCategory, AttackResult, Severity};
use crate::classify::{ComplianceSummary, RiskLevel};
use crate::fixes::FixRecommendation;

/// Review state of a finding. Only a human reviewer moves it past `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VulnerabilityStatus {
    #[default]
    Open,
    Fixed,
    Accepted,
    FalsePositive,
}

/// Finding derived from one breached result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: String,
    pub attack_id: String,
    pub category: AttackCategory,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub impact: String,
    pub fix: FixRecommendation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<serde_json::Value>,
    pub status: VulnerabilityStatus,
    pub discovered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub total: usize,
    pub breached: usize,
    pub secure: usize,
    pub error: usize,
    pub skipped: usize,
}

impl ScanStats {
    pub fn is_balanced(&self) -> bool {
        self.total == self.breached + self.secure + self.error + self.skipped
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub total: usize,
    pub breached: usize,
    pub secure: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityStats {
    pub total: usize,
    pub breached: usize,
}

/// Identity and timing of a scan, supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub report_id: String,
    pub project_id: String,
    pub project_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ProjectMeta {
    /// Starts a scan now under a fresh report id.
    pub fn start(project_id: impl Into<String>, project_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            report_id: Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            project_name: project_name.into(),
            started_at: now,
            completed_at: now,
        }
    }

    pub fn complete(mut self) -> Self {
        self.completed_at = Utc::now();
        self
    }
}

/// Aggregate root of one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreachReport {
    pub id: String,
    pub project_id: String,
    pub project_name: String,
    pub stats: ScanStats,
    pub by_category: BTreeMap<AttackCategory, CategoryStats>,
    pub by_severity: BTreeMap<Severity, SeverityStats>,
    pub results: Vec<AttackResult>,
    pub vulnerabilities: Vec<Vulnerability>,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance: Option<ComplianceSummary>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl BreachReport {
    pub fn has_breaches(&self) -> bool {
        self.stats.breached > 0
    }

    /// Vulnerabilities ordered most severe first, ties by id.
    pub fn vulnerabilities_by_severity(&self) -> Vec<&Vulnerability> {
        let mut vulns: Vec<&Vulnerability> = self.vulnerabilities.iter().collect();
        vulns.sort_by(|a, b| a.severity.cmp(&b.severity).then_with(|| a.id.cmp(&b.id)));
        vulns
    }
}

pub(crate) fn empty_category_rollup() -> BTreeMap<AttackCategory, CategoryStats> {
    AttackCategory::ALL
        .iter()
        .map(|c| (*c, CategoryStats::default()))
        .collect()
}

pub(crate) fn empty_severity_rollup() -> BTreeMap<Severity, SeverityStats> {
    Severity::ALL
        .iter()
        .map(|s| (*s, SeverityStats::default()))
        .collect()
}
