use serde::{Deserialize, Serialize};

use crate::attack::Severity;
use crate::core::report::Vulnerability;

pub const MAX_RISK_SCORE: u8 = 100;

/// Additive weight of one vulnerability. Anything outside critical, high and
/// medium weighs the same as `low`.
pub fn severity_weight(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 40,
        Severity::High => 20,
        Severity::Medium => 10,
        Severity::Low | Severity::Info | Severity::Unknown => 5,
    }
}

/// Risk score in `[0, 100]`. Order-independent and never fails.
pub fn risk_score(vulnerabilities: &[Vulnerability]) -> u8 {
    let total = vulnerabilities
        .iter()
        .fold(0u32, |acc, v| acc.saturating_add(severity_weight(v.severity)));
    total.min(MAX_RISK_SCORE as u32) as u8
}

/// Coarse band of a risk score, for exporters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            0 => RiskLevel::None,
            1..=19 => RiskLevel::Low,
            20..=39 => RiskLevel::Medium,
            40..=69 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::None => "none",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}
