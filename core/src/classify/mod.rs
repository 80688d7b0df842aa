pub mod compliance;
pub mod scoring;

pub use compliance::{ComplianceEntry, ComplianceSummary, Framework};
pub use scoring::{risk_score, severity_weight, RiskLevel};
