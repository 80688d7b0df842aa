//! Static cross-reference from attack categories to compliance frameworks.
//!
//! Three tables, one per framework. Keys are category names; the GDPR table
//! additionally carries `data_exposure`, which no attack category resolves to
//! but which exporters list alongside the others.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attack::AttackCategory;
use crate::core::report::Vulnerability;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComplianceEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub const DATA_EXPOSURE_KEY: &str = "data_exposure";

pub const OWASP_TOP10: &[(&str, ComplianceEntry)] = &[
    ("rls", ComplianceEntry {
        id: "A01:2021",
        name: "Broken Access Control",
        description: "Row level policies fail to restrict which rows a caller can read or write.",
    }),
    ("auth", ComplianceEntry {
        id: "A07:2021",
        name: "Identification and Authentication Failures",
        description: "Weak sign-up, session or credential handling in the auth service.",
    }),
    ("storage", ComplianceEntry {
        id: "A01:2021",
        name: "Broken Access Control",
        description: "Bucket or object policies expose files to unauthorized callers.",
    }),
    ("functions", ComplianceEntry {
        id: "A05:2021",
        name: "Security Misconfiguration",
        description: "Edge functions reachable without verification or leaking internals.",
    }),
    ("realtime", ComplianceEntry {
        id: "A01:2021",
        name: "Broken Access Control",
        description: "Realtime channels broadcast changes to subscribers lacking access.",
    }),
    ("vibecoder", ComplianceEntry {
        id: "A02:2021",
        name: "Cryptographic Failures",
        description: "Privileged secrets shipped to clients or embedded in public code.",
    }),
    ("api", ComplianceEntry {
        id: "A04:2021",
        name: "Insecure Design",
        description: "API surface discloses schema or accepts requests it should refuse.",
    }),
    ("database", ComplianceEntry {
        id: "A03:2021",
        name: "Injection",
        description: "Database functions or filters accept attacker-controlled queries.",
    }),
];

pub const SOC2: &[(&str, ComplianceEntry)] = &[
    ("rls", ComplianceEntry {
        id: "CC6.1",
        name: "Logical Access Security",
        description: "Logical access to information assets is restricted to authorized users.",
    }),
    ("auth", ComplianceEntry {
        id: "CC6.2",
        name: "User Registration and Authorization",
        description: "Users are registered and authorized before credentials are issued.",
    }),
    ("storage", ComplianceEntry {
        id: "CC6.7",
        name: "Data Transmission and Disposal",
        description: "Movement of information is restricted to authorized users and processes.",
    }),
    ("functions", ComplianceEntry {
        id: "CC7.1",
        name: "Configuration Monitoring",
        description: "Configuration changes that introduce vulnerabilities are detected.",
    }),
    ("database", ComplianceEntry {
        id: "CC6.1",
        name: "Logical Access Security",
        description: "Logical access to information assets is restricted to authorized users.",
    }),
];

pub const GDPR: &[(&str, ComplianceEntry)] = &[
    ("rls", ComplianceEntry {
        id: "Art. 32",
        name: "Security of processing",
        description: "Appropriate technical measures must protect personal data against unauthorized access.",
    }),
    ("auth", ComplianceEntry {
        id: "Art. 32",
        name: "Security of processing",
        description: "Access to processing systems must be limited to authenticated parties.",
    }),
    ("storage", ComplianceEntry {
        id: "Art. 32",
        name: "Security of processing",
        description: "Stored files containing personal data must not be publicly retrievable.",
    }),
    ("database", ComplianceEntry {
        id: "Art. 25",
        name: "Data protection by design and by default",
        description: "Only personal data necessary for each purpose may be accessible by default.",
    }),
    (DATA_EXPOSURE_KEY, ComplianceEntry {
        id: "Art. 33",
        name: "Notification of a personal data breach",
        description: "Exposure of personal data may require notifying the supervisory authority within 72 hours.",
    }),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framework {
    OwaspTop10,
    Soc2,
    Gdpr,
}

impl Framework {
    pub const ALL: [Framework; 3] = [Framework::OwaspTop10, Framework::Soc2, Framework::Gdpr];

    pub fn label(&self) -> &'static str {
        match self {
            Framework::OwaspTop10 => "OWASP Top 10 (2021)",
            Framework::Soc2 => "SOC 2",
            Framework::Gdpr => "GDPR",
        }
    }

    pub fn table(&self) -> &'static [(&'static str, ComplianceEntry)] {
        match self {
            Framework::OwaspTop10 => OWASP_TOP10,
            Framework::Soc2 => SOC2,
            Framework::Gdpr => GDPR,
        }
    }

    pub fn lookup(&self, key: &str) -> Option<&'static ComplianceEntry> {
        self.table().iter().find(|(k, _)| *k == key).map(|(_, entry)| entry)
    }

    /// Entry for a category, or `None` when the framework has nothing for it.
    pub fn entry_for(&self, category: AttackCategory) -> Option<&'static ComplianceEntry> {
        if !category.is_known() {
            return None;
        }
        self.lookup(category.as_str())
    }

    /// Framework id → number of vulnerabilities resolving to it.
    pub fn summarize(&self, vulnerabilities: &[Vulnerability]) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for vuln in vulnerabilities {
            if let Some(entry) = self.entry_for(vuln.category) {
                *counts.entry(entry.id.to_string()).or_insert(0) += 1;
            }
        }
        counts
    }
}

/// Per-framework vulnerability counts for one report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceSummary {
    pub owasp: BTreeMap<String, usize>,
    pub soc2: BTreeMap<String, usize>,
    pub gdpr: BTreeMap<String, usize>,
}

impl ComplianceSummary {
    pub fn from_vulnerabilities(vulnerabilities: &[Vulnerability]) -> Self {
        Self {
            owasp: Framework::OwaspTop10.summarize(vulnerabilities),
            soc2: Framework::Soc2.summarize(vulnerabilities),
            gdpr: Framework::Gdpr.summarize(vulnerabilities),
        }
    }

    pub fn for_framework(&self, framework: Framework) -> &BTreeMap<String, usize> {
        match framework {
            Framework::OwaspTop10 => &self.owasp,
            Framework::Soc2 => &self.soc2,
            Framework::Gdpr => &self.gdpr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::report::tests::vuln;
    use crate::attack::Severity;

    #[test]
    fn test_every_category_has_owasp_entry() {
        for cat in AttackCategory::ALL {
            assert!(Framework::OwaspTop10.entry_for(cat).is_some(), "{} missing", cat);
        }
    }

    #[test]
    fn test_table_keys_are_known_categories() {
        for framework in Framework::ALL {
            for (key, _) in framework.table() {
                let known = key.parse::<AttackCategory>().is_ok();
                assert!(known || *key == DATA_EXPOSURE_KEY, "{:?} has stray key {}", framework, key);
            }
        }
    }

    #[test]
    fn test_data_exposure_only_in_gdpr() {
        assert!(Framework::Gdpr.lookup(DATA_EXPOSURE_KEY).is_some());
        assert!(Framework::OwaspTop10.lookup(DATA_EXPOSURE_KEY).is_none());
        assert!(Framework::Soc2.lookup(DATA_EXPOSURE_KEY).is_none());
    }

    #[test]
    fn test_miss_contributes_nothing() {
        let vulns = vec![vuln("rt-1", AttackCategory::Realtime, Severity::High)];
        let summary = ComplianceSummary::from_vulnerabilities(&vulns);
        assert_eq!(summary.owasp.get("A01:2021"), Some(&1));
        assert!(summary.soc2.is_empty());
        assert!(summary.gdpr.is_empty());
    }

    #[test]
    fn test_overlapping_frameworks_count_independently() {
        let vulns = vec![
            vuln("rls-1", AttackCategory::Rls, Severity::Critical),
            vuln("st-1", AttackCategory::Storage, Severity::High),
            vuln("x-1", AttackCategory::Unknown, Severity::Low),
        ];
        let summary = ComplianceSummary::from_vulnerabilities(&vulns);
        assert_eq!(summary.owasp.get("A01:2021"), Some(&2));
        assert_eq!(summary.soc2.get("CC6.1"), Some(&1));
        assert_eq!(summary.soc2.get("CC6.7"), Some(&1));
        assert_eq!(summary.gdpr.get("Art. 32"), Some(&2));
        assert_eq!(summary.owasp.values().sum::<usize>(), 2);
    }
}
