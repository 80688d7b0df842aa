//! Remediation lookup keyed by attack id.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixRecommendation {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl FixRecommendation {
    pub fn is_empty(&self) -> bool {
        self.summary.is_empty() && self.steps.is_empty() && self.code.is_none()
    }
}

/// Source of fix recommendations. A miss is normal, not an error.
pub trait FixKnowledgeBase: Send + Sync {
    fn lookup(&self, attack_id: &str) -> Option<FixRecommendation>;
}

pub struct NoFixes;

impl FixKnowledgeBase for NoFixes {
    fn lookup(&self, _attack_id: &str) -> Option<FixRecommendation> {
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticFixes {
    entries: HashMap<String, FixRecommendation>,
}

impl StaticFixes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, attack_id: impl Into<String>, fix: FixRecommendation) {
        self.entries.insert(attack_id.into(), fix);
    }

    /// Loads a JSON object of `attack_id -> FixRecommendation`.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading fix knowledge base {}", path.display()))?;
        let entries: HashMap<String, FixRecommendation> = serde_json::from_str(&data)
            .with_context(|| format!("parsing fix knowledge base {}", path.display()))?;
        Ok(Self { entries })
    }

    /// Entries from `other` replace ours on id collisions.
    pub fn merge(mut self, other: StaticFixes) -> Self {
        self.entries.extend(other.entries);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FixKnowledgeBase for StaticFixes {
    fn lookup(&self, attack_id: &str) -> Option<FixRecommendation> {
        self.entries.get(attack_id).cloned()
    }
}
