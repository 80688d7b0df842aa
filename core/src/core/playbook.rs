use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::attack::{AttackCategory, AttackVector, Severity, VectorMeta};

/// Optional narrowing of a playbook. Every non-empty filter must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaybookFilter {
    pub categories: Vec<AttackCategory>,
    pub severities: Vec<Severity>,
    /// A vector passes when it carries at least one of these tags.
    pub tags: Vec<String>,
}

impl PlaybookFilter {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.severities.is_empty() && self.tags.is_empty()
    }

    pub fn matches(&self, meta: &VectorMeta) -> bool {
        let category_ok = self.categories.is_empty() || self.categories.contains(&meta.category);
        let severity_ok = self.severities.is_empty() || self.severities.contains(&meta.severity);
        let tag_ok = self.tags.is_empty() || self.tags.iter().any(|t| meta.has_tag(t));
        category_ok && severity_ok && tag_ok
    }
}

/// Metadata of every vector a scan may report on, keyed by attack id.
pub type VectorCatalog = BTreeMap<String, VectorMeta>;

/// Named, reusable selection of attack vectors.
#[derive(Clone)]
pub struct AttackPlaybook {
    name: String,
    description: String,
    vectors: Vec<Arc<dyn AttackVector>>,
    seen: HashSet<String>,
    filter: PlaybookFilter,
}

impl AttackPlaybook {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            vectors: Vec::new(),
            seen: HashSet::new(),
            filter: PlaybookFilter::default(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Registers a vector. A second vector with an already registered id is
    /// dropped so every id maps to exactly one result.
    pub fn add(&mut self, vector: Arc<dyn AttackVector>) {
        if self.seen.insert(vector.id().to_string()) {
            self.vectors.push(vector);
        } else {
            warn!("playbook '{}': duplicate attack id '{}' ignored", self.name, vector.id());
        }
    }

    pub fn with_vectors<I>(mut self, vectors: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn AttackVector>>,
    {
        for v in vectors {
            self.add(v);
        }
        self
    }

    pub fn with_filter(mut self, filter: PlaybookFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn filter(&self) -> &PlaybookFilter {
        &self.filter
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Vectors passing the filter, in registration order.
    pub fn select(&self) -> Vec<Arc<dyn AttackVector>> {
        self.vectors
            .iter()
            .filter(|v| self.filter.matches(&v.meta()))
            .cloned()
            .collect()
    }

    /// Catalog of the selected vectors, for aggregation.
    pub fn catalog(&self) -> VectorCatalog {
        self.select()
            .iter()
            .map(|v| (v.id().to_string(), v.meta()))
            .collect()
    }
}
