use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::StreamExt;
use log::warn;

use crate::attack::{
    AttackCategory, AttackResult, AttackStatus, ErrorDetail, ErrorKind, Severity, VectorMeta,
};
use crate::classify::{risk_score, ComplianceSummary, RiskLevel};
use crate::core::engine::ScanStream;
use crate::core::playbook::VectorCatalog;
use crate::core::report::{
    empty_category_rollup, empty_severity_rollup, BreachReport, CategoryStats, ProjectMeta,
    ScanStats, SeverityStats, Vulnerability, VulnerabilityStatus,
};
use crate::fixes::{FixKnowledgeBase, NoFixes};
use crate::SinkRef;

/// Where a single result lands in the stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Breached,
    Secure,
    Error,
    Skipped,
}

/// Running fold of results for one scan. Owned by exactly one consumer.
pub struct Tally {
    catalog: VectorCatalog,
    stats: ScanStats,
    by_category: BTreeMap<AttackCategory, CategoryStats>,
    by_severity: BTreeMap<Severity, SeverityStats>,
    results: Vec<AttackResult>,
}

impl Tally {
    pub fn new(catalog: VectorCatalog) -> Self {
        Self {
            catalog,
            stats: ScanStats::default(),
            by_category: empty_category_rollup(),
            by_severity: empty_severity_rollup(),
            results: Vec::new(),
        }
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Folds one result in. Anomalies are logged and counted conservatively;
    /// nothing is ever dropped.
    pub fn record(&mut self, mut result: AttackResult) {
        let bucket = classify(&mut result);
        let meta = self.meta_for(&result.attack_id);

        self.stats.total += 1;
        match bucket {
            Bucket::Breached => self.stats.breached += 1,
            Bucket::Secure => self.stats.secure += 1,
            Bucket::Error => self.stats.error += 1,
            Bucket::Skipped => self.stats.skipped += 1,
        }

        if let Some(cat) = self.by_category.get_mut(&meta.category) {
            cat.total += 1;
            match bucket {
                Bucket::Breached => cat.breached += 1,
                Bucket::Secure => cat.secure += 1,
                _ => {}
            }
        } else {
            warn!(
                "attack '{}' has unrecognized category, left out of category rollup",
                result.attack_id
            );
        }

        if meta.severity == Severity::Unknown {
            warn!(
                "attack '{}' has unrecognized severity, rolled up as low",
                result.attack_id
            );
        }
        let sev = self.by_severity.entry(meta.severity.bucket()).or_default();
        sev.total += 1;
        if bucket == Bucket::Breached {
            sev.breached += 1;
        }

        self.results.push(result);
    }

    fn meta_for(&self, attack_id: &str) -> VectorMeta {
        match self.catalog.get(attack_id) {
            Some(meta) => meta.clone(),
            None => {
                warn!("result for unregistered attack id '{}'", attack_id);
                VectorMeta::unresolved(attack_id)
            }
        }
    }
}

/// Decides the stats bucket and rewrites the result so its status and flag
/// agree with that decision. A breach signalled by either field wins.
fn classify(result: &mut AttackResult) -> Bucket {
    let status_says_breach = result.status == AttackStatus::Breached;
    if result.breached || status_says_breach {
        if result.breached != status_says_breach {
            warn!(
                "attack '{}': status '{}' disagrees with breached={}, counting as breached",
                result.attack_id, result.status, result.breached
            );
        }
        result.breached = true;
        result.status = AttackStatus::Breached;
        return Bucket::Breached;
    }

    match result.status {
        AttackStatus::Secure => Bucket::Secure,
        AttackStatus::Error => Bucket::Error,
        AttackStatus::Skipped => Bucket::Skipped,
        AttackStatus::Pending | AttackStatus::Running | AttackStatus::Breached => {
            warn!(
                "attack '{}' reached aggregation with non-terminal status '{}', counting as error",
                result.attack_id, result.status
            );
            let status = result.status;
            result.status = AttackStatus::Error;
            if result.details.error.is_none() {
                result.details.error = Some(ErrorDetail {
                    kind: ErrorKind::InvalidResult,
                    message: format!("Result still '{}' when the scan finished", status),
                });
            }
            Bucket::Error
        }
    }
}

/// Total order over results so the report does not depend on arrival order.
fn canonical_order(a: &AttackResult, b: &AttackResult) -> Ordering {
    a.attack_id
        .cmp(&b.attack_id)
        .then_with(|| a.timestamp.cmp(&b.timestamp))
        .then_with(|| a.duration_ms.cmp(&b.duration_ms))
        .then_with(|| a.status.cmp(&b.status))
        .then_with(|| a.summary.cmp(&b.summary))
        .then_with(|| {
            let a = serde_json::to_string(a).unwrap_or_default();
            let b = serde_json::to_string(b).unwrap_or_default();
            a.cmp(&b)
        })
}

fn impact_statement(category: AttackCategory, severity: Severity) -> String {
    let surface = match category {
        AttackCategory::Rls => "Row level security does not restrict access to table data",
        AttackCategory::Auth => "The authentication service accepts requests it should refuse",
        AttackCategory::Storage => "Stored files or bucket metadata are reachable without authorization",
        AttackCategory::Functions => "Edge functions can be invoked or inspected by unauthorized callers",
        AttackCategory::Realtime => "Realtime channels leak changes to unauthorized subscribers",
        AttackCategory::Vibecoder => "Privileged credentials or internals are exposed to clients",
        AttackCategory::Api => "The API surface discloses more than anonymous callers need",
        AttackCategory::Database => "Database objects can be queried or altered outside intended paths",
        AttackCategory::Unknown => "An intended security boundary was bypassed",
    };
    let urgency = match severity {
        Severity::Critical => "exploitable now and likely to expose or alter data at scale",
        Severity::High => "exploitable with little effort",
        Severity::Medium => "useful to an attacker combining it with other weaknesses",
        Severity::Low | Severity::Info | Severity::Unknown => "limited on its own",
    };
    format!("{}; {}.", surface, urgency)
}

/// Turns attack results into a [`BreachReport`].
pub struct ResultAggregator {
    fixes: Arc<dyn FixKnowledgeBase>,
    include_compliance: bool,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new(Arc::new(NoFixes))
    }
}

impl ResultAggregator {
    pub fn new(fixes: Arc<dyn FixKnowledgeBase>) -> Self {
        Self {
            fixes,
            include_compliance: false,
        }
    }

    /// Compliance summaries are only built when asked for.
    pub fn with_compliance(mut self, include: bool) -> Self {
        self.include_compliance = include;
        self
    }

    /// Folds a complete result set. Pure given its inputs.
    pub fn aggregate(
        &self,
        results: &[AttackResult],
        catalog: &VectorCatalog,
        meta: &ProjectMeta,
    ) -> BreachReport {
        let mut tally = Tally::new(catalog.clone());
        for result in results {
            tally.record(result.clone());
        }
        self.finalize(tally, meta)
    }

    /// Consumes a scan stream as its single writer, reporting each result to
    /// the sink as it arrives.
    pub async fn run(&self, mut stream: ScanStream, sink: SinkRef) -> Tally {
        let planned = stream.planned();
        let mut tally = Tally::new(stream.catalog().clone());

        sink.on_progress(0, planned);
        while let Some(result) = stream.next().await {
            sink.on_result(&result);
            tally.record(result);
            sink.on_progress(tally.len(), planned);
        }

        if tally.len() != planned {
            warn!(
                "scan planned {} result(s) but produced {}",
                planned,
                tally.len()
            );
        }
        tally
    }

    /// Writes the closing summary of a finished report to the sink.
    pub fn report_summary(report: &BreachReport, sink: &SinkRef) {
        let s = &report.stats;
        sink.on_log(
            "phase",
            &format!(
                "[*] {} attack(s): {} breached, {} secure, {} error, {} skipped",
                s.total, s.breached, s.secure, s.error, s.skipped
            ),
        );

        if report.vulnerabilities.is_empty() {
            sink.on_log("success", "[+] No vulnerabilities found.");
        } else {
            sink.on_log(
                "warn",
                &format!("[+] {} vulnerability(ies) discovered:", report.vulnerabilities.len()),
            );
            for (i, v) in report.vulnerabilities_by_severity().iter().enumerate() {
                sink.on_log(
                    "error",
                    &format!("  #{} [{}] {} ({})", i + 1, v.severity, v.title, v.attack_id),
                );
            }
        }

        let level = if report.risk_score >= 40 { "error" } else if report.risk_score > 0 { "warn" } else { "success" };
        sink.on_log(
            level,
            &format!("[+] Risk score: {}/100 ({})", report.risk_score, report.risk_level.as_str()),
        );
    }

    /// Seals a tally into a report.
    pub fn finalize(&self, tally: Tally, meta: &ProjectMeta) -> BreachReport {
        let Tally {
            catalog,
            stats,
            by_category,
            by_severity,
            mut results,
        } = tally;

        results.sort_by(canonical_order);

        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut vulnerabilities = Vec::with_capacity(stats.breached);
        for result in results.iter().filter(|r| r.breached) {
            let n = seen.entry(result.attack_id.as_str()).or_insert(0);
            *n += 1;
            let id = if *n == 1 {
                format!("vuln-{}", result.attack_id)
            } else {
                format!("vuln-{}-{}", result.attack_id, n)
            };
            let vector = catalog
                .get(&result.attack_id)
                .cloned()
                .unwrap_or_else(|| VectorMeta::unresolved(&result.attack_id));
            vulnerabilities.push(self.vulnerability(id, &vector, result));
        }

        let score = risk_score(&vulnerabilities);
        let compliance = self
            .include_compliance
            .then(|| ComplianceSummary::from_vulnerabilities(&vulnerabilities));

        debug_assert!(stats.is_balanced());
        debug_assert_eq!(vulnerabilities.len(), stats.breached);

        let duration_ms = (meta.completed_at - meta.started_at).num_milliseconds().max(0) as u64;

        BreachReport {
            id: meta.report_id.clone(),
            project_id: meta.project_id.clone(),
            project_name: meta.project_name.clone(),
            stats,
            by_category,
            by_severity,
            results,
            vulnerabilities,
            risk_score: score,
            risk_level: RiskLevel::from_score(score),
            compliance,
            started_at: meta.started_at,
            completed_at: meta.completed_at,
            duration_ms,
        }
    }

    fn vulnerability(&self, id: String, vector: &VectorMeta, result: &AttackResult) -> Vulnerability {
        let description = if vector.description.is_empty() {
            result.summary.clone()
        } else if result.summary.is_empty() {
            vector.description.clone()
        } else {
            format!("{}\n\nObserved: {}", vector.description, result.summary)
        };

        Vulnerability {
            id,
            attack_id: result.attack_id.clone(),
            category: vector.category,
            severity: vector.severity,
            title: vector.name.clone(),
            description,
            impact: impact_statement(vector.category, vector.severity),
            fix: self.fixes.lookup(&result.attack_id).unwrap_or_default(),
            evidence: result
                .evidence
                .clone()
                .or_else(|| result.details.response.clone()),
            status: VulnerabilityStatus::Open,
            discovered_at: result.timestamp,
        }
    }
}
