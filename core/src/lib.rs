pub mod attack;
pub mod classify;
pub mod core;
pub mod error;
pub mod export;
pub mod fixes;
pub mod http;
pub mod modules;
pub mod utils;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

pub use crate::attack::{
    AttackCategory, AttackContext, AttackResult, AttackStatus, AttackVector, CancelSignal,
    ErrorKind, Severity, TargetConfig, VectorMeta,
};
pub use crate::classify::{risk_score, ComplianceSummary, Framework, RiskLevel};
pub use crate::core::engine::{ScanEngine, ScanStream};
pub use crate::core::playbook::{AttackPlaybook, PlaybookFilter, VectorCatalog};
pub use crate::core::report::{BreachReport, ProjectMeta, ScanStats, Vulnerability};
pub use crate::core::result_aggregator::{ResultAggregator, Tally};
pub use crate::error::{ExportError, ScanError};
pub use crate::export::ExportFormat;
pub use crate::fixes::{FixKnowledgeBase, FixRecommendation, NoFixes, StaticFixes};
pub use crate::http::HttpOptions;

/// Engine settings shared by every front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Maximum number of probes in flight at once.
    pub concurrency: usize,
    pub probe_timeout_ms: u64,
    /// How long in-flight probes may keep running after cancellation.
    pub grace_period_ms: u64,
    pub scan_deadline_ms: Option<u64>,
    pub include_compliance: bool,
    /// Treat a playbook that selects nothing as a configuration error.
    pub require_vectors: bool,
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            probe_timeout_ms: 30_000,
            grace_period_ms: 2_000,
            scan_deadline_ms: None,
            include_compliance: false,
            require_vectors: false,
            channel_capacity: 100,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.concurrency == 0 {
            return Err(ScanError::InvalidConfig("concurrency must be at least 1".into()));
        }
        if self.probe_timeout_ms == 0 {
            return Err(ScanError::InvalidConfig("probe timeout must be positive".into()));
        }
        if self.scan_deadline_ms == Some(0) {
            return Err(ScanError::InvalidConfig("scan deadline must be positive".into()));
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn scan_deadline(&self) -> Option<Duration> {
        self.scan_deadline_ms.map(Duration::from_millis)
    }
}

/// On-disk scan configuration: engine, transport and playbook filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanConfig {
    pub engine: EngineConfig,
    pub http: HttpOptions,
    pub filter: PlaybookFilter,
}

impl ScanConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: ScanConfig = serde_json::from_str(&data)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.engine.validate()?;
        Ok(config)
    }
}

/// Output abstraction for a running scan.
/// The CLI implements it with coloured output and a progress bar.
pub trait ScanEventSink: Send + Sync {
    fn on_log(&self, level: &str, message: &str);
    fn on_result(&self, result: &AttackResult);
    fn on_progress(&self, done: usize, total: usize);
}

pub type SinkRef = Arc<dyn ScanEventSink>;

/// Terminal output sink.
pub struct ConsoleSink {
    verbose: bool,
}

impl ConsoleSink {
    pub fn new_ref(verbose: bool) -> SinkRef {
        Arc::new(Self { verbose })
    }
}

impl ScanEventSink for ConsoleSink {
    fn on_log(&self, level: &str, message: &str) {
        use colored::*;
        let colored = match level {
            "success" => message.green().to_string(),
            "error" => message.red().to_string(),
            "warn" => message.yellow().to_string(),
            "phase" => message.bright_cyan().bold().to_string(),
            _ => message.to_string(),
        };
        println!("{}", colored);
    }

    fn on_result(&self, result: &AttackResult) {
        use colored::*;
        let label = match result.status {
            AttackStatus::Breached => "[BREACHED]".red().bold(),
            AttackStatus::Secure => "[SECURE]  ".green(),
            AttackStatus::Error => "[ERROR]   ".yellow(),
            AttackStatus::Skipped => "[SKIPPED] ".dimmed(),
            AttackStatus::Pending | AttackStatus::Running => "[?]       ".dimmed(),
        };
        if result.status == AttackStatus::Secure && !self.verbose {
            return;
        }
        println!(
            "{} {} {} {}",
            label,
            result.attack_id.white().bold(),
            result.summary,
            format!("({}ms)", result.duration_ms).dimmed()
        );
    }

    fn on_progress(&self, done: usize, total: usize) {
        use colored::*;
        if self.verbose && total > 0 {
            println!("{}", format!("[*] {}/{} attacks finished", done, total).bright_cyan());
        }
    }
}

/// Sink that discards everything. Useful for library callers and tests.
pub struct SilentSink;

impl SilentSink {
    pub fn new_ref() -> SinkRef {
        Arc::new(Self)
    }
}

impl ScanEventSink for SilentSink {
    fn on_log(&self, _level: &str, _message: &str) {}
    fn on_result(&self, _result: &AttackResult) {}
    fn on_progress(&self, _done: usize, _total: usize) {}
}
