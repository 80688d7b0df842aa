#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use breachkit_core::{
    AttackCategory, AttackContext, AttackPlaybook, AttackResult, AttackStatus, AttackVector,
    CancelSignal, Severity, TargetConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Secure,
    Breach,
    Panic,
    /// Returns a result still marked pending.
    Pending,
}

/// Tracks how many mock probes run at once.
#[derive(Debug, Default)]
pub struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a Gauge);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.leave();
    }
}

pub struct MockVector {
    pub id: String,
    pub category: AttackCategory,
    pub severity: Severity,
    pub tags: Vec<String>,
    pub delay: Duration,
    pub outcome: Outcome,
    /// Stops waiting and reports secure once the scan is cancelled.
    pub cancel_aware: bool,
    pub gauge: Option<Arc<Gauge>>,
}

impl MockVector {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category: AttackCategory::Rls,
            severity: Severity::High,
            tags: Vec::new(),
            delay: Duration::ZERO,
            outcome: Outcome::Secure,
            cancel_aware: false,
            gauge: None,
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn classified(mut self, category: AttackCategory, severity: Severity) -> Self {
        self.category = category;
        self.severity = severity;
        self
    }

    pub fn cancel_aware(mut self) -> Self {
        self.cancel_aware = true;
        self
    }

    /// Sleeps for an hour and ignores cancellation.
    pub fn hang(self) -> Self {
        self.delay(Duration::from_secs(3600))
    }

    pub fn gauge(mut self, gauge: Arc<Gauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    pub fn arc(self) -> Arc<dyn AttackVector> {
        Arc::new(self)
    }
}

#[async_trait]
impl AttackVector for MockVector {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        "mock"
    }

    fn category(&self) -> AttackCategory {
        self.category
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    async fn execute(&self, _ctx: &AttackContext, cancel: &CancelSignal) -> AttackResult {
        if let Some(g) = &self.gauge {
            g.enter();
        }
        let _in_flight = self.gauge.as_deref().map(InFlight);

        if !self.delay.is_zero() {
            if self.cancel_aware {
                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => {}
                    _ = cancel.cancelled() => {
                        return AttackResult::secure(&self.id, "stopped early on cancellation");
                    }
                }
            } else {
                tokio::time::sleep(self.delay).await;
            }
        }

        match self.outcome {
            Outcome::Secure => AttackResult::secure(&self.id, "held"),
            Outcome::Breach => AttackResult::breached(&self.id, "broke through"),
            Outcome::Panic => panic!("mock probe {} exploded", self.id),
            Outcome::Pending => {
                let mut result = AttackResult::secure(&self.id, "not done");
                result.status = AttackStatus::Pending;
                result
            }
        }
    }
}

pub fn playbook(vectors: Vec<Arc<dyn AttackVector>>) -> AttackPlaybook {
    AttackPlaybook::new("test").with_vectors(vectors)
}

pub fn context() -> AttackContext {
    let _ = env_logger::builder().is_test(true).try_init();
    AttackContext::new(TargetConfig {
        url: "https://demo.example.co".to_string(),
        anon_key: "anon".to_string(),
        service_key: None,
    })
    .expect("valid target")
}
