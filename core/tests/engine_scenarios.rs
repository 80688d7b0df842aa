mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use breachkit_core::{
    AttackCategory, AttackResult, AttackStatus, CancelSignal, EngineConfig, ErrorKind,
    PlaybookFilter, ProjectMeta, ResultAggregator, ScanEngine, ScanError, ScanStream, Severity,
    SilentSink,
};

use common::{context, playbook, Gauge, MockVector, Outcome};

fn engine(concurrency: usize) -> ScanEngine {
    ScanEngine::new(EngineConfig { concurrency, ..Default::default() }).unwrap()
}

async fn drain(mut stream: ScanStream) -> Vec<AttackResult> {
    let mut results = Vec::new();
    while let Some(result) = stream.next_result().await {
        results.push(result);
    }
    results
}

fn find<'a>(results: &'a [AttackResult], id: &str) -> &'a AttackResult {
    results
        .iter()
        .find(|r| r.attack_id == id)
        .unwrap_or_else(|| panic!("no result for {}", id))
}

#[tokio::test]
async fn test_cancel_mid_scan_skips_unstarted() {
    let mut vectors = vec![
        MockVector::new("fast-0").delay(Duration::from_millis(10)).arc(),
        MockVector::new("fast-1").delay(Duration::from_millis(10)).arc(),
    ];
    for i in 2..10 {
        vectors.push(
            MockVector::new(format!("slow-{}", i))
                .delay(Duration::from_secs(5))
                .cancel_aware()
                .arc(),
        );
    }

    let ctx = Arc::new(context());
    let mut stream = engine(3).run(&playbook(vectors), Arc::clone(&ctx)).unwrap();
    assert_eq!(stream.planned(), 10);

    let mut results = Vec::new();
    while let Some(result) = stream.next_result().await {
        results.push(result);
        if results.len() == 2 {
            stream.cancel_signal().cancel();
        }
    }

    assert_eq!(results.len(), 10);
    let ids: HashSet<_> = results.iter().map(|r| r.attack_id.clone()).collect();
    assert_eq!(ids.len(), 10);

    let skipped = results.iter().filter(|r| r.status == AttackStatus::Skipped).count();
    assert!(skipped >= 5, "only {} skipped", skipped);
    assert!(results.iter().all(|r| r.status.is_terminal()));
    // The scan signal is a child; the caller's root signal is untouched.
    assert!(!ctx.cancel().is_cancelled());
}

#[tokio::test]
async fn test_pre_cancelled_root_skips_everything() {
    let root = CancelSignal::new();
    root.cancel();
    let ctx = Arc::new(context().cancel_signal(root));
    let vectors = (0..4).map(|i| MockVector::new(format!("v{}", i)).arc()).collect();

    let results = drain(engine(2).run(&playbook(vectors), ctx).unwrap()).await;
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.status == AttackStatus::Skipped));
}

#[tokio::test(start_paused = true)]
async fn test_hanging_probe_times_out() {
    let config = EngineConfig { probe_timeout_ms: 50, ..Default::default() };
    let vectors = vec![
        MockVector::new("hang").hang().arc(),
        MockVector::new("ok").arc(),
    ];
    let stream = ScanEngine::new(config)
        .unwrap()
        .run(&playbook(vectors), Arc::new(context()))
        .unwrap();
    let results = drain(stream).await;

    let hang = find(&results, "hang");
    assert_eq!(hang.status, AttackStatus::Error);
    assert_eq!(hang.error_kind(), Some(ErrorKind::Timeout));
    assert_eq!(find(&results, "ok").status, AttackStatus::Secure);
}

#[tokio::test]
async fn test_panic_is_isolated() {
    let vectors = vec![
        MockVector::new("before").arc(),
        MockVector::new("boom").outcome(Outcome::Panic).arc(),
        MockVector::new("after").outcome(Outcome::Breach).arc(),
    ];
    let results = drain(engine(1).run(&playbook(vectors), Arc::new(context())).unwrap()).await;

    assert_eq!(results.len(), 3);
    let boom = find(&results, "boom");
    assert_eq!(boom.error_kind(), Some(ErrorKind::Panic));
    assert!(boom.summary.contains("exploded"));
    assert_eq!(find(&results, "before").status, AttackStatus::Secure);
    assert!(find(&results, "after").breached);
}

#[tokio::test]
async fn test_non_terminal_result_becomes_error() {
    let vectors = vec![MockVector::new("lazy").outcome(Outcome::Pending).arc()];
    let results = drain(engine(1).run(&playbook(vectors), Arc::new(context())).unwrap()).await;
    assert_eq!(results[0].status, AttackStatus::Error);
    assert_eq!(results[0].error_kind(), Some(ErrorKind::InvalidResult));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_large_playbook_is_complete_and_bounded() {
    for _ in 0..3 {
        let gauge = Arc::new(Gauge::default());
        let vectors = (0..100)
            .map(|i| {
                MockVector::new(format!("v{:03}", i))
                    .delay(Duration::from_millis((i % 7) as u64))
                    .outcome(if i % 10 == 0 { Outcome::Breach } else { Outcome::Secure })
                    .gauge(Arc::clone(&gauge))
                    .arc()
            })
            .collect();
        let results = drain(engine(16).run(&playbook(vectors), Arc::new(context())).unwrap()).await;

        assert_eq!(results.len(), 100);
        let ids: HashSet<_> = results.iter().map(|r| r.attack_id.as_str()).collect();
        assert_eq!(ids.len(), 100);
        assert!(gauge.peak() <= 16, "peak concurrency {}", gauge.peak());
        assert_eq!(results.iter().filter(|r| r.breached).count(), 10);
    }
}

#[tokio::test(start_paused = true)]
async fn test_deadline_cancels_scan() {
    let config = EngineConfig {
        concurrency: 1,
        probe_timeout_ms: 10_000,
        grace_period_ms: 20,
        scan_deadline_ms: Some(100),
        ..Default::default()
    };
    let vectors = vec![
        MockVector::new("a-fast").delay(Duration::from_millis(10)).arc(),
        MockVector::new("b-stuck").hang().arc(),
        MockVector::new("c-never").arc(),
        MockVector::new("d-never").arc(),
    ];
    let results = drain(
        ScanEngine::new(config)
            .unwrap()
            .run(&playbook(vectors), Arc::new(context()))
            .unwrap(),
    )
    .await;

    assert_eq!(results.len(), 4);
    assert_eq!(find(&results, "a-fast").status, AttackStatus::Secure);
    assert_eq!(find(&results, "b-stuck").error_kind(), Some(ErrorKind::Cancelled));
    assert_eq!(find(&results, "c-never").status, AttackStatus::Skipped);
    assert_eq!(find(&results, "d-never").status, AttackStatus::Skipped);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_aware_probe_finishes_within_grace() {
    let config = EngineConfig { concurrency: 2, grace_period_ms: 500, ..Default::default() };
    let vectors = vec![MockVector::new("polite").delay(Duration::from_secs(60)).cancel_aware().arc()];
    let stream = ScanEngine::new(config)
        .unwrap()
        .run(&playbook(vectors), Arc::new(context()))
        .unwrap();
    let signal = stream.cancel_signal();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.cancel();
    });

    let results = drain(stream).await;
    assert_eq!(results[0].status, AttackStatus::Secure);
    assert_eq!(results[0].summary, "stopped early on cancellation");
}

#[tokio::test]
async fn test_empty_selection() {
    let vectors = vec![MockVector::new("rls").classified(AttackCategory::Rls, Severity::High).arc()];
    let filtered = playbook(vectors).with_filter(PlaybookFilter {
        categories: vec![AttackCategory::Storage],
        ..Default::default()
    });

    let stream = engine(4).run(&filtered, Arc::new(context())).unwrap();
    assert_eq!(stream.planned(), 0);
    let aggregator = ResultAggregator::default();
    let tally = aggregator.run(stream, SilentSink::new_ref()).await;
    let report = aggregator.finalize(tally, &ProjectMeta::start("p", "Empty"));
    assert_eq!(report.stats.total, 0);
    assert_eq!(report.risk_score, 0);
    assert!(report.vulnerabilities.is_empty());

    let strict = ScanEngine::new(EngineConfig { require_vectors: true, ..Default::default() }).unwrap();
    match strict.run(&filtered, Arc::new(context())) {
        Err(ScanError::EmptyPlaybook(name)) => assert_eq!(name, "test"),
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("expected EmptyPlaybook"),
    }
}

#[tokio::test]
async fn test_streamed_aggregation_matches_batch() {
    let vectors = vec![
        MockVector::new("rls-1").classified(AttackCategory::Rls, Severity::Critical).outcome(Outcome::Breach).arc(),
        MockVector::new("auth-1").classified(AttackCategory::Auth, Severity::Medium).arc(),
        MockVector::new("st-1").classified(AttackCategory::Storage, Severity::High).outcome(Outcome::Breach).arc(),
    ];
    let pb = playbook(vectors);
    let stream = engine(3).run(&pb, Arc::new(context())).unwrap();
    let aggregator = ResultAggregator::default().with_compliance(true);
    let tally = aggregator.run(stream, SilentSink::new_ref()).await;
    assert_eq!(tally.len(), 3);

    let meta = ProjectMeta::start("p", "Demo").complete();
    let results = {
        let report = aggregator.finalize(tally, &meta);
        assert_eq!(report.stats.breached, 2);
        assert_eq!(report.vulnerabilities.len(), 2);
        assert_eq!(report.risk_score, 60);
        assert_eq!(report.compliance.as_ref().unwrap().owasp.get("A01:2021"), Some(&2));
        report.results.clone()
    };

    let again = aggregator.aggregate(&results, &pb.catalog(), &meta);
    assert_eq!(again.results, results);
    assert_eq!(again.stats.breached, 2);
}
