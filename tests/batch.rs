//! Batch publication: isolated failures, input order, spacing

use std::sync::Arc;
use std::time::{Duration, Instant};

use docanchor::backend::{
    FaultConfig, MemoryContentStore, MemoryLedger, MemoryPinningService, Operation,
};
use docanchor::{Artifact, Backends, BatchSummary, ErrorKind, Publisher, PublisherConfig, Stage};

fn artifacts(n: usize) -> Vec<Artifact> {
    (0..n)
        .map(|i| Artifact::new(format!("doc-{}.txt", i), format!("content {}", i)))
        .collect()
}

fn publisher_with(store: Arc<MemoryContentStore>, ledger: Arc<MemoryLedger>) -> Publisher {
    let backends = Backends::new(store, Arc::new(MemoryPinningService::new()), ledger);
    Publisher::new(PublisherConfig::default().without_spacing(), backends).unwrap()
}

#[test]
fn test_failure_at_k_is_isolated() {
    let store = Arc::new(MemoryContentStore::new());
    let ledger = Arc::new(MemoryLedger::new());
    let publisher = publisher_with(store.clone(), ledger.clone());

    // Uploads 0 and 1 go through, the third fails once
    store.inject(
        Operation::Put,
        FaultConfig::unavailable("rate limited").after(2).with_fail_count(1),
    );
    let outcomes = publisher.publish_all(artifacts(5));

    assert_eq!(outcomes.len(), 5);
    let err = outcomes[2].as_ref().unwrap_err();
    assert_eq!(err.index, 2);
    assert_eq!(err.name, "doc-2.txt");
    assert_eq!(err.stage(), Stage::Upload);
    assert_eq!(err.kind(), ErrorKind::TransientNetworkError);

    let published: Vec<&str> = outcomes
        .iter()
        .filter_map(|o| o.as_ref().ok())
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(published, vec!["doc-0.txt", "doc-1.txt", "doc-3.txt", "doc-4.txt"]);

    let manifest = publisher.finish();
    let manifest_names: Vec<&str> = manifest.entries().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        manifest_names,
        vec!["doc-0.txt", "doc-1.txt", "doc-3.txt", "doc-4.txt"]
    );
    assert_eq!(store.put_calls(), 5);
    assert_eq!(ledger.len(), 4);
}

#[test]
fn test_anchor_failure_in_middle_of_batch() {
    let store = Arc::new(MemoryContentStore::new());
    let ledger = Arc::new(MemoryLedger::new());
    let publisher = publisher_with(store, ledger.clone());

    ledger.inject(
        Operation::Anchor,
        FaultConfig::rejected("execution reverted").after(1).with_fail_count(1),
    );
    let outcomes = publisher.publish_all(artifacts(3));

    let summary = BatchSummary::from_outcomes(&outcomes);
    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.published, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.exit_code, 50);
    assert!(!summary.is_success());

    let err = outcomes[1].as_ref().unwrap_err();
    assert_eq!(err.index, 1);
    assert_eq!(err.stage(), Stage::Anchor);
    assert_eq!(outcomes[2].as_ref().unwrap().document_id(), 2);

    let manifest = publisher.finish();
    let ids: Vec<(&str, u64)> = manifest
        .entries()
        .iter()
        .map(|e| (e.name.as_str(), e.document_id))
        .collect();
    assert_eq!(ids, vec![("doc-0.txt", 1), ("doc-2.txt", 2)]);
}

#[test]
fn test_summary_counts_degraded_publications() {
    let store = Arc::new(MemoryContentStore::new());
    let pins = Arc::new(MemoryPinningService::new());
    let ledger = Arc::new(MemoryLedger::new());
    pins.inject(Operation::Pin, FaultConfig::unavailable("down").with_fail_count(1));
    ledger.inject(Operation::LookupByCid, FaultConfig::absent().with_fail_count(2));

    let backends = Backends::new(store, pins, ledger);
    let publisher =
        Publisher::new(PublisherConfig::default().without_spacing(), backends).unwrap();

    let outcomes = publisher.publish_all(artifacts(3));
    let summary = BatchSummary::from_outcomes(&outcomes);

    assert!(summary.is_success());
    assert_eq!(summary.unpinned, 1);
    assert_eq!(summary.unconfirmed, 2);
    assert_eq!(
        summary.human_summary,
        "Published 3/3 artifacts (1 unpinned, 2 awaiting ledger confirmation)"
    );
}

#[test]
fn test_spacing_between_artifacts_only() {
    let backends = Backends::new(
        Arc::new(MemoryContentStore::new()),
        Arc::new(MemoryPinningService::new()),
        Arc::new(MemoryLedger::new()),
    );
    let mut config = PublisherConfig::default();
    config.batch.spacing_ms = 30;
    let publisher = Publisher::new(config, backends).unwrap();

    let started = Instant::now();
    let outcomes = publisher.publish_all(artifacts(3));
    let elapsed = started.elapsed();

    assert_eq!(outcomes.len(), 3);
    // Two gaps for three artifacts
    assert!(elapsed >= Duration::from_millis(60));

    let started = Instant::now();
    publisher.publish_all(artifacts(1));
    assert!(started.elapsed() < Duration::from_millis(30));
}

#[test]
fn test_empty_batch() {
    let publisher = publisher_with(
        Arc::new(MemoryContentStore::new()),
        Arc::new(MemoryLedger::new()),
    );
    assert!(publisher.publish_all(Vec::new()).is_empty());
}
