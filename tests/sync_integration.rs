// tests/sync_integration.rs

//! Reconciliation and hydration against an in-memory remote, through the
//! public library API only.

mod common;

use arcade::{BundleId, BundleStore, HydrateOutcome, Hydrator, MemoryStore, Reconciler, SyncConfig};
use axum::http::StatusCode;
use common::{TestServer, body_bytes, get};
use std::sync::Arc;
use tower::ServiceExt;

fn seed_bundle(remote: &MemoryStore, files: &[(&str, &str)]) -> BundleId {
    let id = BundleId::new();
    for (relative, data) in files {
        remote.insert(&id.remote_key(relative), *data);
    }
    id
}

#[tokio::test]
async fn test_reconcile_then_serve_without_miss() {
    let remote = MemoryStore::with_page_size(3);
    let complete = seed_bundle(
        &remote,
        &[("index.html", "<html/>"), ("a.js", "a"), ("img/b.png", "b")],
    );
    let partial = seed_bundle(&remote, &[("a.js", "a")]);

    let server = TestServer::with_remote(remote);
    let report = server.state.reconciler.reconcile_all().await.unwrap();
    assert_eq!(report.bundles_seen, 2);
    assert_eq!(report.synced, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.files_downloaded, 3);

    assert!(server.state.store.is_complete(&complete));
    assert!(!server.state.store.exists(&partial));

    let response = server
        .router()
        .oneshot(get(&format!("/play/{complete}/img/b.png")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"b");
    assert_eq!(server.state.metrics.snapshot().misses, 0);
}

#[tokio::test]
async fn test_reconcile_is_idempotent_across_restarts() {
    let temp = tempfile::tempdir().unwrap();
    let remote = Arc::new(MemoryStore::new());
    let id = seed_bundle(&remote, &[("index.html", "v1"), ("data.bin", "1234")]);

    let first = Reconciler::new(
        BundleStore::open(temp.path()).unwrap(),
        remote.clone(),
        SyncConfig::default(),
    );
    assert_eq!(first.reconcile_all().await.unwrap().synced, 1);

    // A newer remote copy never replaces what is already on disk
    remote.insert(&id.marker_key(), "v2");
    let gets_before = remote.op_counts().gets;

    let second = Reconciler::new(
        BundleStore::open(temp.path()).unwrap(),
        remote.clone(),
        SyncConfig::default(),
    );
    let report = second.reconcile_all().await.unwrap();
    assert_eq!(report.files_downloaded, 0);
    assert_eq!(report.files_present, 2);
    assert_eq!(remote.op_counts().gets, gets_before);

    let store = BundleStore::open(temp.path()).unwrap();
    let index = std::fs::read_to_string(store.path(&id, "index.html").unwrap()).unwrap();
    assert_eq!(index, "v1");
}

#[tokio::test]
async fn test_hydrator_shares_one_pull() {
    let temp = tempfile::tempdir().unwrap();
    let remote = Arc::new(MemoryStore::new());
    let id = seed_bundle(&remote, &[("index.html", "<html/>"), ("a.js", "a")]);

    let hydrator = Arc::new(Hydrator::new(
        BundleStore::open(temp.path()).unwrap(),
        remote.clone(),
        SyncConfig::default(),
    ));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let hydrator = hydrator.clone();
            tokio::spawn(async move { hydrator.hydrate(id).await })
        })
        .collect();

    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert!(matches!(
            outcome,
            HydrateOutcome::Hydrated { .. } | HydrateOutcome::AlreadyPresent
        ));
    }

    assert_eq!(remote.op_counts().gets, 2);
    assert!(BundleStore::open(temp.path()).unwrap().is_complete(&id));
}
