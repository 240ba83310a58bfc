//! Session manager: lazy, single provisioning per identity.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{profile, FakeModelService};
use journal_insight::error::AnalysisError;
use journal_insight::session::{SessionManager, SessionMap};

fn manager(fake: &Arc<FakeModelService>) -> SessionManager {
    SessionManager::new(Arc::new(SessionMap::new()), fake.clone(), profile())
}

// ── Idempotence ──────────────────────────────────────────────

#[tokio::test]
async fn second_resolve_reuses_session() {
    let fake = Arc::new(FakeModelService::new());
    let mgr = manager(&fake);

    let first = mgr.resolve_or_create(Some("minji")).await.unwrap();
    let second = mgr.resolve_or_create(Some("minji")).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(fake.assistants_created.load(Ordering::SeqCst), 1);
    assert_eq!(fake.threads_created.load(Ordering::SeqCst), 1);
    assert_eq!(mgr.store().len(), 1);
}

#[tokio::test]
async fn identities_get_separate_sessions() {
    let fake = Arc::new(FakeModelService::new());
    let mgr = manager(&fake);

    let a = mgr.resolve_or_create(Some("a")).await.unwrap();
    let b = mgr.resolve_or_create(Some("b")).await.unwrap();

    assert_ne!(a.assistant_ref, b.assistant_ref);
    assert_ne!(a.thread_ref, b.thread_ref);
    assert_eq!(mgr.store().len(), 2);
}

#[tokio::test]
async fn missing_and_blank_identity_share_default() {
    let fake = Arc::new(FakeModelService::new());
    let mgr = manager(&fake);

    let none = mgr.resolve_or_create(None).await.unwrap();
    let blank = mgr.resolve_or_create(Some("  ")).await.unwrap();
    let named = mgr.resolve_or_create(Some("default")).await.unwrap();

    assert_eq!(none, blank);
    assert_eq!(none, named);
    assert_eq!(fake.assistants_created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn lookup_does_not_provision() {
    let fake = Arc::new(FakeModelService::new());
    let mgr = manager(&fake);

    assert!(mgr.lookup(Some("minji")).is_none());
    assert_eq!(fake.assistant_attempts.load(Ordering::SeqCst), 0);

    let record = mgr.resolve_or_create(Some("minji")).await.unwrap();
    assert_eq!(mgr.lookup(Some("minji")), Some(record));
}

// ── Concurrency ──────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_calls_provision_once() {
    let fake = Arc::new(FakeModelService::new().with_provision_delay(Duration::from_millis(50)));
    let mgr = Arc::new(manager(&fake));

    let tasks = (0..16).map(|_| {
        let mgr = mgr.clone();
        tokio::spawn(async move { mgr.resolve_or_create(Some("same-user")).await })
    });
    let results = futures_util::future::join_all(tasks).await;

    let records: Vec<_> = results
        .into_iter()
        .map(|r| r.expect("task panicked").expect("provisioning failed"))
        .collect();

    assert_eq!(fake.assistant_attempts.load(Ordering::SeqCst), 1);
    assert_eq!(fake.threads_created.load(Ordering::SeqCst), 1);
    assert!(records.windows(2).all(|w| w[0] == w[1]));
}

// ── Failure ──────────────────────────────────────────────────

#[tokio::test]
async fn failed_provisioning_stores_nothing_and_retry_succeeds() {
    let fake = Arc::new(FakeModelService::new().failing_provisioning(1));
    let mgr = manager(&fake);

    let err = mgr.resolve_or_create(Some("minji")).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Provisioning(_)));
    assert_eq!(err.kind(), "provisioning");
    assert!(err.to_string().contains("500"));
    assert!(mgr.lookup(Some("minji")).is_none());
    assert!(mgr.store().is_empty());

    let record = mgr.resolve_or_create(Some("minji")).await.unwrap();
    assert_eq!(record.assistant_ref.as_str(), "asst_1");
    assert_eq!(fake.assistant_attempts.load(Ordering::SeqCst), 2);
    assert_eq!(mgr.store().len(), 1);
}
