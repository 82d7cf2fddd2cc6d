//! Contract Test: Idempotency & Request-Level Failure
//!
//! Constraints verified:
//! - A second run against unchanged upstream state writes nothing
//! - A store read failure aborts the run before any CRM call

mod common;

use common::*;

#[tokio::test]
async fn second_run_issues_no_patches() {
    let crm = ScriptedCrm::new()
        .with_subscriptions("k", vec![subscription("s-1", false)])
        .with_users("k", "Alice", vec![user("ext-1", "Alice")])
        .with_users("k", "Bob", vec![user("ext-2", "Bob")]);
    let store = RecordingStore::new();
    store
        .seed(site("acme", "k", "s-1", &[("u1", "Alice"), ("u2", "Bob")]))
        .await;

    let reconciler = reconciler(&crm, &store);

    reconciler.run().await.unwrap();
    assert_eq!(store.patches().len(), 2, "first run grants both users");

    store.clear_patches();
    let (_, outcome) = reconciler.run().await.unwrap();

    assert!(store.patches().is_empty(), "second run must not write");
    assert!(outcome.successes.is_empty());
    assert!(outcome.failures.is_empty());
}

#[tokio::test]
async fn replaced_subscription_is_not_replaced_again() {
    // The CRM still lists the old banned subscription, but the record now
    // points at the replacement
    let crm = ScriptedCrm::new()
        .with_subscriptions("k", vec![subscription("s-1", true), subscription("s-2", false)])
        .with_created_id("k", "s-2")
        .with_users("k", "Alice", vec![user("ext-1", "Alice")]);
    let store = RecordingStore::new();
    store.seed(site("acme", "k", "s-1", &[("u1", "Alice")])).await;

    let reconciler = reconciler(&crm, &store);
    reconciler.run().await.unwrap();
    assert_eq!(crm.create_calls("k"), 1);

    store.clear_patches();
    reconciler.run().await.unwrap();

    assert_eq!(crm.create_calls("k"), 1, "no second creation");
    assert!(store.patches().is_empty());
}

#[tokio::test]
async fn store_read_failure_aborts_before_crm_calls() {
    let crm = ScriptedCrm::new();
    let store = RecordingStore::new();
    store.seed(site("acme", "k", "s-1", &[("u1", "Alice")])).await;
    store.fail_reads();

    let result = reconciler(&crm, &store).run().await;

    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("permission denied"));
    assert_eq!(store.list_call_count(), 1);
    assert_eq!(crm.total_calls(), 0);
}
