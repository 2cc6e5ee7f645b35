//! Action/result channel tests

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cluster_repair_live::backend::Backend;
use cluster_repair_live::channel::{self, ActionChannel, ResultChannel};
use cluster_repair_live::error::DashboardError;
use cluster_repair_live::models::{NewSubscription, Subscription, SubscriptionCriteria};
use cluster_repair_live::session::SessionGate;
use common::FakeBackend;

/// Channel doubling its input, counting every call made
fn doubling() -> (ActionChannel<u32>, ResultChannel<u32, u32>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let (action, result) = channel::pair("double", 16, SessionGate::ungated(), move |n: u32| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok::<_, DashboardError>(n * 2) }
    });
    (action, result, calls)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test(start_paused = true)]
async fn test_no_call_without_observers() {
    let (action, result, calls) = doubling();

    action.push(1);
    action.push(2);
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.issued_calls(), 0);
    assert!(result.latest().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_outcome_reaches_observer_with_its_intent() {
    let (action, result, calls) = doubling();
    let mut observer = result.subscribe();

    action.push(21);
    let outcome = observer.recv().await.unwrap();

    assert_eq!(outcome.intent, 21);
    assert_eq!(outcome.value(), Some(&42));
    assert_eq!(outcome.seq, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.latest().map(|o| o.seq), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_multicast_shares_one_call() {
    let (action, result, calls) = doubling();
    let mut first = result.subscribe();
    let mut second = result.subscribe();
    assert_eq!(result.observer_count(), 2);

    action.push(5);
    let a = first.recv().await.unwrap();
    let b = second.recv().await.unwrap();

    assert_eq!(a.seq, b.seq);
    assert_eq!(a.value(), Some(&10));
    assert_eq!(b.value(), Some(&10));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reattach_does_not_replay_skipped_intents() {
    let (action, result, calls) = doubling();

    let mut observer = result.subscribe();
    action.push(1);
    observer.recv().await.unwrap();
    drop(observer);

    action.push(2);
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let mut observer = result.subscribe();
    action.push(3);
    let outcome = observer.recv().await.unwrap();

    assert_eq!(outcome.intent, 3);
    assert_eq!(outcome.seq, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(result.issued_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failure_is_an_outcome() {
    let (action, result) = channel::pair("failing", 16, SessionGate::ungated(), |_: ()| async {
        Err::<(), _>(DashboardError::transport("connection refused"))
    });
    let mut observer = result.subscribe();

    action.push(());
    let outcome = observer.recv().await.unwrap();

    assert!(!outcome.is_ok());
    assert!(matches!(outcome.error(), Some(DashboardError::Transport { status: None, .. })));

    // The channel keeps serving after a failure
    action.push(());
    assert!(observer.recv().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_adds_correlate_by_intent() {
    let backend = FakeBackend::new();
    backend.set_delay("add_subscription:slow", Duration::from_millis(500));
    backend.set_delay("add_subscription:fast", Duration::from_millis(10));

    let shared: Arc<dyn Backend> = Arc::new(backend.clone());
    let (action, result) = channel::pair("add_subscription", 16, SessionGate::ungated(), move |request: NewSubscription| {
        shared.add_subscription(&request)
    });
    let mut observer = result.subscribe();

    action.push(NewSubscription::new("slow", SubscriptionCriteria::default()));
    action.push(NewSubscription::new("fast", SubscriptionCriteria::default()));

    let first = observer.recv().await.unwrap();
    let second = observer.recv().await.unwrap();

    // Completion order differs from push order
    assert_eq!(first.intent.cluster.as_str(), "fast");
    assert_eq!(second.intent.cluster.as_str(), "slow");
    for outcome in [&first, &second] {
        let created: &Subscription = outcome.value().unwrap();
        assert_eq!(created.cluster, outcome.intent.cluster);
    }
    assert!(first.seq > second.seq);
    assert_eq!(backend.calls("add_subscription"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stream_view_of_observer() {
    use futures::StreamExt;

    let (action, result, _) = doubling();
    let outcomes = result.subscribe().into_stream();

    action.push(1);
    action.push(2);

    let values: Vec<u32> = outcomes
        .take(2)
        .map(|o| *o.value().unwrap())
        .collect()
        .await;
    let mut sorted = values.clone();
    sorted.sort();
    assert_eq!(sorted, vec![2, 4]);
}
