//! Timing behaviour of the callback bridge under concurrent waiters and notifiers

use std::time::Duration;

use loan_review_workflow::{CallbackBridge, ReviewType, WorkflowKey, WorkflowRecord};
use tokio::time::Instant;

fn record(key: &WorkflowKey, stage: &str) -> WorkflowRecord {
    let mut record = WorkflowRecord::new(key.clone(), Some(ReviewType::SecPolicy), "System");
    record.current_stage = stage.to_string();
    record
}

#[tokio::test(start_paused = true)]
async fn notification_before_timeout_returns_the_record() {
    let bridge = CallbackBridge::new(Duration::from_secs(2));
    let key = WorkflowKey::new("REQ-7", "0000000007");

    let notifier = bridge.clone();
    let notified_key = key.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        notifier.notify_callback(&notified_key, record(&notified_key, "Loan Decision Received"));
    });

    let started = Instant::now();
    let result = bridge.wait_for_callback(&key, None).await.unwrap();

    let delivered = result.expect("record delivered before timeout");
    assert_eq!(delivered.current_stage, "Loan Decision Received");
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!bridge.has_pending_callback(&key));

    let stats = bridge.stats();
    assert_eq!(stats.registrations, 1);
    assert_eq!(stats.deliveries, 1);
    assert_eq!(stats.timeouts, 0);
}

#[tokio::test(start_paused = true)]
async fn late_notification_after_timeout_is_dropped() {
    let bridge = CallbackBridge::new(Duration::from_millis(100));
    let key = WorkflowKey::new("REQ-8", "0000000008");

    let started = Instant::now();
    assert!(bridge.wait_for_callback(&key, None).await.unwrap().is_none());
    assert!(started.elapsed() >= Duration::from_millis(100));

    assert!(!bridge.notify_callback(&key, record(&key, "late")));
    assert_eq!(bridge.pending_count(), 0);
    assert_eq!(bridge.stats().orphaned_notifications, 1);
}

#[tokio::test(start_paused = true)]
async fn waiters_on_different_keys_are_independent() {
    let bridge = CallbackBridge::new(Duration::from_secs(1));
    let first = WorkflowKey::new("REQ-1", "1111111111");
    let second = WorkflowKey::new("REQ-1", "2222222222");

    let first_wait = bridge.register(&first).unwrap();
    let second_wait = bridge.register(&second).unwrap();
    assert_eq!(bridge.pending_count(), 2);

    assert!(bridge.notify_callback(&second, record(&second, "second")));

    let (first_result, second_result) =
        tokio::join!(first_wait.wait(None), second_wait.wait(None));
    assert!(first_result.is_none());
    assert_eq!(second_result.map(|r| r.loan_number), Some("2222222222".to_string()));
}

#[tokio::test]
async fn abandoned_wait_frees_the_key_for_the_next_caller() {
    let bridge = CallbackBridge::new(Duration::from_secs(30));
    let key = WorkflowKey::new("REQ-9", "0000000009");

    let waiter = {
        let bridge = bridge.clone();
        let key = key.clone();
        tokio::spawn(async move { bridge.wait_for_callback(&key, None).await })
    };
    while !bridge.has_pending_callback(&key) {
        tokio::task::yield_now().await;
    }

    waiter.abort();
    let _ = waiter.await;

    assert!(!bridge.has_pending_callback(&key));
    assert!(bridge.register(&key).is_ok());
    assert_eq!(bridge.stats().abandoned_waits, 1);
}
