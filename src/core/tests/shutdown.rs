//! Tests for cancellation of the worker at each suspension point.

use crate::{core::state::LinkState, testing::WorkerHarness, transport::MemoryHost};
use std::time::Duration;
use tokio::time::timeout;

/// Cancelling while sleeping between connect attempts exits without another attempt.
#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff() {
    let host = MemoryHost::new();
    host.fail_next_connects(usize::MAX);
    let mut harness = WorkerHarness::spawn(host);

    while harness.host.connect_attempts() < 1 {
        tokio::task::yield_now().await;
    }
    harness.cancel.cancel();

    let exited = timeout(Duration::from_millis(1), &mut harness.task).await;
    assert!(exited.is_ok(), "worker should exit without waiting for the backoff");
    assert_eq!(*harness.state_rx.borrow(), LinkState::Stopped);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(harness.host.connect_attempts(), 1);
    assert_eq!(harness.broker.count_messages("Attempt connection"), 1);
}

/// Cancelling while waiting for a notification releases the session and exits.
#[tokio::test(start_paused = true)]
async fn test_cancel_while_waiting_for_notification() {
    let mut harness = WorkerHarness::spawn(MemoryHost::new());
    harness.wait_for_state(LinkState::Connected).await;
    harness.host.publish(true);
    harness.broker.wait_for_ptt(1).await;

    harness.cancel.cancel();
    let exited = timeout(Duration::from_millis(1), &mut harness.task).await;
    assert!(exited.is_ok(), "worker should exit without another event");

    assert_eq!(harness.host.close_count(), 1);
    assert!(!harness.host.publish(false), "session should be closed");
    assert_eq!(harness.broker.ptt(), vec![true]);
    assert_eq!(harness.host.sessions_opened(), 1);
}

/// Cancellation wins over messages that are already queued.
#[tokio::test(start_paused = true)]
async fn test_no_dispatch_after_cancel() {
    let mut harness = WorkerHarness::spawn(MemoryHost::new());
    harness.wait_for_state(LinkState::Connected).await;

    harness.host.publish(true);
    harness.host.publish(false);
    harness.cancel.cancel();

    let (host, broker) = harness.shutdown().await;
    assert!(broker.ptt().is_empty());
    assert_eq!(host.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_first_attempt() {
    let harness = WorkerHarness::spawn(MemoryHost::new());
    harness.cancel.cancel();

    let (host, broker) = harness.shutdown().await;
    assert_eq!(host.connect_attempts(), 0);
    assert!(broker.messages().is_empty());
}

/// A cancelled worker does not reconnect after a host-initiated shutdown.
#[tokio::test(start_paused = true)]
async fn test_cancel_wins_over_reconnect() {
    let mut harness = WorkerHarness::spawn(MemoryHost::new());
    harness.wait_for_state(LinkState::Connected).await;

    harness.host.quit();
    harness.cancel.cancel();

    let (host, _) = harness.shutdown().await;
    assert_eq!(host.sessions_opened(), 1);
    assert_eq!(host.close_count(), 1);
}
