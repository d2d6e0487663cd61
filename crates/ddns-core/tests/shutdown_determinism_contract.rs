//! Architectural Contract Test: Shutdown Determinism
//!
//! This test verifies that shutdown is deterministic and complete.
//!
//! Constraints verified:
//! - The scheduler terminates on the shutdown signal
//! - In-flight updates are cancelled and no record is left `updating`
//! - State is flushed before exit
//! - A `Stopped` event closes the event stream
//!
//! If this test fails, someone has added:
//! - Detached background tasks
//! - Tasks that ignore cancellation
//! - Blocking operations in the shutdown path

mod common;

use common::*;
use ddns_core::{EngineEvent, ErrorKind, Scheduler, Status};
use std::time::Duration;

#[tokio::test]
async fn shutdown_signal_terminates_scheduler() {
    let config = minimal_config(&["example.com"]);
    let provider = MockDnsProvider::new(&config.records[0]);
    let engine_config = config.engine.clone();
    let h = Harness::build(config, provider, Some(ip("203.0.113.7"))).await;

    let (scheduler, _trigger) = Scheduler::new(h.engine.clone(), &engine_config);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    // Wait for startup
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(()).expect("shutdown signal send succeeds");

    let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(result.is_ok(), "Scheduler should terminate within 5 seconds");
    let run_result = result.unwrap().unwrap();
    assert!(run_result.is_ok(), "Scheduler should shut down cleanly: {:?}", run_result);
}

#[tokio::test]
async fn shutdown_flushes_state() {
    let config = minimal_config(&["example.com"]);
    let provider = MockDnsProvider::new(&config.records[0]);
    let engine_config = config.engine.clone();
    let h = Harness::build(config, provider, Some(ip("203.0.113.7"))).await;

    let (scheduler, _trigger) = Scheduler::new(h.engine.clone(), &engine_config);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(h.store.flush_count(), 1, "flush is called exactly once on shutdown");
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_updates_to_stop() {
    let config = minimal_config(&["a.example.com", "b.example.com"]);
    let provider = MockDnsProvider::new(&config.records[0]).with_delay(Duration::from_secs(30));
    let engine_config = config.engine.clone();
    let mut h = Harness::build(config, provider, Some(ip("203.0.113.7"))).await;

    let (scheduler, _trigger) = Scheduler::new(h.engine.clone(), &engine_config);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    // The immediate first tick starts both records
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.engine.any_updating());

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("shutdown does not wait for the 30s provider")
        .unwrap()
        .unwrap();

    assert!(!h.engine.any_updating());
    for snapshot in h.engine.snapshots() {
        assert_eq!(snapshot.status, Status::Fail);
    }
    assert_eq!(h.store.write_count(), 0);

    let events = h.drain_events();
    let cancelled = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::UpdateFailed { kind: ErrorKind::Cancelled, .. }))
        .count();
    assert_eq!(cancelled, 2);
    assert!(matches!(events.last(), Some(EngineEvent::Stopped { .. })));
}

#[tokio::test]
async fn dropped_shutdown_sender_also_stops_the_scheduler() {
    let config = minimal_config(&["example.com"]);
    let provider = MockDnsProvider::new(&config.records[0]);
    let engine_config = config.engine.clone();
    let h = Harness::build(config, provider, Some(ip("203.0.113.7"))).await;

    let (scheduler, _trigger) = Scheduler::new(h.engine.clone(), &engine_config);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(shutdown_tx);

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler stops when its owner goes away")
        .unwrap()
        .unwrap();
}
