//! Architectural Contract Test: Scheduling & Events
//!
//! Constraints verified:
//! - The scheduler runs a cycle immediately on start
//! - Manual triggers start a cycle; triggers and ticks arriving while a
//!   cycle is running are coalesced, never queued behind it
//! - Each record publishes `UpdateStarted` then exactly one terminal event,
//!   and each cycle closes with `CycleCompleted`
//!
//! If this test fails, someone has added queued cycles, overlapping
//! `update_all` calls, or lost events.

mod common;

use common::*;
use ddns_core::{Cancellation, EngineEvent, Scheduler};
use std::time::Duration;

fn cycles(events: &[EngineEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, EngineEvent::CycleCompleted { .. }))
        .count()
}

#[tokio::test]
async fn first_cycle_runs_on_start() {
    let config = minimal_config(&["example.com"]);
    let provider = MockDnsProvider::new(&config.records[0]);
    let engine_config = config.engine.clone();
    let mut h = Harness::build(config, provider, Some(ip("203.0.113.7"))).await;

    let (scheduler, _trigger) = Scheduler::new(h.engine.clone(), &engine_config);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    let events = h.drain_events();
    assert!(matches!(events.first(), Some(EngineEvent::Started { records_count: 1 })));
    assert_eq!(cycles(&events), 1);
    assert_eq!(h.provider.update_call_count(), 1);
}

#[tokio::test]
async fn manual_trigger_starts_a_cycle() {
    let config = minimal_config(&["example.com"]);
    let provider = MockDnsProvider::new(&config.records[0]);
    let engine_config = config.engine.clone();
    let mut h = Harness::build(config, provider, Some(ip("203.0.113.7"))).await;

    let (scheduler, trigger) = Scheduler::new(h.engine.clone(), &engine_config);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(200)).await;
    h.source.set(Some(ip("203.0.113.8")));
    assert!(trigger.request());
    tokio::time::sleep(Duration::from_millis(200)).await;

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(cycles(&h.drain_events()), 2);
    assert_eq!(h.provider.update_call_count(), 2);
    assert_eq!(h.engine.snapshots()[0].current_ip, Some(ip("203.0.113.8")));
}

#[tokio::test]
async fn triggers_during_a_running_cycle_are_coalesced() {
    let config = minimal_config(&["example.com"]);
    let provider = MockDnsProvider::new(&config.records[0]).with_delay(Duration::from_millis(400));
    let engine_config = config.engine.clone();
    let mut h = Harness::build(config, provider, Some(ip("203.0.113.7"))).await;

    let (scheduler, trigger) = Scheduler::new(h.engine.clone(), &engine_config);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    // The first cycle is busy for 400ms
    tokio::time::sleep(Duration::from_millis(50)).await;
    for _ in 0..5 {
        trigger.request();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(600)).await;

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(cycles(&h.drain_events()), 1);
    assert_eq!(h.provider.update_call_count(), 1);
}

#[tokio::test]
async fn trigger_reports_a_stopped_scheduler() {
    let config = minimal_config(&["example.com"]);
    let provider = MockDnsProvider::new(&config.records[0]);
    let engine_config = config.engine.clone();
    let h = Harness::build(config, provider, Some(ip("203.0.113.7"))).await;

    let (scheduler, trigger) = Scheduler::new(h.engine.clone(), &engine_config);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(scheduler.run(shutdown_rx));
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert!(!trigger.request());
}

#[tokio::test]
async fn each_record_publishes_one_terminal_event_per_cycle() {
    let config = minimal_config(&["a.example.com", "b.example.com"]);
    let provider = MockDnsProvider::new(&config.records[0]);
    let mut h = Harness::build(config, provider, Some(ip("203.0.113.7"))).await;
    let cancel = Cancellation::new();

    h.engine.update_all(&cancel).await;
    h.engine.update_all(&cancel).await;

    let events = h.drain_events();
    let started = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::UpdateStarted { .. }))
        .count();
    let succeeded = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::UpdateSucceeded { .. }))
        .count();
    let up_to_date = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::UpToDate { .. }))
        .count();

    assert_eq!(started, 4);
    assert_eq!(succeeded, 2);
    assert_eq!(up_to_date, 2);
    assert_eq!(
        events.last(),
        Some(&EngineEvent::CycleCompleted {
            succeeded: 0,
            up_to_date: 2,
            failed: 0,
        })
    );
}
