//! Contract Test: Failure Classification & Store Isolation
//!
//! Constraints verified:
//! - A failed cycle never writes to the record store
//! - The runtime surfaces the error kind of the failure
//! - A resolver failure fails the record unless the vendor can observe
//!   the request source address
//! - The IPv6 suffix is applied before the provider sees the address
//! - A store write failure fails the record and the next cycle retries
//!
//! If this test fails, a failed update is leaking into the history or the
//! engine is hiding the failure classification.

mod common;

use common::*;
use ddns_core::config::{IpVersion, Ipv6Suffix};
use ddns_core::traits::StateStore;
use ddns_core::{Cancellation, EngineEvent, ErrorKind, IpStrategy, Status, UpdateOutcome};

#[tokio::test]
async fn ip_mismatch_fails_without_store_write() {
    let config = minimal_config(&["example.com"]);
    let provider = MockDnsProvider::new(&config.records[0]);
    provider.set_reply(Reply::Mismatch(ip("203.0.113.8")));
    let h = Harness::build(config, provider, Some(ip("203.0.113.7"))).await;

    let outcome = h.engine.update_one(0, &Cancellation::new()).await.unwrap();

    assert_eq!(outcome, UpdateOutcome::Failed(ErrorKind::IpMismatch));
    assert_eq!(h.store.write_count(), 0);
    assert!(h.store.entries("example.com", "@").await.unwrap().is_empty());
    let snapshot = &h.engine.snapshots()[0];
    assert_eq!(snapshot.status, Status::Fail);
    assert!(snapshot.message.starts_with("ip-mismatch"));
    assert_eq!(snapshot.current_ip, None);
}

#[tokio::test]
async fn auth_failure_fails_without_store_write() {
    let config = minimal_config(&["example.duckdns.org"]);
    let provider = MockDnsProvider::new(&config.records[0]);
    provider.set_reply(Reply::Auth);
    let mut h = Harness::build(config, provider, Some(ip("203.0.113.7"))).await;

    let outcome = h.engine.update_one(0, &Cancellation::new()).await.unwrap();

    assert_eq!(outcome, UpdateOutcome::Failed(ErrorKind::Auth));
    assert_eq!(h.store.write_count(), 0);
    let failed = h.drain_events().into_iter().any(|event| {
        matches!(event, EngineEvent::UpdateFailed { kind: ErrorKind::Auth, .. })
    });
    assert!(failed, "an UpdateFailed event with kind auth is published");
}

#[tokio::test]
async fn persistent_failure_repeats_every_cycle() {
    let config = minimal_config(&["example.duckdns.org"]);
    let provider = MockDnsProvider::new(&config.records[0]);
    provider.set_reply(Reply::Auth);
    let h = Harness::build(config, provider, Some(ip("203.0.113.7"))).await;
    let cancel = Cancellation::new();

    for _ in 0..3 {
        h.engine.update_one(0, &cancel).await.unwrap();
    }
    // No backoff inside a cycle and no retry within it
    assert_eq!(h.provider.update_call_count(), 3);
}

#[tokio::test]
async fn resolver_failure_fails_the_record() {
    let config = minimal_config(&["example.com"]);
    let provider = MockDnsProvider::new(&config.records[0]);
    let h = Harness::build(config, provider, None).await;

    let outcome = h.engine.update_one(0, &Cancellation::new()).await.unwrap();

    assert_eq!(outcome, UpdateOutcome::Failed(ErrorKind::Resolver));
    assert_eq!(h.provider.update_call_count(), 0);
    assert_eq!(h.source.fetch_count(), 1);
}

#[tokio::test]
async fn provider_mode_sends_no_ip_when_resolution_fails() {
    let mut config = minimal_config(&["example.com"]);
    config.resolver.strategies = vec![IpStrategy::Http, IpStrategy::Provider];
    let provider = MockDnsProvider::new(&config.records[0]).with_provider_ip();
    provider.set_reply(Reply::Confirm(ip("198.51.100.4")));
    let h = Harness::build(config, provider, None).await;

    let outcome = h.engine.update_one(0, &Cancellation::new()).await.unwrap();

    assert_eq!(outcome, UpdateOutcome::Updated(ip("198.51.100.4")));
    let targets = h.provider.targets();
    assert_eq!(targets.len(), 1);
    assert!(targets[0].provider_supplied);
    assert!(targets[0].ip.is_unspecified());
    assert_eq!(h.store.record_new_ip_count(), 1);
}

#[tokio::test]
async fn provider_mode_always_calls_the_provider() {
    let mut config = minimal_config(&["example.com"]);
    config.records[0].provider_ip = true;
    let provider = MockDnsProvider::new(&config.records[0]).with_provider_ip();
    let h = Harness::build(config, provider, Some(ip("203.0.113.7"))).await;
    let cancel = Cancellation::new();

    h.engine.update_one(0, &cancel).await.unwrap();
    let outcome = h.engine.update_one(0, &cancel).await.unwrap();

    // The vendor may see another source address than the local resolver
    assert_eq!(h.provider.update_call_count(), 2);
    assert_eq!(outcome, UpdateOutcome::UpToDate(ip("203.0.113.7")));
    assert_eq!(h.store.record_new_ip_count(), 1);
    assert_eq!(h.store.touch_count(), 1);
}

#[tokio::test]
async fn provider_applying_an_unechoed_ip_writes_nothing() {
    let mut config = minimal_config(&["example.com"]);
    config.records[0].provider_ip = true;
    let provider = MockDnsProvider::new(&config.records[0]).with_provider_ip();
    let h = Harness::build(config, provider, None).await;

    let outcome = h.engine.update_one(0, &Cancellation::new()).await.unwrap();

    assert_eq!(outcome, UpdateOutcome::AppliedByProvider);
    assert_eq!(h.store.write_count(), 0);
    assert_eq!(h.engine.snapshots()[0].status, Status::Success);
}

#[tokio::test]
async fn provider_ip_requires_adapter_support() {
    let mut config = minimal_config(&["example.com"]);
    config.records[0].provider_ip = true;
    let provider = MockDnsProvider::new(&config.records[0]);

    let result = ddns_core::DdnsEngine::builder(config)
        .provider(provider.boxed())
        .build()
        .await;

    let err = result.err().expect("build must fail");
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[tokio::test]
async fn ipv6_suffix_is_applied_before_the_update() {
    let mut config = minimal_config(&["example.com"]);
    config.records[0].ip_version = IpVersion::V6;
    config.records[0].ipv6_suffix = Some("::72ad:8fbb:a54e:bedd/64".parse::<Ipv6Suffix>().unwrap());
    let provider = MockDnsProvider::new(&config.records[0]);
    let h = Harness::build(config, provider, Some(ip("2001:db8:1:2::1"))).await;

    let outcome = h.engine.update_one(0, &Cancellation::new()).await.unwrap();

    assert_eq!(
        outcome,
        UpdateOutcome::Updated(ip("2001:db8:1:2:72ad:8fbb:a54e:bedd"))
    );
    assert_eq!(h.provider.targets()[0].ip, ip("2001:db8:1:2:72ad:8fbb:a54e:bedd"));
}

#[tokio::test]
async fn store_write_failure_fails_the_cycle_and_the_next_cycle_retries() {
    let config = minimal_config(&["example.com"]);
    let provider = MockDnsProvider::new(&config.records[0]);
    let store = MockStateStore::new();
    store.set_fail_writes(true);
    let h = Harness::build_with_store(config, provider, Some(ip("203.0.113.7")), store).await;
    let cancel = Cancellation::new();

    let outcome = h.engine.update_one(0, &cancel).await.unwrap();

    assert_eq!(outcome, UpdateOutcome::Failed(ErrorKind::Store));
    let snapshot = &h.engine.snapshots()[0];
    assert_eq!(snapshot.status, Status::Fail);
    assert!(snapshot.message.starts_with("store"));
    assert_eq!(snapshot.current_ip, None);
    assert!(h.store.entries("example.com", "@").await.unwrap().is_empty());

    h.store.set_fail_writes(false);
    let outcome = h.engine.update_one(0, &cancel).await.unwrap();

    assert_eq!(outcome, UpdateOutcome::Updated(ip("203.0.113.7")));
    assert_eq!(h.provider.update_call_count(), 2);
    assert_eq!(h.store.record_new_ip_count(), 2);
    assert_eq!(h.engine.snapshots()[0].status, Status::Success);
    assert_eq!(
        h.store.history("example.com", "@").await.unwrap().current,
        Some(ip("203.0.113.7"))
    );
}
