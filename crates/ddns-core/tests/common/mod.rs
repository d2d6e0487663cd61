//! Test doubles and common utilities for contract tests
//!
//! The doubles count their calls through shared `Arc<AtomicUsize>` counters
//! so a test can keep a handle after moving the double into the engine.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ddns_core::config::{DdnsConfig, EngineConfig, IpStrategy, IpVersion, RecordConfig};
use ddns_core::error::{Error, Result};
use ddns_core::state::MemoryStateStore;
use ddns_core::traits::{
    DnsProvider, History, HistoryEntry, IpSource, ProviderDescription, StateStore, UpdateTarget,
};
use ddns_core::{DdnsEngine, EngineEvent, Resolver};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// An IP source returning whatever the test last set
#[derive(Clone)]
pub struct StaticIpSource {
    strategy: IpStrategy,
    answer: Arc<Mutex<Option<IpAddr>>>,
    fetch_count: Arc<AtomicUsize>,
}

impl StaticIpSource {
    pub fn new(strategy: IpStrategy, answer: Option<IpAddr>) -> Self {
        Self {
            strategy,
            answer: Arc::new(Mutex::new(answer)),
            fetch_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Change the answer of this source and all its clones
    pub fn set(&self, answer: Option<IpAddr>) {
        *self.answer.lock().unwrap() = answer;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IpSource for StaticIpSource {
    async fn fetch(&self, _version: IpVersion) -> Result<IpAddr> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let answer = *self.answer.lock().unwrap();
        answer.ok_or_else(|| Error::transport("echo endpoint unreachable"))
    }

    fn strategy(&self) -> IpStrategy {
        self.strategy
    }
}

/// How the mock provider answers
#[derive(Debug, Clone)]
pub enum Reply {
    /// Confirm the IP that was sent
    Echo,
    /// Confirm a fixed IP whatever was sent
    Confirm(IpAddr),
    /// Reject the credentials
    Auth,
    /// Echo a different IP than the one sent
    Mismatch(IpAddr),
}

/// A mock DnsProvider that tracks calls
#[derive(Clone)]
pub struct MockDnsProvider {
    record: RecordConfig,
    reply: Arc<Mutex<Reply>>,
    delay: Duration,
    provider_ip: bool,
    /// Call counter for update()
    update_call_count: Arc<AtomicUsize>,
    /// Targets received by update(), oldest first
    targets: Arc<Mutex<Vec<UpdateTarget>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockDnsProvider {
    pub fn new(record: &RecordConfig) -> Self {
        Self {
            record: record.clone(),
            reply: Arc::new(Mutex::new(Reply::Echo)),
            delay: Duration::ZERO,
            provider_ip: false,
            update_call_count: Arc::new(AtomicUsize::new(0)),
            targets: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep this long inside every update call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Advertise that the vendor can observe the request source address
    pub fn with_provider_ip(mut self) -> Self {
        self.provider_ip = true;
        self
    }

    pub fn set_reply(&self, reply: Reply) {
        *self.reply.lock().unwrap() = reply;
    }

    /// Get the number of times update() was called
    pub fn update_call_count(&self) -> usize {
        self.update_call_count.load(Ordering::SeqCst)
    }

    pub fn targets(&self) -> Vec<UpdateTarget> {
        self.targets.lock().unwrap().clone()
    }

    /// Highest number of update() calls observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Create a new MockDnsProvider for `record` that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self, record: &RecordConfig) -> Self {
        Self {
            record: record.clone(),
            ..other.clone()
        }
    }

    pub fn boxed(&self) -> Box<dyn DnsProvider> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl DnsProvider for MockDnsProvider {
    async fn update(&self, _client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        self.update_call_count.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().unwrap().push(target);

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let reply = self.reply.lock().unwrap().clone();
        match reply {
            Reply::Echo => Ok(target.ip),
            Reply::Confirm(ip) => Ok(ip),
            Reply::Auth => Err(Error::auth("KO")),
            Reply::Mismatch(received) => Err(Error::IpMismatch {
                sent: target.ip,
                received,
            }),
        }
    }

    fn describe(&self) -> ProviderDescription {
        ProviderDescription::new("mock", "Mock", "https://mock.invalid/", &self.record)
    }

    fn supports_provider_ip(&self) -> bool {
        self.provider_ip
    }
}

/// A StateStore that counts writes and delegates to a MemoryStateStore
///
/// Counters include rejected writes.
#[derive(Clone, Default)]
pub struct MockStateStore {
    inner: MemoryStateStore,
    record_new_ip_count: Arc<AtomicUsize>,
    touch_count: Arc<AtomicUsize>,
    flush_count: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
}

impl MockStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail until reset
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::state_store("disk full"));
        }
        Ok(())
    }

    pub fn record_new_ip_count(&self) -> usize {
        self.record_new_ip_count.load(Ordering::SeqCst)
    }

    pub fn touch_count(&self) -> usize {
        self.touch_count.load(Ordering::SeqCst)
    }

    /// Number of writes of either kind
    pub fn write_count(&self) -> usize {
        self.record_new_ip_count() + self.touch_count()
    }

    pub fn flush_count(&self) -> usize {
        self.flush_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for MockStateStore {
    async fn record_new_ip(
        &self,
        domain: &str,
        owner: &str,
        ip: IpAddr,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.record_new_ip_count.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        self.inner.record_new_ip(domain, owner, ip, now).await
    }

    async fn touch_current(
        &self,
        domain: &str,
        owner: &str,
        ip: IpAddr,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.touch_count.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        self.inner.touch_current(domain, owner, ip, now).await
    }

    async fn history(&self, domain: &str, owner: &str) -> Result<History> {
        self.inner.history(domain, owner).await
    }

    async fn entries(&self, domain: &str, owner: &str) -> Result<Vec<HistoryEntry>> {
        self.inner.entries(domain, owner).await
    }

    async fn flush(&self) -> Result<()> {
        self.flush_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A clock the test moves by hand
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn starting_at(secs: i64) -> Self {
        Self {
            now: Arc::new(Mutex::new(DateTime::from_timestamp(secs, 0).unwrap())),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    pub fn advance(&self, secs: i64) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::seconds(secs);
    }

    pub fn as_clock(&self) -> ddns_core::engine::Clock {
        let clock = self.clone();
        Arc::new(move || clock.now())
    }
}

/// Helper to create a minimal DdnsConfig for testing
pub fn minimal_config(domains: &[&str]) -> DdnsConfig {
    let records = domains
        .iter()
        .map(|domain| RecordConfig::new("mock", *domain))
        .collect();
    let mut config = DdnsConfig::new(records);
    config.resolver.strategies = vec![IpStrategy::Http];
    config.engine = EngineConfig {
        period_secs: 5,
        event_channel_capacity: 100,
        ..EngineConfig::default()
    };
    config
}

/// Everything a contract test needs to drive and observe an engine
pub struct Harness {
    pub engine: DdnsEngine,
    pub events: mpsc::Receiver<EngineEvent>,
    pub source: StaticIpSource,
    pub provider: MockDnsProvider,
    pub store: MockStateStore,
    pub clock: ManualClock,
}

impl Harness {
    /// Build an engine over `config` with one shared mock provider
    pub async fn build(config: DdnsConfig, provider: MockDnsProvider, ip: Option<IpAddr>) -> Self {
        Self::build_with_store(config, provider, ip, MockStateStore::new()).await
    }

    pub async fn build_with_store(
        config: DdnsConfig,
        provider: MockDnsProvider,
        ip: Option<IpAddr>,
        store: MockStateStore,
    ) -> Self {
        let source = StaticIpSource::new(IpStrategy::Http, ip);
        let clock = ManualClock::starting_at(1_700_000_000);
        let providers: Vec<Box<dyn DnsProvider>> = config
            .records
            .iter()
            .map(|record| MockDnsProvider::sharing_counters_with(&provider, record).boxed())
            .collect();

        let (engine, events) = DdnsEngine::builder(config)
            .providers(providers)
            .resolver(Resolver::new(vec![Arc::new(source.clone())]))
            .store(Arc::new(store.clone()))
            .clock(clock.as_clock())
            .build()
            .await
            .expect("engine construction succeeds");

        Self {
            engine,
            events,
            source,
            provider,
            store,
            clock,
        }
    }

    /// Every event emitted so far
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}
