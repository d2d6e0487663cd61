//! Core DDNS engine
//!
//! The DdnsEngine is responsible for:
//! - Resolving the public IP of each record through the [`Resolver`]
//! - Diffing it against the record's last confirmed IP
//! - Calling the record's [`DnsProvider`] when an update is needed
//! - Writing the outcome to the [`StateStore`] and the record runtime
//!
//! ## Architecture
//!
//! ```text
//!   Scheduler ── update_all ──┐
//!                             ▼
//!                    ┌──────────────┐
//!                    │  DdnsEngine  │── one task per record
//!                    └──────────────┘
//!                             │
//!         ┌───────────────────┼───────────────────┬─────────────────┐
//!         ▼                   ▼                   ▼                 ▼
//! ┌─────────────┐    ┌──────────────┐    ┌──────────────┐   ┌─────────────┐
//! │  Resolver   │    │ DnsProvider  │    │  StateStore  │   │   Events    │
//! │ (public IP) │    │ (update)     │    │ (history)    │   │  (notify)   │
//! └─────────────┘    └──────────────┘    └──────────────┘   └─────────────┘
//! ```
//!
//! ## Update Flow (one record)
//!
//! 1. Claim the record; skip it when another update holds it
//! 2. Resolve the public IP and apply the IPv6 suffix
//! 3. Unless the vendor observes the IP itself, stop as up-to-date when the
//!    IP equals the last confirmed one
//! 4. Call the adapter under the cycle deadline and the cancellation signal
//! 5. Record a new IP or touch the current one, then publish the outcome

use chrono::{DateTime, Utc};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cancel::Cancellation;
use crate::config::{DdnsConfig, IpStrategy, RecordConfig, RecordId};
use crate::error::{Error, ErrorKind, Result};
use crate::resolver::Resolver;
use crate::runtime::{RecordRuntime, RuntimeSnapshot};
use crate::state::MemoryStateStore;
use crate::traits::{DnsProvider, StateStore, UpdateTarget};
use crate::transport;

/// Source of the current time
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Events emitted by the DdnsEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Scheduler started
    Started {
        records_count: usize,
    },

    /// A record entered `updating`
    UpdateStarted {
        record: RecordId,
    },

    /// The vendor accepted an update
    UpdateSucceeded {
        record: RecordId,
        /// Confirmed IP; unspecified when the vendor did not say
        new_ip: IpAddr,
        previous_ip: Option<IpAddr>,
    },

    /// The record already points at the public IP
    UpToDate {
        record: RecordId,
        ip: IpAddr,
    },

    /// The record's cycle failed
    UpdateFailed {
        record: RecordId,
        kind: ErrorKind,
        message: String,
    },

    /// Every record of a cycle reached a terminal state
    CycleCompleted {
        succeeded: usize,
        up_to_date: usize,
        failed: usize,
    },

    /// Scheduler stopped
    Stopped {
        reason: String,
    },
}

/// Terminal outcome of one record's update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A new IP was confirmed and recorded
    Updated(IpAddr),
    /// The vendor applied the request source address without echoing it
    AppliedByProvider,
    /// Nothing changed
    UpToDate(IpAddr),
    /// The cycle failed for this record
    Failed(ErrorKind),
    /// Another update held the record, or the cycle was cancelled before it started
    Skipped,
}

/// Per-cycle tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub succeeded: usize,
    pub up_to_date: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl CycleSummary {
    fn add(&mut self, outcome: UpdateOutcome) {
        match outcome {
            UpdateOutcome::Updated(_) | UpdateOutcome::AppliedByProvider => self.succeeded += 1,
            UpdateOutcome::UpToDate(_) => self.up_to_date += 1,
            UpdateOutcome::Failed(_) => self.failed += 1,
            UpdateOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// What a successful attempt asks the store to do
enum Decision {
    Changed(IpAddr),
    Unchanged(IpAddr),
    AppliedByProvider,
}

struct Inner {
    records: Vec<Arc<RecordRuntime>>,
    resolver: Resolver,
    strategies: Vec<IpStrategy>,
    client: reqwest::Client,
    store: Arc<dyn StateStore>,
    limit: Option<Arc<Semaphore>>,
    cycle_deadline: Duration,
    clock: Clock,
    event_tx: mpsc::Sender<EngineEvent>,
}

/// Core DDNS engine
///
/// Cheap to clone; clones share records, store and event channel.
///
/// ## Lifecycle
///
/// 1. Build with [`DdnsEngine::builder()`]
/// 2. Drive with a [`crate::scheduler::Scheduler`] or call
///    [`DdnsEngine::update_all()`] directly
/// 3. Read [`DdnsEngine::snapshots()`] for status pages and the healthcheck
///
/// ## Load Resistance
///
/// - **Bounded event channel**: events are dropped with a warning when full
/// - **Per-record claim**: a record never runs two updates at once
/// - **Concurrency ceiling**: optional cap on records updated in parallel
#[derive(Clone)]
pub struct DdnsEngine {
    inner: Arc<Inner>,
}

/// Builder for [`DdnsEngine`]
///
/// Providers are given in the order of `config.records`.
pub struct EngineBuilder {
    config: DdnsConfig,
    providers: Vec<Box<dyn DnsProvider>>,
    resolver: Resolver,
    store: Option<Arc<dyn StateStore>>,
    client: Option<reqwest::Client>,
    clock: Clock,
}

impl EngineBuilder {
    /// Add the adapter of the next declared record
    pub fn provider(mut self, provider: Box<dyn DnsProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn providers(mut self, providers: impl IntoIterator<Item = Box<dyn DnsProvider>>) -> Self {
        self.providers.extend(providers);
        self
    }

    pub fn resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Shared HTTP client; built from `engine.http_timeout_secs` when absent
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Validate the configuration and load every record's runtime from the store
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub async fn build(self) -> Result<(DdnsEngine, mpsc::Receiver<EngineEvent>)> {
        let config = self.config;
        config.validate()?;

        if self.providers.len() != config.records.len() {
            return Err(Error::config(format!(
                "{} records declared but {} providers given",
                config.records.len(),
                self.providers.len()
            )));
        }

        let client = match self.client {
            Some(client) => client,
            None => transport::build_client(config.engine.http_timeout())?,
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStateStore::new()));

        let now = (self.clock)();
        let mut records = Vec::with_capacity(config.records.len());
        for (record, provider) in config.records.iter().zip(self.providers) {
            check_provider_ip(record, provider.as_ref())?;
            let history = store.history(&record.domain, &record.owner).await?;
            debug!(
                record = %record.id(),
                current = ?history.current,
                "Loaded record history"
            );
            records.push(Arc::new(RecordRuntime::new(
                record.clone(),
                provider,
                history,
                now,
            )));
        }

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let inner = Inner {
            records,
            resolver: self.resolver,
            strategies: config.resolver.strategies.clone(),
            client,
            store,
            limit: config
                .engine
                .max_concurrency
                .map(|n| Arc::new(Semaphore::new(n))),
            cycle_deadline: config.engine.cycle_deadline(),
            clock: self.clock,
            event_tx: tx,
        };

        Ok((DdnsEngine { inner: Arc::new(inner) }, rx))
    }
}

fn check_provider_ip(record: &RecordConfig, provider: &dyn DnsProvider) -> Result<()> {
    if record.provider_ip && !provider.supports_provider_ip() {
        return Err(Error::config(format!(
            "{}: provider {} cannot detect the IP address itself",
            record.id(),
            record.provider
        )));
    }
    Ok(())
}

impl fmt::Debug for DdnsEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DdnsEngine")
            .field("records", &self.inner.records)
            .field("strategies", &self.inner.strategies)
            .field("cycle_deadline", &self.inner.cycle_deadline)
            .finish_non_exhaustive()
    }
}

impl DdnsEngine {
    /// Start building an engine for `config`
    pub fn builder(config: DdnsConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            providers: Vec::new(),
            resolver: Resolver::default(),
            store: None,
            client: None,
            clock: Arc::new(Utc::now),
        }
    }

    /// Number of declared records
    pub fn records_count(&self) -> usize {
        self.inner.records.len()
    }

    /// Runtime of the record at `index`, in declaration order
    pub fn record(&self, index: usize) -> Option<&Arc<RecordRuntime>> {
        self.inner.records.get(index)
    }

    /// Copy of every record's runtime state, in declaration order
    pub fn snapshots(&self) -> Vec<RuntimeSnapshot> {
        self.inner.records.iter().map(|r| r.snapshot()).collect()
    }

    /// Whether any record is currently `updating`
    pub fn any_updating(&self) -> bool {
        self.inner.records.iter().any(|r| r.is_updating())
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.inner.store
    }

    /// Update every record, in parallel up to the concurrency ceiling
    ///
    /// Waits for all workers before returning.
    ///
    /// # Parameters
    ///
    /// - `cancel`: Cycle cancellation, shared by every worker
    pub async fn update_all(&self, cancel: &Cancellation) -> CycleSummary {
        let mut workers = JoinSet::new();

        for runtime in &self.inner.records {
            let engine = self.clone();
            let runtime = Arc::clone(runtime);
            let cancel = cancel.clone();
            let limit = self.inner.limit.clone();

            workers.spawn(async move {
                let _permit = match limit {
                    Some(limit) => match limit.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return UpdateOutcome::Skipped,
                    },
                    None => None,
                };
                engine.run_record(&runtime, &cancel).await
            });
        }

        let mut summary = CycleSummary::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => summary.add(outcome),
                Err(e) => {
                    error!("Record worker aborted: {}", e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            succeeded = summary.succeeded,
            up_to_date = summary.up_to_date,
            failed = summary.failed,
            skipped = summary.skipped,
            "Update cycle finished"
        );
        self.emit_event(EngineEvent::CycleCompleted {
            succeeded: summary.succeeded,
            up_to_date: summary.up_to_date,
            failed: summary.failed,
        });

        summary
    }

    /// Update the record at `index`
    ///
    /// # Returns
    ///
    /// - `Ok(UpdateOutcome)`: The record's terminal outcome for this call
    /// - `Err(Error)`: If no record is declared at `index`
    pub async fn update_one(&self, index: usize, cancel: &Cancellation) -> Result<UpdateOutcome> {
        let runtime = self
            .inner
            .records
            .get(index)
            .ok_or_else(|| Error::config(format!("no record at index {index}")))?;
        Ok(self.run_record(runtime, cancel).await)
    }

    async fn run_record(&self, runtime: &RecordRuntime, cancel: &Cancellation) -> UpdateOutcome {
        if cancel.is_cancelled() {
            return UpdateOutcome::Skipped;
        }
        let Some(_claim) = runtime.try_claim() else {
            debug!(record = %runtime.id(), "Update already in flight, skipping");
            return UpdateOutcome::Skipped;
        };

        let record = runtime.id();
        runtime.mark_updating(self.now());
        self.emit_event(EngineEvent::UpdateStarted {
            record: record.clone(),
        });

        let deadline = self.inner.cycle_deadline;
        let attempt = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::cancelled("update cycle cancelled")),
            result = tokio::time::timeout(deadline, self.attempt(runtime)) => match result {
                Ok(result) => result,
                Err(_) => Err(Error::cancelled(format!(
                    "update did not finish within {}s",
                    deadline.as_secs()
                ))),
            },
        };

        let previous_ip = runtime.current_ip();
        let committed = match attempt {
            Ok(_) if cancel.is_cancelled() => Err(Error::cancelled("update cycle cancelled")),
            Ok(decision) => self.commit(runtime, decision).await,
            Err(e) => Err(e),
        };

        let now = self.now();
        match committed {
            Ok(UpdateOutcome::Updated(ip)) => {
                runtime.mark_changed(ip, now);
                info!(record = %record, %ip, previous = ?previous_ip, "Record updated");
                self.emit_event(EngineEvent::UpdateSucceeded {
                    record,
                    new_ip: ip,
                    previous_ip,
                });
                UpdateOutcome::Updated(ip)
            }
            Ok(UpdateOutcome::AppliedByProvider) => {
                runtime.mark_applied_by_provider(now);
                info!(record = %record, "Record updated from the request source address");
                self.emit_event(EngineEvent::UpdateSucceeded {
                    record,
                    new_ip: runtime.record().ip_version.unspecified(),
                    previous_ip,
                });
                UpdateOutcome::AppliedByProvider
            }
            Ok(UpdateOutcome::UpToDate(ip)) => {
                runtime.mark_up_to_date(ip, now);
                debug!(record = %record, %ip, "Record is up to date");
                self.emit_event(EngineEvent::UpToDate { record, ip });
                UpdateOutcome::UpToDate(ip)
            }
            Ok(other) => other,
            Err(e) => {
                let kind = e.kind();
                runtime.mark_failed(&e, now);
                error!(record = %record, %kind, "Update failed: {}", e);
                self.emit_event(EngineEvent::UpdateFailed {
                    record,
                    kind,
                    message: e.to_string(),
                });
                UpdateOutcome::Failed(kind)
            }
        }
    }

    /// Resolve, diff and call the adapter; writes nothing
    async fn attempt(&self, runtime: &RecordRuntime) -> Result<Decision> {
        let record = runtime.record();
        let strategies = record
            .ip_strategy
            .as_deref()
            .unwrap_or(self.inner.strategies.as_slice());
        let provider = runtime.provider();
        let provider_mode = provider.supports_provider_ip()
            && (record.provider_ip || strategies.contains(&IpStrategy::Provider));

        let ip = match self.inner.resolver.resolve(record.ip_version, strategies).await {
            Ok(ip) => match &record.ipv6_suffix {
                Some(suffix) => suffix.apply_ip(ip),
                None => ip,
            },
            Err(e) if provider_mode => {
                debug!(record = %record.id(), "No local IP ({}), vendor will use the request source", e);
                record.ip_version.unspecified()
            }
            Err(e) => return Err(e),
        };

        let current = runtime.current_ip();
        if !provider_mode && current == Some(ip) {
            return Ok(Decision::Unchanged(ip));
        }

        let target = if provider_mode {
            UpdateTarget::provider_supplied(ip)
        } else {
            UpdateTarget::address(ip)
        };
        debug!(record = %record.id(), %ip, provider_mode, "Calling provider");
        let confirmed = provider.update(&self.inner.client, target).await?;

        if confirmed.is_unspecified() {
            Ok(Decision::AppliedByProvider)
        } else if current == Some(confirmed) {
            Ok(Decision::Unchanged(confirmed))
        } else {
            Ok(Decision::Changed(confirmed))
        }
    }

    /// Persist a successful attempt
    async fn commit(&self, runtime: &RecordRuntime, decision: Decision) -> Result<UpdateOutcome> {
        let record = runtime.record();
        let now = self.now();
        match decision {
            Decision::Changed(ip) => {
                self.inner
                    .store
                    .record_new_ip(&record.domain, &record.owner, ip, now)
                    .await?;
                Ok(UpdateOutcome::Updated(ip))
            }
            Decision::Unchanged(ip) => {
                self.inner
                    .store
                    .touch_current(&record.domain, &record.owner, ip, now)
                    .await?;
                Ok(UpdateOutcome::UpToDate(ip))
            }
            Decision::AppliedByProvider => Ok(UpdateOutcome::AppliedByProvider),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.inner.clock)()
    }

    /// Emit an engine event
    ///
    /// # Parameters
    ///
    /// - `event`: The event to emit
    pub(crate) fn emit_event(&self, event: EngineEvent) {
        // Send event, logging warning if channel is full (backpressure)
        if self.inner.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_summary_counts_outcomes() {
        let mut summary = CycleSummary::default();
        summary.add(UpdateOutcome::Updated("192.0.2.1".parse().unwrap()));
        summary.add(UpdateOutcome::AppliedByProvider);
        summary.add(UpdateOutcome::UpToDate("192.0.2.1".parse().unwrap()));
        summary.add(UpdateOutcome::Failed(ErrorKind::Auth));
        summary.add(UpdateOutcome::Skipped);
        assert_eq!(
            summary,
            CycleSummary {
                succeeded: 2,
                up_to_date: 1,
                failed: 1,
                skipped: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_builder_rejects_missing_providers() {
        let config = DdnsConfig::new(vec![RecordConfig::new("duckdns", "example.duckdns.org")]);
        let err = DdnsEngine::builder(config).build().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    struct SilentProvider(RecordConfig);

    #[async_trait::async_trait]
    impl DnsProvider for SilentProvider {
        async fn update(&self, _client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
            Ok(target.ip)
        }

        fn describe(&self) -> crate::traits::ProviderDescription {
            crate::traits::ProviderDescription::new("duckdns", "DuckDNS", "https://www.duckdns.org/", &self.0)
        }
    }

    #[tokio::test]
    async fn test_debug_lists_records_without_credentials() {
        let record = RecordConfig::new("duckdns", "example.duckdns.org").with_credential("token", "s3cr3t");
        let config = DdnsConfig::new(vec![record.clone()]);
        let (engine, _events) = DdnsEngine::builder(config)
            .provider(Box::new(SilentProvider(record)))
            .build()
            .await
            .unwrap();

        let shown = format!("{engine:?}");
        assert!(shown.starts_with("DdnsEngine"));
        assert!(shown.contains("example.duckdns.org"));
        assert!(!shown.contains("s3cr3t"));
    }
}
