// # Record Runtime
//
// Process-resident state of one declared record.
//
// ## Ownership
//
// - The worker running the record's update holds `busy` for the whole cycle
//   and is the only writer of `state`
// - The status page and the healthcheck read copies through `snapshot()`
//
// `busy` is acquired with `try_lock`: a record that is already updating is
// skipped instead of queued.

use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::sync::{PoisonError, RwLock};
use tokio::sync::{Mutex, MutexGuard};

use crate::config::{RecordConfig, RecordId};
use crate::error::Error;
use crate::traits::{DnsProvider, History, ProviderDescription};

/// Maximum number of previous IPs kept per record
pub const MAX_PREVIOUS_IPS: usize = 10;

/// Lifecycle status of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Initial,
    Updating,
    Success,
    UpToDate,
    Fail,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Initial => "initial",
            Status::Updating => "updating",
            Status::Success => "success",
            Status::UpToDate => "up-to-date",
            Status::Fail => "fail",
        }
    }

    /// Whether a cycle ended in this status
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Success | Status::UpToDate | Status::Fail)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Copy of a record's runtime state for readers
#[derive(Debug, Clone)]
pub struct RuntimeSnapshot {
    pub id: RecordId,
    pub fqdn: String,
    pub description: ProviderDescription,
    pub status: Status,
    pub message: String,
    pub last_transition: DateTime<Utc>,
    pub current_ip: Option<IpAddr>,
    /// Newest first, at most [`MAX_PREVIOUS_IPS`] entries
    pub previous_ips: Vec<IpAddr>,
    pub last_success: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct RuntimeState {
    status: Status,
    message: String,
    last_transition: DateTime<Utc>,
    current_ip: Option<IpAddr>,
    previous_ips: Vec<IpAddr>,
    last_success: Option<DateTime<Utc>>,
}

/// One declared record with its adapter and mutable state
pub struct RecordRuntime {
    record: RecordConfig,
    provider: Box<dyn DnsProvider>,
    description: ProviderDescription,
    busy: Mutex<()>,
    state: RwLock<RuntimeState>,
}

impl std::fmt::Debug for RecordRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordRuntime")
            .field("record", &self.record.id())
            .field("state", &self.read())
            .finish()
    }
}

impl RecordRuntime {
    /// Build the runtime of a record, seeded from its stored history
    ///
    /// # Parameters
    ///
    /// - `record`: The declared record
    /// - `provider`: The adapter built for it
    /// - `history`: What the store knows about `(domain, owner)`
    /// - `now`: Load time
    pub fn new(
        record: RecordConfig,
        provider: Box<dyn DnsProvider>,
        history: History,
        now: DateTime<Utc>,
    ) -> Self {
        let previous_ips = history
            .ips
            .iter()
            .copied()
            .filter(|ip| Some(*ip) != history.current)
            .take(MAX_PREVIOUS_IPS)
            .collect();
        let description = provider.describe();

        Self {
            record,
            provider,
            description,
            busy: Mutex::new(()),
            state: RwLock::new(RuntimeState {
                status: Status::Initial,
                message: String::new(),
                last_transition: now,
                current_ip: history.current,
                previous_ips,
                last_success: None,
            }),
        }
    }

    pub fn record(&self) -> &RecordConfig {
        &self.record
    }

    pub fn provider(&self) -> &dyn DnsProvider {
        self.provider.as_ref()
    }

    pub fn description(&self) -> &ProviderDescription {
        &self.description
    }

    pub fn id(&self) -> RecordId {
        self.record.id()
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        let state = self.read();
        RuntimeSnapshot {
            id: self.record.id(),
            fqdn: self.record.fqdn(),
            description: self.description.clone(),
            status: state.status,
            message: state.message,
            last_transition: state.last_transition,
            current_ip: state.current_ip,
            previous_ips: state.previous_ips,
            last_success: state.last_success,
        }
    }

    pub fn status(&self) -> Status {
        self.read().status
    }

    pub fn is_updating(&self) -> bool {
        self.status() == Status::Updating
    }

    /// Last IP confirmed for this record
    pub fn current_ip(&self) -> Option<IpAddr> {
        self.read().current_ip
    }

    /// Claim the record for one update; `None` when another update holds it
    pub(crate) fn try_claim(&self) -> Option<MutexGuard<'_, ()>> {
        self.busy.try_lock().ok()
    }

    pub(crate) fn mark_updating(&self, now: DateTime<Utc>) {
        self.transition(Status::Updating, "updating".to_string(), now);
    }

    /// The vendor confirmed `ip`, which differs from the previous current IP
    pub(crate) fn mark_changed(&self, ip: IpAddr, now: DateTime<Utc>) {
        let mut state = self.write();
        if let Some(old) = state.current_ip.filter(|old| *old != ip) {
            state.previous_ips.retain(|prev| *prev != old && *prev != ip);
            state.previous_ips.insert(0, old);
            state.previous_ips.truncate(MAX_PREVIOUS_IPS);
        }
        state.current_ip = Some(ip);
        state.last_success = Some(now);
        Self::set(&mut state, Status::Success, format!("changed to {ip}"), now);
    }

    /// The vendor accepted the update without telling which IP it used
    pub(crate) fn mark_applied_by_provider(&self, now: DateTime<Utc>) {
        let mut state = self.write();
        state.last_success = Some(now);
        Self::set(&mut state, Status::Success, "updated from the request source address".to_string(), now);
    }

    pub(crate) fn mark_up_to_date(&self, ip: IpAddr, now: DateTime<Utc>) {
        let mut state = self.write();
        state.current_ip = Some(ip);
        state.last_success = Some(now);
        Self::set(&mut state, Status::UpToDate, format!("no IP change for {ip}"), now);
    }

    pub(crate) fn mark_failed(&self, error: &Error, now: DateTime<Utc>) {
        self.transition(Status::Fail, format!("{}: {}", error.kind(), error), now);
    }

    fn transition(&self, status: Status, message: String, now: DateTime<Utc>) {
        Self::set(&mut self.write(), status, message, now);
    }

    fn set(state: &mut RuntimeState, status: Status, message: String, now: DateTime<Utc>) {
        state.status = status;
        state.message = message;
        state.last_transition = now;
    }

    fn read(&self) -> RuntimeState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RuntimeState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
