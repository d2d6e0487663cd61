//! Core traits for the DDNS updater
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`IpSource`]: Resolve the current public IP with one strategy
//! - [`DnsProvider`]: Apply an IP to a record through a vendor protocol
//! - [`StateStore`]: Durable per-record IP history

pub mod dns_provider;
pub mod ip_source;
pub mod state_store;

pub use dns_provider::{
    DnsProvider, DnsProviderFactory, HtmlRow, ProviderDescription, UpdateTarget,
};
pub use ip_source::{IpSource, IpSourceFactory};
pub use state_store::{History, HistoryEntry, StateStore, StateStoreFactory};
