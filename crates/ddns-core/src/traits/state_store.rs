// # State Store Trait
//
// Defines the interface for the durable per-record IP history.
//
// ## Purpose
//
// The store keeps, for every `(domain, owner)` pair, the ordered list of
// addresses the record has been confirmed at:
//
// - a new row is inserted when a new IP is confirmed, flipping the previous
//   current row to `current = false` in the same write;
// - `last_seen` is bumped when the current IP is confirmed again;
// - the engine seeds its runtime cache from `history` at load.
//
// ## Implementations
//
// - File-based: JSON file with atomic writes and backup recovery
// - Memory: tests and ephemeral deployments

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// One persisted observation of an IP for a `(domain, owner)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub domain: String,
    pub owner: String,
    pub ip: IpAddr,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub current: bool,
}

/// Read-only view of a pair's history
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    /// Addresses, newest first
    pub ips: Vec<IpAddr>,

    /// When the newest address was first seen
    pub first_seen: Option<DateTime<Utc>>,

    /// Address of the row flagged current, if any
    pub current: Option<IpAddr>,
}

impl History {
    /// Build the view from rows sorted oldest first
    pub fn from_entries(entries: &[HistoryEntry]) -> Self {
        let mut ips: Vec<IpAddr> = entries.iter().rev().map(|e| e.ip).collect();
        ips.dedup();
        Self {
            ips,
            first_seen: entries.last().map(|e| e.first_seen),
            current: entries.iter().rev().find(|e| e.current).map(|e| e.ip),
        }
    }
}

/// Trait for state store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
/// Writes for different pairs must not corrupt each other; writes for the
/// same pair are serialized by the engine's per-record lock.
///
/// ## Implementation Guidelines
///
/// - **Async I/O only**: Use async file operations, never blocking I/O
/// - **Single write per operation**: `record_new_ip` flips and inserts together
/// - **Explicit flush**: `flush()` must persist all pending changes
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Record a newly confirmed IP
    ///
    /// Flips any current row of the pair to `current = false` and inserts a
    /// new current row with `first_seen = last_seen = now`.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Successfully persisted
    /// - `Err(Error)`: Storage error
    async fn record_new_ip(
        &self,
        domain: &str,
        owner: &str,
        ip: IpAddr,
        now: DateTime<Utc>,
    ) -> Result<(), crate::Error>;

    /// Bump `last_seen` of the current row when it holds `ip`
    ///
    /// No-op when the pair has no current row for `ip`.
    async fn touch_current(
        &self,
        domain: &str,
        owner: &str,
        ip: IpAddr,
        now: DateTime<Utc>,
    ) -> Result<(), crate::Error>;

    /// Read the pair's history
    ///
    /// # Returns
    ///
    /// - `Ok(History)`: Addresses newest first; empty for an unknown pair
    /// - `Err(Error)`: Storage error
    async fn history(&self, domain: &str, owner: &str) -> Result<History, crate::Error>;

    /// All rows of the pair, oldest first
    async fn entries(&self, domain: &str, owner: &str)
    -> Result<Vec<HistoryEntry>, crate::Error>;

    /// Persist any pending changes
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Successfully flushed
    /// - `Err(Error)`: Storage error
    async fn flush(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing state stores from configuration
#[async_trait]
pub trait StateStoreFactory: Send + Sync {
    /// Create a StateStore instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Serialized `StateStoreConfig`
    ///
    /// # Returns
    ///
    /// A boxed StateStore trait object
    async fn create(&self, config: &serde_json::Value)
    -> Result<Box<dyn StateStore>, crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(ip: &str, secs: i64, current: bool) -> HistoryEntry {
        let at = Utc.timestamp_opt(secs, 0).unwrap();
        HistoryEntry {
            domain: "example.com".to_string(),
            owner: "@".to_string(),
            ip: ip.parse().unwrap(),
            first_seen: at,
            last_seen: at,
            current,
        }
    }

    #[test]
    fn history_lists_newest_first() {
        let entries = vec![
            entry("203.0.113.1", 10, false),
            entry("203.0.113.2", 20, false),
            entry("203.0.113.3", 30, true),
        ];
        let history = History::from_entries(&entries);
        assert_eq!(
            history.ips,
            vec![
                "203.0.113.3".parse::<IpAddr>().unwrap(),
                "203.0.113.2".parse().unwrap(),
                "203.0.113.1".parse().unwrap(),
            ]
        );
        assert_eq!(history.first_seen, Some(Utc.timestamp_opt(30, 0).unwrap()));
        assert_eq!(history.current, Some("203.0.113.3".parse().unwrap()));
    }

    #[test]
    fn empty_history() {
        let history = History::from_entries(&[]);
        assert!(history.ips.is_empty());
        assert_eq!(history.first_seen, None);
        assert_eq!(history.current, None);
    }
}
