// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Purpose
//
// Provides a simple, fast state store that doesn't persist across restarts.
// Useful for testing, containerized deployments with restarts, or scenarios
// where persistence isn't critical.
//
// ## Crash Behavior
//
// - All history is lost on restart/crash
// - The first cycle after a restart sends every record to its provider

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::table::HistoryTable;
use crate::Error;
use crate::traits::state_store::{History, HistoryEntry, StateStore, StateStoreFactory};

/// In-memory state store implementation
///
/// # Example
///
/// ```rust,no_run
/// use ddns_core::state::MemoryStateStore;
/// use ddns_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStateStore::new();
///     let now = chrono::Utc::now();
///
///     store.record_new_ip("example.com", "@", "1.2.3.4".parse()?, now).await?;
///
///     let history = store.history("example.com", "@").await?;
///     assert_eq!(history.current, Some("1.2.3.4".parse()?));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<HistoryTable>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of rows in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn record_new_ip(
        &self,
        domain: &str,
        owner: &str,
        ip: IpAddr,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.inner.write().await.record_new_ip(domain, owner, ip, now);
        Ok(())
    }

    async fn touch_current(
        &self,
        domain: &str,
        owner: &str,
        ip: IpAddr,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.inner.write().await.touch_current(domain, owner, ip, now);
        Ok(())
    }

    async fn history(&self, domain: &str, owner: &str) -> Result<History, Error> {
        let guard = self.inner.read().await;
        Ok(History::from_entries(&guard.entries(domain, owner)))
    }

    async fn entries(&self, domain: &str, owner: &str) -> Result<Vec<HistoryEntry>, Error> {
        Ok(self.inner.read().await.entries(domain, owner))
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing buffered
        Ok(())
    }
}

/// Factory for creating memory state stores
pub struct MemoryStateStoreFactory;

#[async_trait]
impl StateStoreFactory for MemoryStateStoreFactory {
    async fn create(&self, _config: &serde_json::Value) -> Result<Box<dyn StateStore>, Error> {
        Ok(Box::new(MemoryStateStore::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStateStore::new();
        assert!(store.is_empty().await);

        let ip: IpAddr = "1.2.3.4".parse().unwrap();
        let t0 = Utc.timestamp_opt(1_000, 0).unwrap();
        tokio_test::assert_ok!(store.record_new_ip("example.com", "@", ip, t0).await);
        assert_eq!(store.len().await, 1);

        let history = store.history("example.com", "@").await.unwrap();
        assert_eq!(history.ips, vec![ip]);
        assert_eq!(history.first_seen, Some(t0));
    }

    #[tokio::test]
    async fn test_memory_store_pairs_are_independent() {
        let store = MemoryStateStore::new();
        let t0 = Utc.timestamp_opt(1_000, 0).unwrap();

        store
            .record_new_ip("example.com", "@", "1.2.3.4".parse().unwrap(), t0)
            .await
            .unwrap();
        store
            .record_new_ip("example.com", "www", "5.6.7.8".parse().unwrap(), t0)
            .await
            .unwrap();

        let apex = store.entries("example.com", "@").await.unwrap();
        let www = store.entries("example.com", "www").await.unwrap();
        assert!(apex[0].current);
        assert!(www[0].current);
    }
}
