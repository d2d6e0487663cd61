//! Plugin-based provider registry
//!
//! The registry allows DNS providers, IP sources and state stores to be
//! registered dynamically at runtime, avoiding hardcoded if-else chains.
//! Dispatch is by name: the `provider` field of a record, the strategy
//! name of the resolver, the `type` of the state store configuration.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ddns_core::registry::ProviderRegistry;
//!
//! let registry = ProviderRegistry::new();
//! registry.register_provider("duckdns", Box::new(duckdns::create));
//! registry.register_ip_source("http", Box::new(HttpIpSourceFactory));
//!
//! let providers = registry.create_providers(&config)?;
//! let resolver = registry.create_resolver(&config)?;
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{DdnsConfig, IpStrategy, RecordConfig, StateStoreConfig};
use crate::error::{Error, Result};
use crate::resolver::Resolver;
use crate::state::{FileStateStoreFactory, MemoryStateStoreFactory};
use crate::traits::{DnsProvider, IpSource, StateStore};
use crate::traits::{DnsProviderFactory, IpSourceFactory, StateStoreFactory};

/// Provider registry for plugin-based creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered DNS provider factories
    providers: RwLock<HashMap<String, Box<dyn DnsProviderFactory>>>,

    /// Registered IP source factories, keyed by strategy name
    ip_sources: RwLock<HashMap<String, Box<dyn IpSourceFactory>>>,

    /// Registered state store factories
    state_stores: RwLock<HashMap<String, Arc<dyn StateStoreFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the `file` and `memory` state stores registered
    pub fn with_builtin_stores() -> Self {
        let registry = Self::new();
        registry.register_state_store("file", Box::new(FileStateStoreFactory));
        registry.register_state_store("memory", Box::new(MemoryStateStoreFactory));
        registry
    }

    /// Register a DNS provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider name as written in records (e.g., "duckdns", "route53")
    /// - `factory`: Factory object for creating provider instances
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        providers.insert(name.into(), factory);
    }

    /// Register an IP source factory
    ///
    /// # Parameters
    ///
    /// - `strategy`: Strategy the source implements
    /// - `factory`: Factory object for creating IP source instances
    pub fn register_ip_source(&self, strategy: IpStrategy, factory: Box<dyn IpSourceFactory>) {
        let mut sources = self.ip_sources.write().unwrap_or_else(PoisonError::into_inner);
        sources.insert(strategy.as_str().to_string(), factory);
    }

    /// Register a state store factory
    ///
    /// # Parameters
    ///
    /// - `name`: State store type name (e.g., "file", "memory")
    /// - `factory`: Factory object for creating state store instances
    pub fn register_state_store(&self, name: impl Into<String>, factory: Box<dyn StateStoreFactory>) {
        let mut stores = self.state_stores.write().unwrap_or_else(PoisonError::into_inner);
        stores.insert(name.into(), Arc::from(factory));
    }

    /// Create the adapter of one record
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsProvider>)`: Created provider instance
    /// - `Err(Error)`: If the provider is not registered or its settings are invalid
    pub fn create_provider(&self, record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = providers
            .get(record.provider.as_str())
            .ok_or_else(|| Error::config(format!("Unknown provider: {}", record.provider)))?;

        factory
            .create(record)
            .map_err(|e| Error::config(format!("{}: {}", record.id(), e)))
    }

    /// Create the adapters of every declared record, in declaration order
    pub fn create_providers(&self, config: &DdnsConfig) -> Result<Vec<Box<dyn DnsProvider>>> {
        config
            .records
            .iter()
            .map(|record| self.create_provider(record))
            .collect()
    }

    /// Create a resolver covering every strategy the configuration uses
    ///
    /// The global order and every per-record override are considered;
    /// `provider` needs no source.
    ///
    /// # Returns
    ///
    /// - `Ok(Resolver)`: One source per used strategy
    /// - `Err(Error)`: If a used strategy has no registered source
    pub fn create_resolver(&self, config: &DdnsConfig) -> Result<Resolver> {
        let mut used = BTreeSet::new();
        let overrides = config.records.iter().filter_map(|r| r.ip_strategy.as_ref());
        for strategy in std::iter::once(&config.resolver.strategies)
            .chain(overrides)
            .flatten()
        {
            if *strategy != IpStrategy::Provider {
                used.insert(strategy.as_str());
            }
        }

        let sources = self.ip_sources.read().unwrap_or_else(PoisonError::into_inner);
        let mut resolver = Resolver::default();
        for name in used {
            let factory = sources.get(name).ok_or_else(|| {
                Error::config(format!("No IP source registered for strategy: {}", name))
            })?;
            let source: Arc<dyn IpSource> = Arc::from(factory.create(&config.resolver)?);
            resolver = resolver.with_source(source);
        }

        Ok(resolver)
    }

    /// Create a state store from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn StateStore>)`: Created state store instance
    /// - `Err(Error)`: If store type is not registered or creation fails
    pub async fn create_state_store(&self, config: &StateStoreConfig) -> Result<Box<dyn StateStore>> {
        let store_type = config.type_name();

        let factory = self
            .state_stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(store_type)
            .cloned()
            .ok_or_else(|| Error::config(format!("Unknown state store type: {}", store_type)))?;

        // The lock is released before the async create
        let config_json = serde_json::to_value(config)?;
        factory.create(&config_json).await
    }

    /// List all registered provider names, sorted
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(name)
    }

    /// Check if a source is registered for `strategy`
    pub fn has_ip_source(&self, strategy: IpStrategy) -> bool {
        let sources = self.ip_sources.read().unwrap_or_else(PoisonError::into_inner);
        sources.contains_key(strategy.as_str())
    }

    /// Check if a state store type is registered
    pub fn has_state_store(&self, name: &str) -> bool {
        let stores = self.state_stores.read().unwrap_or_else(PoisonError::into_inner);
        stores.contains_key(name)
    }
}
