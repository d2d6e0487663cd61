// # IP Source Trait
//
// Defines the interface for one public IP resolution strategy.
//
// ## Implementations
//
// - DNS echo: `ddns-ip-dns` crate
// - HTTPS echo: `ddns-ip-http` crate
// - Local interfaces: `ddns-ip-interface` crate
//
// Sources are stateless: every call performs a fresh lookup. The ordering
// and fallthrough policy across sources lives in `crate::resolver`.

use async_trait::async_trait;
use std::net::IpAddr;

use crate::config::{IpStrategy, IpVersion, ResolverConfig};

/// Trait for public IP sources
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Resolve the current public IP for `version`
    ///
    /// # Parameters
    ///
    /// - `version`: Requested family; `V4OrV6` accepts either
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: An address of the requested family
    /// - `Err(Error)`: Every endpoint of this strategy failed
    async fn fetch(&self, version: IpVersion) -> Result<IpAddr, crate::Error>;

    /// The strategy this source implements
    fn strategy(&self) -> IpStrategy;
}

/// Helper trait for constructing IP sources from configuration
pub trait IpSourceFactory: Send + Sync {
    /// Create an IpSource instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Resolver settings shared by all strategies
    ///
    /// # Returns
    ///
    /// A boxed IpSource trait object
    fn create(&self, config: &ResolverConfig) -> Result<Box<dyn IpSource>, crate::Error>;
}
