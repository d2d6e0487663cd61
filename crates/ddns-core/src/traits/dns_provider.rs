// # DNS Provider Trait
//
// Defines the uniform contract every vendor adapter implements.
//
// ## Implementations
//
// - `ddns-providers` crate: one module per vendor, DynDNS-2 text family and
//   REST/JSON family.
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::traits::{DnsProvider, UpdateTarget};
//
// let client = ddns_core::transport::build_client(Duration::from_secs(10))?;
// let target = UpdateTarget::address("203.0.113.7".parse()?);
// let confirmed = provider.update(&client, target).await?;
// ```

use async_trait::async_trait;
use std::net::IpAddr;

use crate::config::{IpVersion, RecordConfig};

/// The address an update call asks the vendor to set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateTarget {
    /// Address to set; unspecified when the vendor picks it
    pub ip: IpAddr,

    /// The request must omit the IP and let the vendor use the source address
    pub provider_supplied: bool,
}

impl UpdateTarget {
    /// Target an explicit address
    pub fn address(ip: IpAddr) -> Self {
        Self {
            ip,
            provider_supplied: false,
        }
    }

    /// Let the vendor observe the source address
    ///
    /// `ip` is the address resolved locally, if any, or the unspecified
    /// address of the family.
    pub fn provider_supplied(ip: IpAddr) -> Self {
        Self {
            ip,
            provider_supplied: true,
        }
    }

    pub fn is_ipv6(&self) -> bool {
        self.ip.is_ipv6()
    }

    /// `A` for IPv4 and `AAAA` for IPv6
    pub fn record_type(&self) -> &'static str {
        if self.ip.is_ipv6() { "AAAA" } else { "A" }
    }

    /// Whether the request carries the IP explicitly
    pub fn sends_ip(&self) -> bool {
        !self.provider_supplied && !self.ip.is_unspecified()
    }
}

/// Row shown by the HTML status page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlRow {
    /// Link to the record name
    pub domain: String,
    pub owner: String,
    /// Link to the vendor
    pub provider: String,
    pub ip_version: String,
}

/// Static description of an adapter instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescription {
    pub provider: &'static str,
    pub domain: String,
    pub owner: String,
    pub ip_version: IpVersion,
    pub proxied: bool,
    pub html: HtmlRow,
}

impl ProviderDescription {
    /// Build a description for a record with the vendor's display name and homepage
    ///
    /// # Parameters
    ///
    /// - `provider`: Registered provider name (e.g., "duckdns")
    /// - `display_name`: Human-readable vendor name (e.g., "DuckDNS")
    /// - `homepage`: Vendor homepage used in the HTML link
    /// - `record`: The record the adapter was built from
    pub fn new(
        provider: &'static str,
        display_name: &str,
        homepage: &str,
        record: &RecordConfig,
    ) -> Self {
        let fqdn = record.fqdn();
        Self {
            provider,
            domain: record.domain.clone(),
            owner: record.owner.clone(),
            ip_version: record.ip_version,
            proxied: record.proxied,
            html: HtmlRow {
                domain: format!("<a href=\"http://{fqdn}\">{fqdn}</a>"),
                owner: record.owner.clone(),
                provider: format!("<a href=\"{homepage}\">{display_name}</a>"),
                ip_version: record.ip_version.to_string(),
            },
        }
    }

    /// Override the proxied flag when the adapter ignores the hint
    pub fn with_proxied(mut self, proxied: bool) -> Self {
        self.proxied = proxied;
        self
    }
}

/// Trait for DNS provider adapters
///
/// One instance is built per declared record and holds that record's
/// credentials. The engine owns everything around the call: locking,
/// diffing against the last confirmed IP, persistence and retries on the
/// next tick.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// ## Allowed Capabilities
/// - Perform HTTP/HTTPS API calls to their vendor endpoints only, through
///   the shared client handed to [`DnsProvider::update`]
/// - Parse vendor responses and classify them into [`crate::Error`] kinds
///
/// ## Forbidden Capabilities
/// - Spawn tasks or threads
/// - Retry or back off within a call
/// - Access the record store
/// - Log credentials or URLs carrying them
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Set the record to `target` and return the IP the vendor confirms
    ///
    /// # Idempotency
    ///
    /// Calling with the IP already set must succeed and return that IP.
    /// Adapters without a native upsert look the record up first and
    /// create it only when the lookup finds nothing.
    ///
    /// # Parameters
    ///
    /// - `client`: Shared outbound HTTP client
    /// - `target`: Address to set, or provider-supplied mode
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: The confirmed IP; `target.ip` when the vendor echoes nothing
    /// - `Err(Error)`: A classified failure
    async fn update(
        &self,
        client: &reqwest::Client,
        target: UpdateTarget,
    ) -> Result<IpAddr, crate::Error>;

    /// Describe the record for logs and the status page
    fn describe(&self) -> ProviderDescription;

    /// Whether the vendor can observe the IP from the request source address
    fn supports_provider_ip(&self) -> bool {
        false
    }
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance for one record
    ///
    /// Credentials are validated here; an invalid bag never yields an instance.
    ///
    /// # Parameters
    ///
    /// - `record`: The declared record, including its credential map
    ///
    /// # Returns
    ///
    /// A boxed DnsProvider trait object
    fn create(&self, record: &RecordConfig) -> Result<Box<dyn DnsProvider>, crate::Error>;
}

impl<F> DnsProviderFactory for F
where
    F: Fn(&RecordConfig) -> Result<Box<dyn DnsProvider>, crate::Error> + Send + Sync,
{
    fn create(&self, record: &RecordConfig) -> Result<Box<dyn DnsProvider>, crate::Error> {
        self(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_follows_family() {
        let v4 = UpdateTarget::address("203.0.113.7".parse().unwrap());
        let v6 = UpdateTarget::address("2001:db8::1".parse().unwrap());
        assert_eq!(v4.record_type(), "A");
        assert_eq!(v6.record_type(), "AAAA");
        assert!(v4.sends_ip());
    }

    #[test]
    fn provider_supplied_target_sends_no_ip() {
        let target = UpdateTarget::provider_supplied("203.0.113.7".parse().unwrap());
        assert!(!target.sends_ip());
        let unspecified = UpdateTarget::address(IpVersion::V4.unspecified());
        assert!(!unspecified.sends_ip());
    }

    #[test]
    fn description_links_record_and_vendor() {
        let record = RecordConfig::new("duckdns", "example.duckdns.org");
        let description =
            ProviderDescription::new("duckdns", "DuckDNS", "https://www.duckdns.org/", &record);
        assert_eq!(
            description.html.provider,
            "<a href=\"https://www.duckdns.org/\">DuckDNS</a>"
        );
        assert_eq!(
            description.html.domain,
            "<a href=\"http://example.duckdns.org\">example.duckdns.org</a>"
        );
        assert_eq!(description.html.ip_version, "ipv4");
    }
}
