// # DNS IP Source
//
// This crate provides the DNS echo strategy of the public IP resolver and
// the host lookup used by the healthcheck.
//
// ## Echo servers
//
// An echo server answers a well-known name with the source address of the
// query. Each echo is asked directly over the family being resolved, so an
// IPv6 answer always reflects the IPv6 route out of this host:
//
// - OpenDNS: `myip.opendns.com` `A`/`AAAA` at resolver1.opendns.com
// - Google: `o-o.myaddr.l.google.com` `TXT` at ns1.google.com
//
// Every fetch builds a fresh resolver with caching disabled.

use ddns_core::config::{IpStrategy, IpVersion, ResolverConfig};
use ddns_core::health::HostLookup;
use ddns_core::traits::{IpSource, IpSourceFactory};
use ddns_core::{Error, ProviderRegistry, Result};

use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig as NameServers, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::TokioAsyncResolver;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use tracing::{debug, warn};

/// How an echo server encodes the address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoAnswer {
    /// Answered as an `A` or `AAAA` record
    Address,
    /// Answered as the first string of a `TXT` record
    Txt,
}

/// One DNS echo server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Echo {
    pub name: &'static str,
    pub server_v4: Ipv4Addr,
    pub server_v6: Ipv6Addr,
    pub answer: EchoAnswer,
}

pub const OPENDNS: Echo = Echo {
    name: "myip.opendns.com.",
    server_v4: Ipv4Addr::new(208, 67, 222, 222),
    server_v6: Ipv6Addr::new(0x2620, 0x119, 0x35, 0, 0, 0, 0, 0x35),
    answer: EchoAnswer::Address,
};

pub const GOOGLE: Echo = Echo {
    name: "o-o.myaddr.l.google.com.",
    server_v4: Ipv4Addr::new(216, 239, 32, 10),
    server_v6: Ipv6Addr::new(0x2001, 0x4860, 0x4802, 0x32, 0, 0, 0, 0xa),
    answer: EchoAnswer::Txt,
};

impl Echo {
    fn server(&self, version: IpVersion) -> IpAddr {
        match version {
            IpVersion::V6 => IpAddr::V6(self.server_v6),
            _ => IpAddr::V4(self.server_v4),
        }
    }

    fn record_type(&self, version: IpVersion) -> RecordType {
        match (self.answer, version) {
            (EchoAnswer::Txt, _) => RecordType::TXT,
            (EchoAnswer::Address, IpVersion::V6) => RecordType::AAAA,
            (EchoAnswer::Address, _) => RecordType::A,
        }
    }
}

/// DNS echo IP source
pub struct DnsIpSource {
    echoes: Vec<Echo>,
    timeout: Duration,
}

impl DnsIpSource {
    /// Create a source over the built-in echo servers
    pub fn new(timeout: Duration) -> Self {
        Self::with_echoes(vec![OPENDNS, GOOGLE], timeout)
    }

    pub fn with_echoes(echoes: Vec<Echo>, timeout: Duration) -> Self {
        Self { echoes, timeout }
    }

    fn resolver_for(&self, server: IpAddr) -> TokioAsyncResolver {
        let servers = NameServerConfigGroup::from_ips_clear(&[server], 53, true);
        let config = NameServers::from_parts(None, vec![], servers);

        let mut opts = ResolverOpts::default();
        opts.timeout = self.timeout;
        opts.attempts = 1;
        opts.cache_size = 0;
        opts.use_hosts_file = false;

        TokioAsyncResolver::tokio(config, opts)
    }

    /// Ask one echo server over the family `version` (never `V4OrV6`)
    async fn query(&self, echo: &Echo, version: IpVersion) -> Result<IpAddr> {
        let server = echo.server(version);
        let resolver = self.resolver_for(server);
        let lookup = resolver
            .lookup(echo.name, echo.record_type(version))
            .await
            .map_err(|e| lookup_error(echo.name, &server, e))?;

        let answers: Vec<IpAddr> = lookup.iter().filter_map(answer_ip).collect();
        let ip = answers
            .into_iter()
            .find(|ip| version.accepts(*ip))
            .ok_or_else(|| {
                Error::ip_source(format!("no {} address in answer for {} from {}", version, echo.name, server))
            })?;
        Ok(ip)
    }
}

/// Extract an address from one answer record
fn answer_ip(data: &RData) -> Option<IpAddr> {
    match data {
        RData::A(a) => Some(IpAddr::V4(a.0)),
        RData::AAAA(aaaa) => Some(IpAddr::V6(aaaa.0)),
        RData::TXT(txt) => {
            let first = txt.txt_data().first()?;
            parse_txt(first)
        }
        _ => None,
    }
}

fn parse_txt(data: &[u8]) -> Option<IpAddr> {
    std::str::from_utf8(data).ok()?.trim().trim_matches('"').parse().ok()
}

fn lookup_error(name: &str, server: &IpAddr, e: ResolveError) -> Error {
    match e.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => {
            Error::ip_source(format!("no answer for {} from {}", name, server))
        }
        ResolveErrorKind::Timeout => Error::ip_source(format!("query for {} to {} timed out", name, server)),
        _ => Error::ip_source(format!("query for {} to {}: {}", name, server, e)),
    }
}

#[async_trait::async_trait]
impl IpSource for DnsIpSource {
    async fn fetch(&self, version: IpVersion) -> Result<IpAddr> {
        let families: &[IpVersion] = match version {
            IpVersion::V4OrV6 => &[IpVersion::V4, IpVersion::V6],
            IpVersion::V4 => &[IpVersion::V4],
            IpVersion::V6 => &[IpVersion::V6],
        };

        let mut last_error = None;
        for family in families {
            for echo in &self.echoes {
                match self.query(echo, *family).await {
                    Ok(ip) => {
                        debug!(name = echo.name, %ip, "DNS echo answered");
                        return Ok(ip);
                    }
                    Err(e) => {
                        warn!(name = echo.name, "DNS echo failed: {}", e);
                        last_error = Some(e);
                    }
                }
            }
        }

        Err(match last_error {
            Some(e) => Error::ip_source(format!("every DNS echo failed, last: {}", e)),
            None => Error::ip_source(format!("no DNS echo for {}", version)),
        })
    }

    fn strategy(&self) -> IpStrategy {
        IpStrategy::Dns
    }
}

/// Factory for creating DNS IP sources
pub struct DnsFactory;

impl IpSourceFactory for DnsFactory {
    fn create(&self, config: &ResolverConfig) -> Result<Box<dyn IpSource>> {
        Ok(Box::new(DnsIpSource::new(config.timeout())))
    }
}

/// Register the DNS IP source with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_ip_source(IpStrategy::Dns, Box::new(DnsFactory));
}

/// Host lookup through the system resolver configuration
pub struct SystemHostLookup {
    resolver: TokioAsyncResolver,
}

impl SystemHostLookup {
    pub fn new() -> Result<Self> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| Error::config(format!("system resolver configuration: {}", e)))?;
        Ok(Self { resolver })
    }
}

#[async_trait::async_trait]
impl HostLookup for SystemHostLookup {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>> {
        // Always observe the live record
        self.resolver.clear_cache();

        match self.resolver.lookup_ip(host).await {
            Ok(found) => Ok(found.iter().collect()),
            Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => Ok(Vec::new()),
            Err(e) => Err(Error::transport(format!("resolving {}: {}", host, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_resolver::proto::rr::rdata::{A, AAAA, TXT};

    #[test]
    fn test_factory_creation() {
        let source = DnsFactory.create(&ResolverConfig::default()).unwrap();
        assert_eq!(source.strategy(), IpStrategy::Dns);
    }

    #[test]
    fn test_query_shape_follows_family() {
        assert_eq!(OPENDNS.record_type(IpVersion::V4), RecordType::A);
        assert_eq!(OPENDNS.record_type(IpVersion::V6), RecordType::AAAA);
        assert_eq!(GOOGLE.record_type(IpVersion::V6), RecordType::TXT);
        assert_eq!(GOOGLE.server(IpVersion::V6), "2001:4860:4802:32::a".parse::<IpAddr>().unwrap());
        assert_eq!(OPENDNS.server(IpVersion::V4), "208.67.222.222".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_answer_extraction() {
        let v4 = Ipv4Addr::new(203, 0, 113, 7);
        let v6: Ipv6Addr = "2001:db8::7".parse().unwrap();

        assert_eq!(answer_ip(&RData::A(A(v4))), Some(IpAddr::V4(v4)));
        assert_eq!(answer_ip(&RData::AAAA(AAAA(v6))), Some(IpAddr::V6(v6)));
        assert_eq!(
            answer_ip(&RData::TXT(TXT::new(vec!["203.0.113.7".to_string()]))),
            Some(IpAddr::V4(v4))
        );
        assert_eq!(
            answer_ip(&RData::TXT(TXT::new(vec!["edns0-client-subnet 198.51.100.0/24".to_string()]))),
            None
        );
    }

    #[tokio::test]
    async fn test_no_echo_configured() {
        let source = DnsIpSource::with_echoes(Vec::new(), Duration::from_secs(1));
        let err = tokio_test::assert_err!(source.fetch(IpVersion::V4).await);
        assert_eq!(err.kind(), ddns_core::ErrorKind::Resolver);
    }
}
