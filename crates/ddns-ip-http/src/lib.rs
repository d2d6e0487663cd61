// # HTTP IP Source
//
// This crate provides the HTTPS echo strategy of the public IP resolver.
//
// ## Architecture
//
// Each family has an ordered list of echo endpoints. A fetch walks the
// list and returns the first address of the requested family found in a
// response body; an endpoint that bans us, answers with a non-200 status
// or returns zero or several addresses is skipped with a warning.
//
// ## Endpoints
//
// Plain text endpoints only (ipify, icanhazip, ident.me, wtfismyip, seeip,
// ifconfig.io, ipinfo.io). For `ipv4 or ipv6` the dual-stack endpoints are
// used and an IPv4 answer takes priority over an IPv6 one.

use ddns_core::config::{IpStrategy, IpVersion, ResolverConfig};
use ddns_core::traits::{IpSource, IpSourceFactory};
use ddns_core::transport::{self, find_ips, single_line};
use ddns_core::{Error, ProviderRegistry, Result};

use reqwest::StatusCode;
use std::net::IpAddr;
use tracing::{debug, warn};

/// IPv4-only echo endpoints
pub const IPV4_ENDPOINTS: &[&str] = &[
    "https://api.ipify.org",
    "https://ipv4.icanhazip.com",
    "https://v4.ident.me",
    "https://ipv4.wtfismyip.com/text",
    "https://ipv4.seeip.org",
];

/// IPv6-only echo endpoints
pub const IPV6_ENDPOINTS: &[&str] = &[
    "https://api6.ipify.org",
    "https://ipv6.icanhazip.com",
    "https://v6.ident.me",
    "https://ipv6.wtfismyip.com/text",
    "https://ipv6.seeip.org",
];

/// Dual-stack echo endpoints
pub const DUAL_STACK_ENDPOINTS: &[&str] = &[
    "https://api64.ipify.org",
    "https://icanhazip.com",
    "https://ident.me",
    "https://ifconfig.io/ip",
    "https://ipinfo.io/ip",
    "https://api.seeip.org",
];

/// HTTPS echo IP source
pub struct HttpIpSource {
    client: reqwest::Client,
    ipv4: Vec<String>,
    ipv6: Vec<String>,
    dual_stack: Vec<String>,
}

impl HttpIpSource {
    /// Create a source over the built-in endpoint lists
    pub fn new(client: reqwest::Client) -> Self {
        let owned = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            client,
            ipv4: owned(IPV4_ENDPOINTS),
            ipv6: owned(IPV6_ENDPOINTS),
            dual_stack: owned(DUAL_STACK_ENDPOINTS),
        }
    }

    /// Use the same endpoint list for every family
    pub fn with_endpoints(client: reqwest::Client, endpoints: Vec<String>) -> Self {
        Self {
            client,
            ipv4: endpoints.clone(),
            ipv6: endpoints.clone(),
            dual_stack: endpoints,
        }
    }

    fn endpoints(&self, version: IpVersion) -> &[String] {
        match version {
            IpVersion::V4 => &self.ipv4,
            IpVersion::V6 => &self.ipv6,
            IpVersion::V4OrV6 => &self.dual_stack,
        }
    }

    /// Fetch one endpoint and extract exactly one address of `version`
    async fn fetch_one(&self, url: &str, version: IpVersion) -> Result<IpAddr> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = transport::read_body(response).await?;

        match status {
            StatusCode::OK => {}
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                return Err(Error::RateLimited(format!(
                    "banned by {}: {} ({})",
                    url,
                    status.as_u16(),
                    single_line(&body)
                )));
            }
            _ => return Err(Error::bad_status(status.as_u16(), single_line(&body))),
        }

        let (v4, v6) = find_ips(&body);
        let v4: Vec<IpAddr> = v4.into_iter().map(IpAddr::V4).collect();
        let v6: Vec<IpAddr> = v6.into_iter().map(IpAddr::V6).collect();

        let candidates = match version {
            IpVersion::V4 => v4,
            IpVersion::V6 => v6,
            // IPv4 has priority when both are present
            IpVersion::V4OrV6 if v4.len() == 1 => v4,
            IpVersion::V4OrV6 if v4.is_empty() => v6,
            IpVersion::V4OrV6 => v4,
        };

        match candidates.as_slice() {
            [ip] => Ok(*ip),
            [] => Err(Error::ip_source(format!("no {} address found at {}", version, url))),
            many => Err(Error::ip_source(format!(
                "found {} {} addresses at {} instead of 1",
                many.len(),
                version,
                url
            ))),
        }
    }
}

#[async_trait::async_trait]
impl IpSource for HttpIpSource {
    async fn fetch(&self, version: IpVersion) -> Result<IpAddr> {
        let endpoints = self.endpoints(version);
        let mut last_error = None;

        for url in endpoints {
            match self.fetch_one(url, version).await {
                Ok(ip) => {
                    debug!(%url, %ip, "HTTP echo answered");
                    return Ok(ip);
                }
                Err(e) => {
                    warn!(%url, "HTTP echo failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => Error::ip_source(format!("every HTTP echo endpoint failed, last: {}", e)),
            None => Error::ip_source(format!("no HTTP echo endpoint for {}", version)),
        })
    }

    fn strategy(&self) -> IpStrategy {
        IpStrategy::Http
    }
}

/// Factory for creating HTTP IP sources
pub struct HttpFactory;

impl IpSourceFactory for HttpFactory {
    fn create(&self, config: &ResolverConfig) -> Result<Box<dyn IpSource>> {
        let client = transport::build_client(config.timeout())?;
        Ok(Box::new(HttpIpSource::new(client)))
    }
}

/// Register the HTTP IP source with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_ip_source(IpStrategy::Http, Box::new(HttpFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn serve(server: &MockServer, route: &str, status: u16, body: &str) -> String {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
        format!("{}{}", server.uri(), route)
    }

    fn client() -> reqwest::Client {
        transport::build_client(transport::DEFAULT_TIMEOUT).unwrap()
    }

    #[test]
    fn test_factory_creation() {
        let factory = HttpFactory;
        let source = factory.create(&ResolverConfig::default()).unwrap();
        assert_eq!(source.strategy(), IpStrategy::Http);
    }

    #[tokio::test]
    async fn test_first_endpoint_with_an_address_wins() {
        let server = MockServer::start().await;
        let banned = serve(&server, "/banned", 429, "slow down").await;
        let empty = serve(&server, "/empty", 200, "nothing here").await;
        let good = serve(&server, "/ip", 200, "203.0.113.7\n").await;

        let source = HttpIpSource::with_endpoints(client(), vec![banned, empty, good]);
        let ip = source.fetch(IpVersion::V4).await.unwrap();
        assert_eq!(ip, "203.0.113.7".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_family_is_filtered() {
        let server = MockServer::start().await;
        let v6 = serve(&server, "/v6", 200, "2001:db8::7").await;

        let source = HttpIpSource::with_endpoints(client(), vec![v6]);
        assert!(source.fetch(IpVersion::V4).await.is_err());
        assert_eq!(
            source.fetch(IpVersion::V6).await.unwrap(),
            "2001:db8::7".parse::<IpAddr>().unwrap()
        );
    }

    #[tokio::test]
    async fn test_dual_stack_prefers_ipv4() {
        let server = MockServer::start().await;
        let both = serve(&server, "/both", 200, "2001:db8::7 203.0.113.7").await;

        let source = HttpIpSource::with_endpoints(client(), vec![both]);
        assert_eq!(
            source.fetch(IpVersion::V4OrV6).await.unwrap(),
            "203.0.113.7".parse::<IpAddr>().unwrap()
        );
    }

    #[tokio::test]
    async fn test_several_addresses_are_rejected() {
        let server = MockServer::start().await;
        let many = serve(&server, "/many", 200, "203.0.113.7 203.0.113.8").await;

        let source = HttpIpSource::with_endpoints(client(), vec![many]);
        let err = source.fetch(IpVersion::V4).await.unwrap_err();
        assert_eq!(err.kind(), ddns_core::ErrorKind::Resolver);
    }
}
