//! NextDNS linked IP
//!
//! ```http
//! GET https://link-ip.nextdns.io/:profile/:key
//! ```
//!
//! The endpoint path is the secret. NextDNS links the source address of the
//! request to the profile, so no address is ever sent.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, RedactedUrl};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::Url;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::common;

pub const NAME: &str = "nextdns";

const LINK_HOST: &str = "link-ip.nextdns.io";
const ENDPOINT_PATTERN: &str = r"^[0-9a-fA-F]{6}/[0-9a-fA-F]{16}$";

pub struct NextDnsProvider {
    endpoint: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for NextDnsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NextDnsProvider")
            .field("host", &self.base.host_str())
            .field("endpoint", &"<REDACTED>")
            .finish()
    }
}

impl NextDnsProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        common::reject_wildcard(record, NAME)?;
        let host = if record.owner == "link-ip" {
            LINK_HOST.to_string()
        } else {
            record.fqdn()
        };
        if !host.ends_with("nextdns.io") {
            return Err(Error::config(format!("{NAME}: {host} must end with nextdns.io")));
        }

        let endpoint = common::required(record, NAME, "endpoint")?;
        common::check_format(NAME, "endpoint", &endpoint, ENDPOINT_PATTERN)?;

        Ok(Self {
            endpoint,
            base: common::base_url(&format!("https://{host}"))?,
            description: ProviderDescription::new(NAME, "NextDNS", "https://nextdns.io/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

#[async_trait]
impl DnsProvider for NextDnsProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let url = common::endpoint(&self.base, &format!("/{}", self.endpoint))?;
        debug!(url = %RedactedUrl::new(&url, &[]).with_secret_path(&self.endpoint), "linking NextDNS address");

        transport::expect_status(client.get(url).send().await?, reqwest::StatusCode::OK).await?;
        Ok(target.ip)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }

    fn supports_provider_ip(&self) -> bool {
        true
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(NextDnsProvider::new(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddns_core::ErrorKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ENDPOINT: &str = "abc123/0123456789abcdef";

    fn record() -> RecordConfig {
        RecordConfig::new(NAME, "nextdns.io")
            .with_owner("link-ip")
            .with_credential("endpoint", ENDPOINT)
    }

    fn provider(server: &MockServer) -> NextDnsProvider {
        NextDnsProvider::new(&record())
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap())
    }

    fn client() -> reqwest::Client {
        transport::build_client(transport::DEFAULT_TIMEOUT).unwrap()
    }

    #[test]
    fn construction_checks_host_and_endpoint() {
        let provider = NextDnsProvider::new(&record()).unwrap();
        assert_eq!(provider.base.host_str(), Some(LINK_HOST));
        assert!(NextDnsProvider::new(&record().with_credential("endpoint", "abc123")).is_err());
        let elsewhere = RecordConfig::new(NAME, "example.com").with_credential("endpoint", ENDPOINT);
        assert!(NextDnsProvider::new(&elsewhere).is_err());
        assert!(!format!("{provider:?}").contains("0123456789abcdef"));
    }

    #[tokio::test]
    async fn link_request_hits_the_secret_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{ENDPOINT}")))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .expect(1)
            .mount(&server)
            .await;

        let target = UpdateTarget::provider_supplied("0.0.0.0".parse().unwrap());
        assert_eq!(provider(&server).update(&client(), target).await.unwrap(), target.ip);
    }

    #[tokio::test]
    async fn unknown_endpoint_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let target = UpdateTarget::address("203.0.113.7".parse().unwrap());
        let err = provider(&server).update(&client(), target).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownResponse);
    }
}
