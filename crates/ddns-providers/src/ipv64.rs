//! IPv64
//!
//! ```http
//! GET https://ipv64.net/nic/update?key=:key&domain=:fqdn&ip=:ipv4
//! GET https://ipv64.net/nic/update?key=:key&domain=:fqdn&ip6=:ipv6
//! ```

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, RedactedUrl, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{StatusCode, Url};
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::common;

pub const NAME: &str = "ipv64";

const BASE_URL: &str = "https://ipv64.net";

pub struct Ipv64Provider {
    key: String,
    fqdn: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for Ipv64Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ipv64Provider")
            .field("key", &"<REDACTED>")
            .field("fqdn", &self.fqdn)
            .finish()
    }
}

impl Ipv64Provider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            key: common::required(record, NAME, "key")?,
            fqdn: record.fqdn(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "IPv64", "https://ipv64.net/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

#[async_trait]
impl DnsProvider for Ipv64Provider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let mut url = common::endpoint(&self.base, "/nic/update")?;
        url.query_pairs_mut()
            .append_pair("key", &self.key)
            .append_pair("domain", &self.fqdn)
            .append_pair(if target.is_ipv6() { "ip6" } else { "ip" }, &target.ip.to_string());
        debug!(url = %RedactedUrl::new(&url, &["key"]), "updating IPv64 domain");

        let response = client.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::OK {
            return Ok(target.ip);
        }
        let body = transport::read_body(response).await?;
        Err(Error::bad_status(status.as_u16(), single_line(&body)))
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(Ipv64Provider::new(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn ipv6_address_goes_in_ip6() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nic/update"))
            .and(query_param("key", "k"))
            .and(query_param("domain", "home.example.ipv64.net"))
            .and(query_param("ip6", "2001:db8::7"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"info\":\"good\"}"))
            .expect(1)
            .mount(&server)
            .await;

        let record = RecordConfig::new(NAME, "example.ipv64.net")
            .with_owner("home")
            .with_credential("key", "k");
        let provider = Ipv64Provider::new(&record)
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap());
        let client = transport::build_client(transport::DEFAULT_TIMEOUT).unwrap();
        let target = UpdateTarget::address("2001:db8::7".parse().unwrap());
        assert_eq!(provider.update(&client, target).await.unwrap(), target.ip);
    }
}
