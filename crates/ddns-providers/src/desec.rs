//! deSEC
//!
//! ```http
//! GET https://update.dedyn.io/nic/update?hostname=:fqdn&myip=:ip
//! Authorization: Basic :fqdn::token
//! ```

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{StatusCode, Url};
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::{common, dyndns};

pub const NAME: &str = "desec";

const BASE_URL: &str = "https://update.dedyn.io";

pub struct DesecProvider {
    fqdn: String,
    token: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for DesecProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DesecProvider")
            .field("fqdn", &self.fqdn)
            .field("token", &"<REDACTED>")
            .finish()
    }
}

impl DesecProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            fqdn: record.fqdn(),
            token: common::required(record, NAME, "token")?,
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "deSEC", "https://desec.io/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

#[async_trait]
impl DnsProvider for DesecProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let url = dyndns::nic_update_url(&self.base, "/nic/update", &self.fqdn, target)?;
        debug!(fqdn = %self.fqdn, "updating deSEC record");
        let response = client
            .get(url)
            .basic_auth(&self.fqdn, Some(&self.token))
            .send()
            .await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        match status {
            StatusCode::UNAUTHORIZED => Err(Error::auth(single_line(&body))),
            StatusCode::NOT_FOUND => Err(Error::hostname_not_exists(single_line(&body))),
            _ => dyndns::interpret(status, &body, target),
        }
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }

    fn supports_provider_ip(&self) -> bool {
        true
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(DesecProvider::new(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddns_core::ErrorKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> DesecProvider {
        let record = RecordConfig::new(NAME, "example.dedyn.io").with_credential("token", "t0k3n");
        DesecProvider::new(&record)
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap())
    }

    #[tokio::test]
    async fn not_found_status_means_unknown_host() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nic/update"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not found."))
            .mount(&server)
            .await;

        let client = transport::build_client(transport::DEFAULT_TIMEOUT).unwrap();
        let target = UpdateTarget::address("203.0.113.7".parse().unwrap());
        let err = provider(&server).update(&client, target).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HostnameNotExists);
    }

    #[tokio::test]
    async fn good_without_echo_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("good"))
            .mount(&server)
            .await;

        let client = transport::build_client(transport::DEFAULT_TIMEOUT).unwrap();
        let target = UpdateTarget::address("2001:db8::7".parse().unwrap());
        assert_eq!(provider(&server).update(&client, target).await.unwrap(), target.ip);
    }
}
