//! Strato
//!
//! ```http
//! GET https://dyndns.strato.com/nic/update?hostname=:fqdn&myip=:ip
//! Authorization: Basic :domain::password
//! ```

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::{RecordConfig, Result};
use reqwest::Url;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::{common, dyndns};

pub const NAME: &str = "strato";

const BASE_URL: &str = "https://dyndns.strato.com";

pub struct StratoProvider {
    domain: String,
    password: String,
    fqdn: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for StratoProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StratoProvider")
            .field("fqdn", &self.fqdn)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

impl StratoProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            domain: record.domain.clone(),
            password: common::required(record, NAME, "password")?,
            fqdn: record.fqdn(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Strato DNS", "https://www.strato.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

#[async_trait]
impl DnsProvider for StratoProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let url = dyndns::nic_update_url(&self.base, "/nic/update", &self.fqdn, target)?;
        debug!(fqdn = %self.fqdn, "updating Strato host");
        let request = client.get(url).basic_auth(&self.domain, Some(&self.password));
        dyndns::send(request, target).await
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }

    fn supports_provider_ip(&self) -> bool {
        true
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(StratoProvider::new(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddns_core::ErrorKind;
    use ddns_core::transport;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn domain_is_the_username() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nic/update"))
            .and(query_param("hostname", "www.example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_string("abuse"))
            .mount(&server)
            .await;

        let record = RecordConfig::new(NAME, "example.com")
            .with_owner("www")
            .with_credential("password", "pass");
        let provider = StratoProvider::new(&record)
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap());
        let client = transport::build_client(transport::DEFAULT_TIMEOUT).unwrap();
        let target = UpdateTarget::address("203.0.113.7".parse().unwrap());
        let err = provider.update(&client, target).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Abuse);

        let requests = server.received_requests().await.unwrap();
        let auth = requests[0].headers.get("authorization").unwrap().to_str().unwrap();
        // example.com:pass
        assert_eq!(auth, "Basic ZXhhbXBsZS5jb206cGFzcw==");
    }
}
