//! DomainDiscount24
//!
//! ```http
//! GET https://dynamicdns.key-systems.net/update.php?hostname=:fqdn&password=:password&ip=:ip
//! ```
//!
//! `ip=auto` lets the vendor pick the source address.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, RedactedUrl, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{StatusCode, Url};
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::common;

pub const NAME: &str = "dd24";

const BASE_URL: &str = "https://dynamicdns.key-systems.net";

pub struct Dd24Provider {
    fqdn: String,
    password: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for Dd24Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dd24Provider")
            .field("fqdn", &self.fqdn)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

impl Dd24Provider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            fqdn: record.fqdn(),
            password: common::required(record, NAME, "password")?,
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "DD24", "https://www.domaindiscount24.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

/// Interpret the free-form answer of the update script
fn interpret(body: &str, target: UpdateTarget) -> Result<IpAddr> {
    let lower = body.to_ascii_lowercase();
    if lower.contains("authorization failed") {
        Err(Error::auth(single_line(body)))
    } else if lower.trim().is_empty() || lower.contains("success") {
        Ok(target.ip)
    } else {
        Err(Error::unknown_response(single_line(body)))
    }
}

#[async_trait]
impl DnsProvider for Dd24Provider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let mut url = common::endpoint(&self.base, "/update.php")?;
        let ip = if target.sends_ip() { target.ip.to_string() } else { "auto".to_string() };
        url.query_pairs_mut()
            .append_pair("hostname", &self.fqdn)
            .append_pair("password", &self.password)
            .append_pair("ip", &ip);
        debug!(url = %RedactedUrl::new(&url, &["password"]), "updating DD24 host");

        let response = client.get(url).send().await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        if status != StatusCode::OK {
            return Err(Error::bad_status(status.as_u16(), single_line(&body)));
        }
        interpret(&body, target)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }

    fn supports_provider_ip(&self) -> bool {
        true
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(Dd24Provider::new(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddns_core::ErrorKind;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn answers_are_matched_case_insensitively() {
        let target = UpdateTarget::address("203.0.113.7".parse().unwrap());
        assert!(interpret("Update Success", target).is_ok());
        assert!(interpret("", target).is_ok());
        assert_eq!(interpret("Authorization FAILED", target).unwrap_err().kind(), ErrorKind::Auth);
        assert_eq!(interpret("maintenance", target).unwrap_err().kind(), ErrorKind::UnknownResponse);
    }

    #[tokio::test]
    async fn vendor_pick_sends_auto() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/update.php"))
            .and(query_param("hostname", "example.com"))
            .and(query_param("password", "pass"))
            .and(query_param("ip", "auto"))
            .respond_with(ResponseTemplate::new(200).set_body_string("success"))
            .expect(1)
            .mount(&server)
            .await;

        let record = RecordConfig::new(NAME, "example.com").with_credential("password", "pass");
        let provider = Dd24Provider::new(&record)
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap());
        let client = transport::build_client(transport::DEFAULT_TIMEOUT).unwrap();
        let target = UpdateTarget::provider_supplied("0.0.0.0".parse().unwrap());
        provider.update(&client, target).await.unwrap();
    }
}
