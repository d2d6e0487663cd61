//! Scaleway Domains and DNS
//!
//! ```http
//! PATCH https://api.scaleway.com/domain/v2beta1/dns-zones/:domain/records
//! X-Auth-Token: :secret_key
//!
//! {"changes": [{"set": {"id_fields": {"name": "home", "type": "A"},
//!                       "records": [{"data": "203.0.113.7", "ttl": 300}]}}]}
//! ```
//!
//! A `set` change replaces every record matching the id fields, creating
//! it when absent. The answer lists the records now in the zone.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{StatusCode, Url};
use serde_json::json;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::common;

pub const NAME: &str = "scaleway";

const BASE_URL: &str = "https://api.scaleway.com";
const DEFAULT_TTL: u32 = 300;

pub struct ScalewayProvider {
    secret_key: String,
    domain: String,
    /// Record name relative to the zone, empty for the apex
    name: String,
    ttl: u32,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for ScalewayProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalewayProvider")
            .field("secret_key", &"<REDACTED>")
            .field("domain", &self.domain)
            .field("name", &self.name)
            .finish()
    }
}

impl ScalewayProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            secret_key: common::required(record, NAME, "secret_key")?,
            domain: record.domain.clone(),
            name: common::owner_or_empty(record).to_string(),
            ttl: record.ttl.unwrap_or(DEFAULT_TTL),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Scaleway", "https://www.scaleway.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

#[async_trait]
impl DnsProvider for ScalewayProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let path = format!("/domain/v2beta1/dns-zones/{}/records", self.domain);
        let url = common::endpoint(&self.base, &path)?;
        let payload = json!({
            "changes": [{
                "set": {
                    "id_fields": {"name": self.name, "type": target.record_type()},
                    "records": [{"data": target.ip.to_string(), "ttl": self.ttl}],
                }
            }]
        });
        debug!(domain = %self.domain, name = %self.name, "setting Scaleway record");

        let response = client
            .patch(url)
            .header("X-Auth-Token", &self.secret_key)
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        match status {
            StatusCode::OK => Ok(target.ip),
            StatusCode::BAD_REQUEST => Err(Error::bad_request(single_line(&body))),
            StatusCode::NOT_FOUND => Err(Error::zone_not_found(format!("{}: {}", self.domain, single_line(&body)))),
            s => Err(Error::bad_status(s.as_u16(), single_line(&body))),
        }
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(ScalewayProvider::new(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddns_core::ErrorKind;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RECORDS: &str = "/domain/v2beta1/dns-zones/example.com/records";

    fn provider(server: &MockServer, owner: &str) -> ScalewayProvider {
        let record = RecordConfig::new(NAME, "example.com")
            .with_owner(owner)
            .with_credential("secret_key", "scw-secret");
        ScalewayProvider::new(&record)
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap())
    }

    fn client() -> reqwest::Client {
        transport::build_client(transport::DEFAULT_TIMEOUT).unwrap()
    }

    #[tokio::test]
    async fn set_change_carries_name_type_and_address() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(RECORDS))
            .and(header("X-Auth-Token", "scw-secret"))
            .and(body_json(json!({
                "changes": [{"set": {
                    "id_fields": {"name": "", "type": "AAAA"},
                    "records": [{"data": "2001:db8::7", "ttl": 300}]
                }}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": []})))
            .expect(1)
            .mount(&server)
            .await;

        let target = UpdateTarget::address("2001:db8::7".parse().unwrap());
        assert_eq!(provider(&server, "@").update(&client(), target).await.unwrap(), target.ip);
    }

    #[tokio::test]
    async fn rejected_key_is_an_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"message":"authentication is denied"}"#))
            .mount(&server)
            .await;

        let target = UpdateTarget::address("203.0.113.7".parse().unwrap());
        let err = provider(&server, "home").update(&client(), target).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }
}
