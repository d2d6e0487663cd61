//! DigitalOcean
//!
//! ```http
//! GET  /v2/domains/:domain/records?name=:fqdn&type=A
//! POST /v2/domains/:domain/records         (no record yet)
//! PUT  /v2/domains/:domain/records/:id     (data differs)
//! ```
//!
//! Authenticated with a bearer token. Writes echo `domain_record.data`.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt;
use std::net::IpAddr;
use tracing::info;

use crate::common;

pub const NAME: &str = "digitalocean";

const BASE_URL: &str = "https://api.digitalocean.com";

#[derive(Deserialize)]
struct Listing {
    #[serde(default)]
    domain_records: Vec<DoRecord>,
}

#[derive(Deserialize)]
struct Written {
    domain_record: DoRecord,
}

#[derive(Deserialize)]
struct DoRecord {
    id: u64,
    data: String,
}

pub struct DigitalOceanProvider {
    token: String,
    domain: String,
    owner: String,
    fqdn: String,
    ttl: Option<u32>,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for DigitalOceanProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigitalOceanProvider")
            .field("token", &"<REDACTED>")
            .field("fqdn", &self.fqdn)
            .finish()
    }
}

impl DigitalOceanProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            token: common::required(record, NAME, "token")?,
            domain: record.domain.clone(),
            owner: record.owner.clone(),
            fqdn: record.fqdn(),
            ttl: record.ttl,
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "DigitalOcean", "https://www.digitalocean.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn records_path(&self) -> String {
        format!("/v2/domains/{}/records", self.domain)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response: Response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        match status {
            s if s.is_success() => transport::decode_json(&body),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::auth(single_line(&body))),
            StatusCode::NOT_FOUND => Err(Error::zone_not_found(single_line(&body))),
            StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST => Err(Error::bad_request(single_line(&body))),
            s => Err(Error::bad_status(s.as_u16(), single_line(&body))),
        }
    }
}

#[async_trait]
impl DnsProvider for DigitalOceanProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let mut url = common::endpoint(&self.base, &self.records_path())?;
        url.query_pairs_mut()
            .append_pair("name", &self.fqdn)
            .append_pair("type", target.record_type());
        let listing: Listing = self.send(client.get(url)).await?;

        let value = target.ip.to_string();
        let written: Written = match listing.domain_records.as_slice() {
            [] => {
                let url = common::endpoint(&self.base, &self.records_path())?;
                let mut payload = json!({
                    "type": target.record_type(),
                    "name": self.owner,
                    "data": value,
                });
                if let Some(ttl) = self.ttl {
                    payload["ttl"] = json!(ttl);
                }
                let written = self.send(client.post(url).json(&payload)).await?;
                info!(fqdn = %self.fqdn, "created DigitalOcean record");
                written
            }
            [existing] if existing.data == value => return Ok(target.ip),
            [existing] => {
                let path = format!("{}/{}", self.records_path(), existing.id);
                let url = common::endpoint(&self.base, &path)?;
                let payload = json!({
                    "type": target.record_type(),
                    "name": self.owner,
                    "data": value,
                });
                self.send(client.put(url).json(&payload)).await?
            }
            many => {
                return Err(Error::result_count(format!(
                    "{} {} records for {} instead of 1",
                    many.len(),
                    target.record_type(),
                    self.fqdn
                )));
            }
        };

        let echoed = transport::parse_ip(&written.domain_record.data)?;
        common::confirm(target, Some(echoed))
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(DigitalOceanProvider::new(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddns_core::ErrorKind;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> DigitalOceanProvider {
        let record = RecordConfig::new(NAME, "example.com")
            .with_owner("home")
            .with_credential("token", "do-token");
        DigitalOceanProvider::new(&record)
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap())
    }

    fn client() -> reqwest::Client {
        transport::build_client(transport::DEFAULT_TIMEOUT).unwrap()
    }

    fn target() -> UpdateTarget {
        UpdateTarget::address("203.0.113.7".parse().unwrap())
    }

    #[tokio::test]
    async fn stale_record_is_replaced_and_confirmed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/domains/example.com/records"))
            .and(query_param("name", "home.example.com"))
            .and(query_param("type", "A"))
            .and(header("Authorization", "Bearer do-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "domain_records": [{"id": 7, "data": "198.51.100.1"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v2/domains/example.com/records/7"))
            .and(body_partial_json(json!({"data": "203.0.113.7", "name": "home"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "domain_record": {"id": 7, "data": "203.0.113.7"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(provider(&server).update(&client(), target()).await.unwrap(), target().ip);
    }

    #[tokio::test]
    async fn missing_record_is_created() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/domains/example.com/records"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"domain_records": []})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/domains/example.com/records"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "domain_record": {"id": 8, "data": "203.0.113.7"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        provider(&server).update(&client(), target()).await.unwrap();
    }

    #[tokio::test]
    async fn echo_mismatch_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "domain_records": [{"id": 7, "data": "198.51.100.1"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "domain_record": {"id": 7, "data": "198.51.100.1"}
            })))
            .mount(&server)
            .await;

        let err = provider(&server).update(&client(), target()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IpMismatch);
    }
}
