//! Name.com API v4
//!
//! ```http
//! GET  https://api.name.com/v4/domains/:domain/records
//! POST https://api.name.com/v4/domains/:domain/records        (no record yet)
//! PUT  https://api.name.com/v4/domains/:domain/records/:id    (record found)
//! Authorization: Basic :username::token
//! ```
//!
//! Writes echo the record; its `answer` is checked against the address
//! sent. Errors carry a `message` such as `Not Found` or `Permission Denied`
//! and optional `details`.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::net::IpAddr;
use tracing::{debug, info};

use crate::common;

pub const NAME: &str = "name.com";

const BASE_URL: &str = "https://api.name.com";
const MIN_TTL: u32 = 300;

#[derive(Deserialize)]
struct Listing {
    #[serde(default)]
    records: Vec<NameComRecord>,
}

#[derive(Deserialize)]
struct NameComRecord {
    id: u64,
    #[serde(default)]
    host: String,
    #[serde(default, rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct Written {
    #[serde(default)]
    answer: String,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: String,
}

pub struct NameComProvider {
    username: String,
    token: String,
    domain: String,
    /// Host label, empty for the apex
    host: String,
    ttl: Option<u32>,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for NameComProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameComProvider")
            .field("username", &self.username)
            .field("token", &"<REDACTED>")
            .field("domain", &self.domain)
            .field("host", &self.host)
            .finish()
    }
}

impl NameComProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        let username = common::required(record, NAME, "username")?;
        let token = common::required(record, NAME, "token")?;
        common::ttl_at_least(record, NAME, MIN_TTL)?;

        Ok(Self {
            username,
            token,
            domain: record.domain.clone(),
            host: common::owner_or_empty(record).to_string(),
            ttl: record.ttl,
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Name.com", "https://www.name.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.username, Some(&self.token))
    }

    fn records_path(&self) -> String {
        format!("/v4/domains/{}/records", self.domain)
    }

    async fn record_id(&self, client: &reqwest::Client, record_type: &str) -> Result<Option<u64>> {
        let url = common::endpoint(&self.base, &self.records_path())?;
        let response = self.authorized(client.get(url)).send().await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        match status {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(Error::zone_not_found(self.domain.clone())),
            s => return Err(Error::bad_status(s.as_u16(), single_line(&body))),
        }

        let listing: Listing = transport::decode_json(&body)?;
        Ok(listing
            .records
            .iter()
            .find(|r| r.host == self.host && r.kind == record_type)
            .map(|r| r.id))
    }

    async fn write(&self, request: RequestBuilder, target: UpdateTarget) -> Result<IpAddr> {
        let mut payload = json!({
            "host": self.host,
            "type": target.record_type(),
            "answer": target.ip.to_string(),
        });
        if let Some(ttl) = self.ttl {
            payload["ttl"] = json!(ttl);
        }

        let response = self.authorized(request).json(&payload).send().await?;
        let body = read(response).await?;
        let written: Written = transport::decode_json(&body)?;
        common::confirm(target, Some(transport::parse_ip(&written.answer)?))
    }
}

async fn read(response: Response) -> Result<String> {
    let status = response.status();
    let body = transport::read_body(response).await?;
    if status == StatusCode::OK || status == StatusCode::CREATED {
        return Ok(body);
    }

    let Ok(error) = serde_json::from_str::<ApiError>(&body) else {
        return Err(Error::bad_status(status.as_u16(), single_line(&body)));
    };
    let message = if error.details.is_empty() {
        error.message.clone()
    } else {
        format!("{}: {}", error.message, error.details)
    };
    Err(match error.message.to_ascii_lowercase().as_str() {
        "not found" => Error::record_not_found(message),
        "permission denied" | "unauthenticated" => Error::auth(message),
        "invalid argument" => Error::bad_request(message),
        _ => Error::bad_status(status.as_u16(), message),
    })
}

#[async_trait]
impl DnsProvider for NameComProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        match self.record_id(client, target.record_type()).await? {
            Some(id) => {
                debug!(domain = %self.domain, host = %self.host, id, "updating Name.com record");
                let url = common::endpoint(&self.base, &format!("{}/{id}", self.records_path()))?;
                self.write(client.put(url), target).await
            }
            None => {
                let url = common::endpoint(&self.base, &self.records_path())?;
                let confirmed = self.write(client.post(url), target).await?;
                info!(domain = %self.domain, host = %self.host, "created Name.com record");
                Ok(confirmed)
            }
        }
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(NameComProvider::new(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddns_core::ErrorKind;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RECORDS: &str = "/v4/domains/example.com/records";

    fn record() -> RecordConfig {
        RecordConfig::new(NAME, "example.com")
            .with_credential("username", "user")
            .with_credential("token", "tok")
    }

    fn provider(server: &MockServer) -> NameComProvider {
        NameComProvider::new(&record())
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap())
    }

    fn client() -> reqwest::Client {
        transport::build_client(transport::DEFAULT_TIMEOUT).unwrap()
    }

    fn target() -> UpdateTarget {
        UpdateTarget::address("203.0.113.7".parse().unwrap())
    }

    #[test]
    fn ttl_below_300_is_rejected() {
        assert!(NameComProvider::new(&record().with_ttl(60)).is_err());
        assert!(NameComProvider::new(&record().with_ttl(300)).is_ok());
    }

    #[tokio::test]
    async fn apex_record_is_updated_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(RECORDS))
            .and(header("authorization", "Basic dXNlcjp0b2s="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [
                    {"id": 11, "host": "www", "type": "A"},
                    {"id": 12, "host": "", "type": "A"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(format!("{RECORDS}/12")))
            .and(body_json(json!({"host": "", "type": "A", "answer": "203.0.113.7"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 12, "host": "", "type": "A", "answer": "203.0.113.7"
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
            .and(path(RECORDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": []})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(RECORDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 13, "answer": "203.0.113.7"})))
            .expect(1)
            .mount(&server)
            .await;

        provider(&server).update(&client(), target()).await.unwrap();
    }

    #[tokio::test]
    async fn permission_denied_is_an_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(RECORDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [{"id": 12, "host": "", "type": "A"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "message": "Permission Denied", "details": "Authentication Error"
            })))
            .mount(&server)
            .await;

        let err = provider(&server).update(&client(), target()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }
}
