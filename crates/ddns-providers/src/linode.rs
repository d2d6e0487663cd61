//! Linode
//!
//! The domain is resolved to its numeric id first:
//!
//! ```http
//! GET  /v4/domains                          X-Filter: {"domain": "example.com"}
//! GET  /v4/domains/:id/records
//! POST /v4/domains/:id/records              (no record yet)
//! PUT  /v4/domains/:id/records/:record      (target differs)
//! ```
//!
//! Error bodies are `{"errors": [{"field", "reason"}]}`.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt;
use std::net::IpAddr;
use tracing::info;

use crate::common;

pub const NAME: &str = "linode";

const BASE_URL: &str = "https://api.linode.com";

#[derive(Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Deserialize)]
struct Domain {
    id: u64,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct LinodeRecord {
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    target: String,
}

#[derive(Deserialize)]
struct Failures {
    #[serde(default)]
    errors: Vec<Failure>,
}

#[derive(Deserialize)]
struct Failure {
    #[serde(default)]
    field: String,
    #[serde(default)]
    reason: String,
}

pub struct LinodeProvider {
    token: String,
    domain: String,
    name: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for LinodeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinodeProvider")
            .field("token", &"<REDACTED>")
            .field("domain", &self.domain)
            .field("name", &self.name)
            .finish()
    }
}

impl LinodeProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            token: common::required(record, NAME, "token")?,
            domain: record.domain.clone(),
            name: common::owner_or_empty(record).to_string(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Linode", "https://cloud.linode.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        if status.is_success() {
            return transport::decode_json(&body);
        }

        let message = match serde_json::from_str::<Failures>(&body) {
            Ok(failures) if !failures.errors.is_empty() => failures
                .errors
                .iter()
                .map(|f| if f.field.is_empty() { f.reason.clone() } else { format!("{}: {}", f.field, f.reason) })
                .collect::<Vec<_>>()
                .join("; "),
            _ => single_line(&body),
        };
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::auth(message),
            StatusCode::BAD_REQUEST => Error::bad_request(message),
            _ => Error::bad_status(status.as_u16(), message),
        })
    }

    async fn domain_id(&self, client: &reqwest::Client) -> Result<u64> {
        let url = common::endpoint(&self.base, "/v4/domains")?;
        let filter = json!({ "domain": self.domain }).to_string();
        let page: Page<Domain> = self.send(client.get(url).header("X-Filter", filter)).await?;
        match page.data.as_slice() {
            [] => Err(Error::zone_not_found(format!("domain {} is not in the account", self.domain))),
            [domain] if domain.status == "disabled" => Err(Error::zone_not_found(format!(
                "domain {} is disabled",
                self.domain
            ))),
            [domain] => Ok(domain.id),
            many => Err(Error::result_count(format!(
                "{} domains named {} instead of 1",
                many.len(),
                self.domain
            ))),
        }
    }
}

#[async_trait]
impl DnsProvider for LinodeProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let domain_id = self.domain_id(client).await?;
        let records_path = format!("/v4/domains/{domain_id}/records");
        let url = common::endpoint(&self.base, &records_path)?;
        let page: Page<LinodeRecord> = self.send(client.get(url.clone())).await?;

        let value = target.ip.to_string();
        let existing = page
            .data
            .into_iter()
            .find(|record| record.name == self.name && record.kind == target.record_type());

        let written: LinodeRecord = match existing {
            None => {
                let payload = json!({
                    "type": target.record_type(),
                    "name": self.name,
                    "target": value,
                });
                let written = self.send(client.post(url).json(&payload)).await?;
                info!(domain = %self.domain, name = %self.name, "created Linode record");
                written
            }
            Some(record) if record.target == value => return Ok(target.ip),
            Some(record) => {
                let url = common::endpoint(&self.base, &format!("{records_path}/{}", record.id))?;
                self.send(client.put(url).json(&json!({ "target": value }))).await?
            }
        };

        let echoed = transport::parse_ip(&written.target)?;
        common::confirm(target, Some(echoed))
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(LinodeProvider::new(record)?))
}
