//! Spaceship DNS
//!
//! ```http
//! GET    https://spaceship.dev/api/v1/dns/records/:domain?take=100&skip=0
//! DELETE https://spaceship.dev/api/v1/dns/records/:domain    [{type, name, address}]
//! PUT    https://spaceship.dev/api/v1/dns/records/:domain    {force: true, items: [...]}
//! X-Api-Key: :api_key
//! X-Api-Secret: :api_secret
//! ```
//!
//! Writes answer `204`. Errors carry a `detail` and per-field `data`, plus a
//! `Spaceship-Error-Code` header.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::net::IpAddr;
use tracing::{debug, info};

use crate::common;

pub const NAME: &str = "spaceship";

const BASE_URL: &str = "https://spaceship.dev";
const DEFAULT_TTL: u32 = 3600;

#[derive(Deserialize)]
struct Listing {
    #[serde(default)]
    items: Vec<SpaceshipRecord>,
}

#[derive(Deserialize, Serialize)]
struct SpaceshipRecord {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    #[serde(default)]
    address: String,
}

#[derive(Deserialize, Default)]
struct ApiError {
    #[serde(default)]
    detail: String,
    #[serde(default)]
    data: Vec<FieldError>,
}

#[derive(Deserialize)]
struct FieldError {
    #[serde(default)]
    field: String,
    #[serde(default)]
    details: String,
}

pub struct SpaceshipProvider {
    api_key: String,
    api_secret: String,
    domain: String,
    owner: String,
    ttl: u32,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for SpaceshipProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpaceshipProvider")
            .field("api_key", &"<REDACTED>")
            .field("api_secret", &"<REDACTED>")
            .field("domain", &self.domain)
            .field("owner", &self.owner)
            .finish()
    }
}

impl SpaceshipProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            api_key: common::required(record, NAME, "api_key")?,
            api_secret: common::required(record, NAME, "api_secret")?,
            domain: record.domain.clone(),
            owner: record.owner.clone(),
            ttl: record.ttl.unwrap_or(DEFAULT_TTL),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Spaceship", "https://www.spaceship.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("X-Api-Key", &self.api_key)
            .header("X-Api-Secret", &self.api_secret)
            .header("Accept", "application/json")
    }

    fn records_url(&self) -> Result<Url> {
        common::endpoint(&self.base, &format!("/api/v1/dns/records/{}", self.domain))
    }

    /// Read a response expected to carry `expected`, classifying Spaceship errors
    async fn read(&self, response: Response, expected: StatusCode) -> Result<String> {
        let status = response.status();
        let code = response
            .headers()
            .get("Spaceship-Error-Code")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = transport::read_body(response).await?;
        if status == expected {
            return Ok(body);
        }

        let error: ApiError = serde_json::from_str(&body).unwrap_or_default();
        let mut detail = if error.detail.is_empty() { single_line(&body) } else { error.detail.clone() };
        if let Some(code) = code {
            detail = format!("(code: {code}) {detail}");
        }
        Err(match status {
            StatusCode::UNAUTHORIZED => Error::auth("invalid API credentials"),
            StatusCode::FORBIDDEN => Error::auth("missing required permission dnsRecords:write"),
            StatusCode::NOT_FOUND if error.detail == format!("SOA record for domain {} not found.", self.domain) => {
                Error::zone_not_found(format!("{} must be configured in Spaceship first", self.domain))
            }
            StatusCode::NOT_FOUND => Error::record_not_found(detail),
            StatusCode::BAD_REQUEST => {
                let fields: Vec<String> = error
                    .data
                    .iter()
                    .map(|d| if d.field.is_empty() { d.details.clone() } else { format!("{}: {}", d.field, d.details) })
                    .collect();
                if fields.is_empty() {
                    Error::bad_request(detail)
                } else {
                    Error::bad_request(format!("{detail}; {}", fields.join("; ")))
                }
            }
            StatusCode::TOO_MANY_REQUESTS => Error::RateLimited("300 requests per 300 seconds".to_string()),
            s => Error::bad_status(s.as_u16(), detail),
        })
    }

    async fn create_record(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<()> {
        let payload = json!({
            "force": true,
            "items": [{
                "type": target.record_type(),
                "name": self.owner,
                "address": target.ip.to_string(),
                "ttl": self.ttl,
            }],
        });
        let response = self.authorized(client.put(self.records_url()?)).json(&payload).send().await?;
        self.read(response, StatusCode::NO_CONTENT).await?;
        Ok(())
    }
}

#[async_trait]
impl DnsProvider for SpaceshipProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let mut url = self.records_url()?;
        url.query_pairs_mut().append_pair("take", "100").append_pair("skip", "0");
        let body = self.read(self.authorized(client.get(url)).send().await?, StatusCode::OK).await?;
        let listing: Listing = transport::decode_json(&body)?;
        let existing = listing
            .items
            .into_iter()
            .find(|r| r.kind == target.record_type() && r.name == self.owner);

        match existing {
            None => {
                self.create_record(client, target).await?;
                info!(domain = %self.domain, owner = %self.owner, "created Spaceship record");
            }
            Some(record) if transport::parse_ip(&record.address).ok() == Some(target.ip) => {
                debug!(domain = %self.domain, owner = %self.owner, "Spaceship record already up to date");
            }
            Some(record) => {
                let response = self
                    .authorized(client.delete(self.records_url()?))
                    .json(&[&record])
                    .send()
                    .await?;
                self.read(response, StatusCode::NO_CONTENT).await?;
                self.create_record(client, target).await?;
            }
        }
        Ok(target.ip)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(SpaceshipProvider::new(record)?))
}
