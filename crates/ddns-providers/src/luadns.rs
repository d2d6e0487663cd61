//! LuaDNS
//!
//! REST API with basic auth (account email and API token):
//!
//! ```http
//! GET  /v1/zones
//! GET  /v1/zones/:zone/records
//! POST /v1/zones/:zone/records              (no record yet)
//! PUT  /v1/zones/:zone/records/:record      (content differs)
//! ```
//!
//! Record names are absolute, with a trailing dot.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use tracing::info;

use crate::common;

pub const NAME: &str = "luadns";

const BASE_URL: &str = "https://api.luadns.com";
const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9\-_.+]+@[a-zA-Z0-9\-_.]+\.[a-zA-Z]{2,10}$";
const DEFAULT_TTL: u32 = 300;

#[derive(Deserialize)]
struct Zone {
    id: u64,
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LuaRecord {
    #[serde(default, skip_serializing)]
    id: u64,
    name: String,
    #[serde(rename = "type")]
    kind: String,
    content: String,
    ttl: u32,
}

#[derive(Deserialize)]
struct Failure {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

pub struct LuaDnsProvider {
    email: String,
    token: String,
    domain: String,
    /// Absolute record name, `www.example.com.`
    name: String,
    ttl: u32,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for LuaDnsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LuaDnsProvider")
            .field("email", &self.email)
            .field("token", &"<REDACTED>")
            .field("name", &self.name)
            .finish()
    }
}

impl LuaDnsProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        let email = common::required(record, NAME, "email")?;
        common::check_format(NAME, "email", &email, EMAIL_PATTERN)?;
        Ok(Self {
            email,
            token: common::required(record, NAME, "token")?,
            domain: record.domain.clone(),
            name: format!("{}.", record.fqdn()),
            ttl: record.ttl.unwrap_or(DEFAULT_TTL),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "LuaDNS", "https://www.luadns.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .basic_auth(&self.email, Some(&self.token))
            .header("Accept", "application/json")
            .send()
            .await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        if status.is_success() {
            return transport::decode_json(&body);
        }

        let message = match serde_json::from_str::<Failure>(&body) {
            Ok(failure) if !failure.message.is_empty() => format!("{}: {}", failure.status, failure.message),
            _ => single_line(&body),
        };
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::auth(message),
            StatusCode::BAD_REQUEST => Error::bad_request(message),
            _ => Error::bad_status(status.as_u16(), message),
        })
    }

    async fn zone_id(&self, client: &reqwest::Client) -> Result<u64> {
        let url = common::endpoint(&self.base, "/v1/zones")?;
        let zones: Vec<Zone> = self.send(client.get(url)).await?;
        zones
            .into_iter()
            .find(|zone| zone.name == self.domain)
            .map(|zone| zone.id)
            .ok_or_else(|| Error::zone_not_found(format!("no zone named {}", self.domain)))
    }
}

#[async_trait]
impl DnsProvider for LuaDnsProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let zone_id = self.zone_id(client).await?;
        let records_path = format!("/v1/zones/{zone_id}/records");
        let url = common::endpoint(&self.base, &records_path)?;
        let records: Vec<LuaRecord> = self.send(client.get(url.clone())).await?;

        let value = target.ip.to_string();
        let existing = records
            .into_iter()
            .find(|record| record.name == self.name && record.kind == target.record_type());

        let written: LuaRecord = match existing {
            None => {
                let record = LuaRecord {
                    id: 0,
                    name: self.name.clone(),
                    kind: target.record_type().to_string(),
                    content: value,
                    ttl: self.ttl,
                };
                let written = self.send(client.post(url).json(&record)).await?;
                info!(name = %self.name, "created LuaDNS record");
                written
            }
            Some(record) if record.content == value => return Ok(target.ip),
            Some(mut record) => {
                let url = common::endpoint(&self.base, &format!("{records_path}/{}", record.id))?;
                record.content = value;
                self.send(client.put(url).json(&record)).await?
            }
        };

        let echoed = transport::parse_ip(&written.content)?;
        common::confirm(target, Some(echoed))
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(LuaDnsProvider::new(record)?))
}
