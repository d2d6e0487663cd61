//! IONOS hosting DNS
//!
//! ```http
//! GET  https://api.hosting.ionos.com/dns/v1/zones
//! GET  https://api.hosting.ionos.com/dns/v1/zones/:zone?recordName=:fqdn&recordType=A
//! POST https://api.hosting.ionos.com/dns/v1/zones/:zone/records          (no record yet)
//! PUT  https://api.hosting.ionos.com/dns/v1/zones/:zone/records/:id      (content differs)
//! X-API-Key: :api_key
//! ```
//!
//! Every record of the name is brought to the new address; their TTL and
//! priority are kept. Errors come back as a list of `{code, message}`.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport;
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::net::IpAddr;
use tracing::{debug, info};

use crate::common;

pub const NAME: &str = "ionos";

const BASE_URL: &str = "https://api.hosting.ionos.com";
const DEFAULT_TTL: u32 = 3600;

#[derive(Deserialize)]
struct Zone {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct ZoneRecords {
    #[serde(default)]
    records: Vec<IonosRecord>,
}

#[derive(Deserialize, Serialize)]
struct IonosRecord {
    #[serde(default, skip_serializing)]
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: String,
    content: String,
    #[serde(default)]
    ttl: u32,
    #[serde(default)]
    prio: u32,
    #[serde(default)]
    disabled: bool,
}

#[derive(Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

pub struct IonosProvider {
    api_key: String,
    domain: String,
    fqdn: String,
    ttl: u32,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for IonosProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IonosProvider")
            .field("api_key", &"<REDACTED>")
            .field("fqdn", &self.fqdn)
            .finish()
    }
}

impl IonosProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            api_key: common::required(record, NAME, "api_key")?,
            domain: record.domain.clone(),
            fqdn: record.fqdn(),
            ttl: record.ttl.unwrap_or(DEFAULT_TTL),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "IONOS", "https://www.ionos.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("X-API-Key", &self.api_key)
            .header("Accept", "application/json")
    }

    async fn zone_id(&self, client: &reqwest::Client) -> Result<String> {
        let url = common::endpoint(&self.base, "/dns/v1/zones")?;
        let body = read(self.authorized(client.get(url)).send().await?, StatusCode::OK).await?;
        let zones: Vec<Zone> = transport::decode_json(&body)?;
        let count = zones.len();
        zones
            .into_iter()
            .find(|zone| zone.name == self.domain)
            .map(|zone| zone.id)
            .ok_or_else(|| Error::zone_not_found(format!("{} in {count} zones", self.domain)))
    }

    async fn records(&self, client: &reqwest::Client, zone_id: &str, record_type: &str) -> Result<Vec<IonosRecord>> {
        let mut url = common::endpoint(&self.base, &format!("/dns/v1/zones/{zone_id}"))?;
        url.query_pairs_mut()
            .append_pair("recordName", &self.fqdn)
            .append_pair("recordType", record_type);
        let body = read(self.authorized(client.get(url)).send().await?, StatusCode::OK).await?;
        let listing: ZoneRecords = transport::decode_json(&body)?;
        Ok(listing.records.into_iter().filter(|r| r.name == self.fqdn).collect())
    }
}

/// Read a response expected to carry `expected`, classifying IONOS error lists
async fn read(response: Response, expected: StatusCode) -> Result<String> {
    let status = response.status();
    let body = transport::read_body(response).await?;
    if status == expected {
        return Ok(body);
    }

    let message = match serde_json::from_str::<Vec<ApiMessage>>(&body) {
        Ok(messages) if !messages.is_empty() => messages
            .iter()
            .map(|m| if m.message.is_empty() { format!("code {:?}", m.code) } else { m.message.clone() })
            .collect::<Vec<_>>()
            .join("; "),
        _ => transport::single_line(&body),
    };
    Err(match status {
        StatusCode::BAD_REQUEST => Error::bad_request(message),
        StatusCode::UNAUTHORIZED => Error::auth(message),
        StatusCode::NOT_FOUND => Error::record_not_found(message),
        s => Error::bad_status(s.as_u16(), message),
    })
}

#[async_trait]
impl DnsProvider for IonosProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let record_type = target.record_type();
        let zone_id = self.zone_id(client).await?;
        let records = self.records(client, &zone_id, record_type).await?;
        let content = target.ip.to_string();

        if records.is_empty() {
            let url = common::endpoint(&self.base, &format!("/dns/v1/zones/{zone_id}/records"))?;
            let created = [IonosRecord {
                id: String::new(),
                name: self.fqdn.clone(),
                kind: record_type.to_string(),
                content,
                ttl: self.ttl,
                prio: 0,
                disabled: false,
            }];
            read(self.authorized(client.post(url)).json(&created).send().await?, StatusCode::CREATED).await?;
            info!(fqdn = %self.fqdn, record_type, "created IONOS record");
            return Ok(target.ip);
        }

        for record in records.iter().filter(|r| r.content != content) {
            let url = common::endpoint(&self.base, &format!("/dns/v1/zones/{zone_id}/records/{}", record.id))?;
            let payload = json!({
                "content": content,
                "ttl": record.ttl,
                "prio": record.prio,
                "disabled": record.disabled,
            });
            debug!(fqdn = %self.fqdn, id = %record.id, "updating IONOS record");
            read(self.authorized(client.put(url)).json(&payload).send().await?, StatusCode::OK).await?;
        }
        Ok(target.ip)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(IonosProvider::new(record)?))
}
