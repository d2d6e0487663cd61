//! Hetzner DNS
//!
//! ```http
//! GET  /api/v1/records?zone_id=:zone&name=:owner&type=A
//! POST /api/v1/records          (no record yet)
//! PUT  /api/v1/records/:id      (value differs)
//! ```
//!
//! Authenticated with the `Auth-API-Token` header. Writes echo the record,
//! whose `value` is checked against the address sent.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::net::IpAddr;
use tracing::info;

use crate::common;

pub const NAME: &str = "hetzner";

const BASE_URL: &str = "https://dns.hetzner.com";

#[derive(Deserialize)]
struct Listing {
    #[serde(default)]
    records: Vec<HetznerRecord>,
}

#[derive(Deserialize)]
struct Written {
    record: HetznerRecord,
}

#[derive(Deserialize)]
struct HetznerRecord {
    id: String,
    value: String,
}

pub struct HetznerProvider {
    token: String,
    zone_identifier: String,
    owner: String,
    ttl: Option<u32>,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for HetznerProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HetznerProvider")
            .field("token", &"<REDACTED>")
            .field("zone_identifier", &self.zone_identifier)
            .field("owner", &self.owner)
            .finish()
    }
}

impl HetznerProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            token: common::required(record, NAME, "token")?,
            zone_identifier: common::required(record, NAME, "zone_identifier")?,
            owner: record.owner.clone(),
            ttl: record.ttl,
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Hetzner", "https://www.hetzner.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Auth-API-Token", &self.token)
            .header("Accept", "application/json")
    }

    async fn lookup(&self, client: &reqwest::Client, record_type: &str) -> Result<Vec<HetznerRecord>> {
        let mut url = common::endpoint(&self.base, "/api/v1/records")?;
        url.query_pairs_mut()
            .append_pair("zone_id", &self.zone_identifier)
            .append_pair("name", &self.owner)
            .append_pair("type", record_type);

        let response = self.authorized(client.get(url)).send().await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        match status {
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            s if s.is_success() => Ok(transport::decode_json::<Listing>(&body)?.records),
            s => Err(classify(s, &body)),
        }
    }

    async fn write(&self, request: RequestBuilder, target: UpdateTarget) -> Result<IpAddr> {
        let mut payload = json!({
            "type": target.record_type(),
            "name": self.owner,
            "value": target.ip.to_string(),
            "zone_id": self.zone_identifier,
        });
        if let Some(ttl) = self.ttl {
            payload["ttl"] = json!(ttl);
        }

        let response = self.authorized(request).json(&payload).send().await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        if !status.is_success() {
            return Err(classify(status, &body));
        }
        let written: Written = transport::decode_json(&body)?;
        let echoed = transport::parse_ip(&written.record.value)?;
        common::confirm(target, Some(echoed))
    }
}

fn classify(status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::auth(single_line(body)),
        StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST => Error::bad_request(single_line(body)),
        _ => Error::bad_status(status.as_u16(), single_line(body)),
    }
}

#[async_trait]
impl DnsProvider for HetznerProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let records = self.lookup(client, target.record_type()).await?;
        match records.as_slice() {
            [] => {
                let url = common::endpoint(&self.base, "/api/v1/records")?;
                let confirmed = self.write(client.post(url), target).await?;
                info!(zone = %self.zone_identifier, owner = %self.owner, "created Hetzner record");
                Ok(confirmed)
            }
            [existing] if existing.value == target.ip.to_string() => Ok(target.ip),
            [existing] => {
                let url = common::endpoint(&self.base, &format!("/api/v1/records/{}", existing.id))?;
                self.write(client.put(url), target).await
            }
            many => Err(Error::result_count(format!(
                "{} {} records named {} instead of 1",
                many.len(),
                target.record_type(),
                self.owner
            ))),
        }
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(HetznerProvider::new(record)?))
}
