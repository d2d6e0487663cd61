//! ArvanCloud CDN DNS
//!
//! ```http
//! GET https://napi.arvancloud.ir/cdn/4.0/domains/:domain/dns-records
//! PUT https://napi.arvancloud.ir/cdn/4.0/domains/:domain/dns-records/:id
//! Authorization: apikey :key
//! ```
//!
//! The record must already exist; it is found by name and type in the
//! listing and replaced in full.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::common;

pub const NAME: &str = "arvancloud";

const BASE_URL: &str = "https://napi.arvancloud.ir";

#[derive(Deserialize)]
struct Listing {
    #[serde(default)]
    data: Vec<ArvanRecord>,
}

#[derive(Deserialize)]
struct ArvanRecord {
    id: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    name: String,
}

pub struct ArvanCloudProvider {
    token: String,
    domain: String,
    owner: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for ArvanCloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArvanCloudProvider")
            .field("token", &"<REDACTED>")
            .field("domain", &self.domain)
            .field("owner", &self.owner)
            .finish()
    }
}

impl ArvanCloudProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        common::reject_wildcard(record, NAME)?;
        let token = common::required(record, NAME, "token")?;
        if !token.starts_with("apikey ") {
            return Err(Error::config(format!("{NAME}: token must look like `apikey <key>`")));
        }

        Ok(Self {
            token,
            domain: record.domain.clone(),
            owner: record.owner.clone(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "ArvanCloud", "https://arvancloud.ir/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", &self.token)
            .header("Accept", "application/json")
    }

    fn records_path(&self) -> String {
        format!("/cdn/4.0/domains/{}/dns-records", self.domain)
    }

    async fn record_id(&self, client: &reqwest::Client, record_type: &str) -> Result<String> {
        let url = common::endpoint(&self.base, &self.records_path())?;
        let body = transport::expect_status(self.authorized(client.get(url)).send().await?, StatusCode::OK).await?;
        let listing: Listing = transport::decode_json(&body)?;

        listing
            .data
            .into_iter()
            .find(|r| r.name == self.owner && (r.kind.is_empty() || r.kind.eq_ignore_ascii_case(record_type)))
            .map(|r| r.id)
            .ok_or_else(|| Error::record_not_found(format!("{} {} in {}", record_type, self.owner, self.domain)))
    }
}

#[async_trait]
impl DnsProvider for ArvanCloudProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let record_type = target.record_type();
        let id = self.record_id(client, record_type).await?;
        let url = common::endpoint(&self.base, &format!("{}/{id}", self.records_path()))?;
        let payload = json!({
            "name": self.owner,
            "type": record_type.to_ascii_lowercase(),
            "value": [{"ip": target.ip.to_string()}],
        });
        debug!(domain = %self.domain, owner = %self.owner, %id, "replacing ArvanCloud record");

        let response = self.authorized(client.put(url)).json(&payload).send().await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        if status != StatusCode::OK {
            return Err(Error::bad_status(status.as_u16(), single_line(&body)));
        }
        Ok(target.ip)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(ArvanCloudProvider::new(record)?))
}
