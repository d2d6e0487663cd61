//! Netlify DNS
//!
//! ```http
//! GET    https://api.netlify.com/api/v1/dns_zones
//! GET    https://api.netlify.com/api/v1/dns_zones/:zone/dns_records
//! DELETE https://api.netlify.com/api/v1/dns_zones/:zone/dns_records/:id   (value differs)
//! POST   https://api.netlify.com/api/v1/dns_zones/:zone/dns_records
//! Authorization: Bearer :token
//! ```
//!
//! Netlify records cannot be edited in place: a stale record is deleted and
//! created again with the new value. The zone is the longest one the domain
//! belongs to.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport;
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::net::IpAddr;
use tracing::{debug, info};

use crate::common;

pub const NAME: &str = "netlify";

const BASE_URL: &str = "https://api.netlify.com";
const DEFAULT_TTL: u32 = 3600;

#[derive(Deserialize)]
struct Zone {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct NetlifyRecord {
    id: String,
    #[serde(default)]
    hostname: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    value: String,
}

pub struct NetlifyProvider {
    token: String,
    domain: String,
    fqdn: String,
    ttl: u32,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for NetlifyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetlifyProvider")
            .field("token", &"<REDACTED>")
            .field("fqdn", &self.fqdn)
            .finish()
    }
}

impl NetlifyProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            token: common::required(record, NAME, "token")?,
            domain: record.domain.clone(),
            fqdn: record.fqdn(),
            ttl: record.ttl.unwrap_or(DEFAULT_TTL),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Netlify", "https://www.netlify.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    async fn get(&self, client: &reqwest::Client, path: &str) -> Result<String> {
        let response = client
            .get(common::endpoint(&self.base, path)?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        transport::expect_status(response, StatusCode::OK).await
    }

    async fn zone_id(&self, client: &reqwest::Client) -> Result<String> {
        let zones: Vec<Zone> = transport::decode_json(&self.get(client, "/api/v1/dns_zones").await?)?;
        zones
            .into_iter()
            .filter(|zone| self.domain == zone.name || self.domain.ends_with(&format!(".{}", zone.name)))
            .max_by_key(|zone| zone.name.len())
            .map(|zone| zone.id)
            .ok_or_else(|| Error::zone_not_found(self.domain.clone()))
    }

    async fn create_record(&self, client: &reqwest::Client, zone_id: &str, target: UpdateTarget) -> Result<()> {
        let payload = json!({
            "type": target.record_type(),
            "hostname": self.fqdn,
            "value": target.ip.to_string(),
            "ttl": self.ttl,
        });
        let response = client
            .post(common::endpoint(&self.base, &format!("/api/v1/dns_zones/{zone_id}/dns_records"))?)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;
        transport::expect_status(response, StatusCode::CREATED).await?;
        Ok(())
    }
}

#[async_trait]
impl DnsProvider for NetlifyProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let zone_id = self.zone_id(client).await?;
        let body = self.get(client, &format!("/api/v1/dns_zones/{zone_id}/dns_records")).await?;
        let records: Vec<NetlifyRecord> = transport::decode_json(&body)?;
        let existing = records
            .into_iter()
            .find(|r| r.kind == target.record_type() && r.hostname == self.fqdn);

        match existing {
            Some(record) if transport::parse_ip(&record.value).ok() == Some(target.ip) => {
                debug!(fqdn = %self.fqdn, "Netlify record already up to date");
            }
            Some(record) => {
                let url = common::endpoint(&self.base, &format!("/api/v1/dns_zones/{zone_id}/dns_records/{}", record.id))?;
                let response = client.delete(url).bearer_auth(&self.token).send().await?;
                transport::expect_status(response, StatusCode::NO_CONTENT).await?;
                debug!(fqdn = %self.fqdn, id = %record.id, "deleted stale Netlify record");
                self.create_record(client, &zone_id, target).await?;
            }
            None => {
                self.create_record(client, &zone_id, target).await?;
                info!(fqdn = %self.fqdn, "created Netlify record");
            }
        }
        Ok(target.ip)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(NetlifyProvider::new(record)?))
}
