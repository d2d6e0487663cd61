//! Vercel DNS
//!
//! ```http
//! GET    https://api.vercel.com/v4/domains/:domain/records[?teamId=:team]
//! DELETE https://api.vercel.com/v2/domains/:domain/records/:id[?teamId=:team]   (value differs)
//! POST   https://api.vercel.com/v4/domains/:domain/records[?teamId=:team]
//! Authorization: Bearer :token
//! ```
//!
//! Like Netlify, a stale record is deleted and created again.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport;
use ddns_core::{RecordConfig, Result};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::net::IpAddr;
use tracing::{debug, info};

use crate::common;

pub const NAME: &str = "vercel";

const BASE_URL: &str = "https://api.vercel.com";
const DEFAULT_TTL: u32 = 60;
const COMMENT: &str = "Managed by ddnsd";

#[derive(Deserialize)]
struct Listing {
    #[serde(default)]
    records: Vec<VercelRecord>,
}

#[derive(Deserialize)]
struct VercelRecord {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    value: String,
}

pub struct VercelProvider {
    token: String,
    team_id: Option<String>,
    domain: String,
    /// Record name, empty for the apex
    name: String,
    ttl: u32,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for VercelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VercelProvider")
            .field("token", &"<REDACTED>")
            .field("team_id", &self.team_id)
            .field("domain", &self.domain)
            .field("name", &self.name)
            .finish()
    }
}

impl VercelProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            token: common::required(record, NAME, "token")?,
            team_id: record.credential("team_id").map(str::to_string),
            domain: record.domain.clone(),
            name: common::owner_or_empty(record).to_string(),
            ttl: record.ttl.filter(|ttl| *ttl > 0).unwrap_or(DEFAULT_TTL),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Vercel", "https://vercel.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn url(&self, path: &str) -> Result<Url> {
        let mut url = common::endpoint(&self.base, path)?;
        if let Some(team) = &self.team_id {
            url.query_pairs_mut().append_pair("teamId", team);
        }
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token).header("Accept", "application/json")
    }

    async fn create_record(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<()> {
        let payload = json!({
            "name": self.name,
            "type": target.record_type(),
            "value": target.ip.to_string(),
            "ttl": self.ttl,
            "comment": COMMENT,
        });
        let url = self.url(&format!("/v4/domains/{}/records", self.domain))?;
        let response = self.authorized(client.post(url)).json(&payload).send().await?;
        transport::expect_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl DnsProvider for VercelProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let url = self.url(&format!("/v4/domains/{}/records", self.domain))?;
        let body = transport::expect_status(self.authorized(client.get(url)).send().await?, StatusCode::OK).await?;
        let listing: Listing = transport::decode_json(&body)?;
        let existing = listing
            .records
            .into_iter()
            .find(|r| r.name == self.name && r.kind == target.record_type());

        match existing {
            Some(record) if transport::parse_ip(&record.value).ok() == Some(target.ip) => {
                debug!(domain = %self.domain, name = %self.name, "Vercel record already up to date");
            }
            Some(record) => {
                let url = self.url(&format!("/v2/domains/{}/records/{}", self.domain, record.id))?;
                transport::expect_success(self.authorized(client.delete(url)).send().await?).await?;
                debug!(domain = %self.domain, id = %record.id, "deleted stale Vercel record");
                self.create_record(client, target).await?;
            }
            None => {
                self.create_record(client, target).await?;
                info!(domain = %self.domain, name = %self.name, "created Vercel record");
            }
        }
        Ok(target.ip)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(VercelProvider::new(record)?))
}
