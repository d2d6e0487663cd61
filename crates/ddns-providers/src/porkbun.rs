//! Porkbun
//!
//! Every call is a POST under `/api/json/v3/dns/` whose JSON body carries
//! the API key pair:
//!
//! ```http
//! POST /api/json/v3/dns/retrieveByNameType/:domain/:type/:owner
//! POST /api/json/v3/dns/deleteByNameType/:domain/ALIAS/:owner.
//! POST /api/json/v3/dns/create/:domain
//! POST /api/json/v3/dns/edit/:domain/:id
//! ```
//!
//! A parking `ALIAS` record on a fresh domain conflicts with a new `A`
//! record, so it is removed before the first create.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::net::IpAddr;
use tracing::{debug, info};

use crate::common;

pub const NAME: &str = "porkbun";

const BASE_URL: &str = "https://api.porkbun.com";
const MIN_TTL: u32 = 600;

#[derive(Deserialize)]
struct Retrieved {
    #[serde(default)]
    records: Vec<PorkbunRecord>,
}

#[derive(Deserialize)]
struct PorkbunRecord {
    id: String,
    content: String,
}

#[derive(Deserialize)]
struct Failure {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

pub struct PorkbunProvider {
    api_key: String,
    secret_api_key: String,
    domain: String,
    owner: String,
    ttl: u32,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for PorkbunProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PorkbunProvider")
            .field("api_key", &"<REDACTED>")
            .field("secret_api_key", &"<REDACTED>")
            .field("domain", &self.domain)
            .field("owner", &self.owner)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl PorkbunProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        common::ttl_at_least(record, NAME, MIN_TTL)?;
        Ok(Self {
            api_key: common::required(record, NAME, "api_key")?,
            secret_api_key: common::required(record, NAME, "secret_api_key")?,
            domain: record.domain.clone(),
            owner: record.owner.clone(),
            ttl: record.ttl.unwrap_or(MIN_TTL),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Porkbun", "https://porkbun.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    /// Owner segment of lookup paths, empty for the apex and the wildcard
    fn owner_segment(&self) -> &str {
        if self.owner == "@" || self.owner == "*" { "" } else { &self.owner }
    }

    /// Record name sent on create and edit, empty for the apex
    fn name(&self) -> &str {
        if self.owner == "@" { "" } else { &self.owner }
    }

    async fn post(&self, client: &reqwest::Client, path: &str, mut body: Value) -> Result<String> {
        body["apikey"] = json!(self.api_key);
        body["secretapikey"] = json!(self.secret_api_key);
        let url = common::endpoint(&self.base, &format!("/api/json/v3/dns/{path}"))?;

        let response = client.post(url).json(&body).send().await?;
        let status = response.status();
        let text = transport::read_body(response).await?;
        if status.is_success() {
            return Ok(text);
        }

        let failure = serde_json::from_str::<Failure>(&text).ok().filter(|f| f.status == "ERROR");
        Err(match failure {
            Some(f) if f.message.to_ascii_lowercase().contains("invalid api key") => Error::auth(f.message),
            Some(f) => Error::bad_status(status.as_u16(), f.message),
            None => Error::bad_status(status.as_u16(), single_line(&text)),
        })
    }

    async fn retrieve(&self, client: &reqwest::Client, record_type: &str) -> Result<Vec<PorkbunRecord>> {
        let path = format!(
            "retrieveByNameType/{}/{record_type}/{}",
            self.domain,
            self.owner_segment()
        );
        let body = self.post(client, &path, json!({})).await?;
        Ok(transport::decode_json::<Retrieved>(&body)?.records)
    }

    async fn delete_alias(&self, client: &reqwest::Client) -> Result<()> {
        let subdomain = if self.owner == "@" { String::new() } else { format!("{}.", self.owner) };
        let path = format!("deleteByNameType/{}/ALIAS/{subdomain}", self.domain);
        self.post(client, &path, json!({})).await.map(drop)
    }

    fn record_body(&self, target: UpdateTarget) -> Value {
        let mut body = json!({
            "content": target.ip.to_string(),
            "type": target.record_type(),
            "ttl": self.ttl.to_string(),
        });
        if !self.name().is_empty() {
            body["name"] = json!(self.name());
        }
        body
    }
}

#[async_trait]
impl DnsProvider for PorkbunProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let value = target.ip.to_string();
        let records = self.retrieve(client, target.record_type()).await?;

        if records.is_empty() {
            debug!(domain = %self.domain, owner = %self.owner, "removing parking ALIAS record");
            self.delete_alias(client).await?;
            self.post(client, &format!("create/{}", self.domain), self.record_body(target))
                .await?;
            info!(domain = %self.domain, owner = %self.owner, "created Porkbun record");
            return Ok(target.ip);
        }

        if records.iter().all(|record| record.content == value) {
            return Ok(target.ip);
        }
        for record in &records {
            let path = format!("edit/{}/{}", self.domain, record.id);
            self.post(client, &path, self.record_body(target)).await?;
        }
        Ok(target.ip)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(PorkbunProvider::new(record)?))
}
