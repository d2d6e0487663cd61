//! Vultr
//!
//! ```http
//! GET   /v2/domains/:domain/records?per_page=500
//! POST  /v2/domains/:domain/records           (no record yet, 201)
//! PATCH /v2/domains/:domain/records/:id       (data differs, 204)
//! ```
//!
//! Authenticated with a bearer API key. The TTL must be configured.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::net::IpAddr;
use tracing::info;

use crate::common;

pub const NAME: &str = "vultr";

const BASE_URL: &str = "https://api.vultr.com";

#[derive(Deserialize)]
struct Listing {
    #[serde(default)]
    records: Vec<VultrRecord>,
}

#[derive(Deserialize)]
struct Created {
    record: VultrRecord,
}

#[derive(Deserialize)]
struct VultrRecord {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    data: String,
}

#[derive(Deserialize)]
struct Failure {
    #[serde(default)]
    error: String,
}

/// Classify a response that does not carry the expected status
async fn failure(response: Response) -> Error {
    let status = response.status();
    let body = match transport::read_body(response).await {
        Ok(body) => body,
        Err(err) => return err,
    };
    let message = match serde_json::from_str::<Failure>(&body) {
        Ok(f) if !f.error.is_empty() => f.error,
        _ => single_line(&body),
    };
    match status {
        StatusCode::BAD_REQUEST => Error::bad_request(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::auth(message),
        StatusCode::NOT_FOUND => Error::zone_not_found(message),
        _ => Error::bad_status(status.as_u16(), message),
    }
}

pub struct VultrProvider {
    token: String,
    domain: String,
    name: String,
    ttl: u32,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for VultrProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VultrProvider")
            .field("token", &"<REDACTED>")
            .field("domain", &self.domain)
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl VultrProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        let ttl = match record.ttl {
            Some(ttl) if ttl > 0 => ttl,
            _ => return Err(Error::config(format!("{NAME}: ttl is not set for {}", record.fqdn()))),
        };
        Ok(Self {
            token: common::required(record, NAME, "token")?,
            domain: record.domain.clone(),
            name: common::owner_or_empty(record).to_string(),
            ttl,
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Vultr", "https://www.vultr.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn records_path(&self) -> String {
        format!("/v2/domains/{}/records", self.domain)
    }
}

#[async_trait]
impl DnsProvider for VultrProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let mut url = common::endpoint(&self.base, &self.records_path())?;
        url.query_pairs_mut().append_pair("per_page", "500");
        let response = client.get(url).bearer_auth(&self.token).send().await?;
        if response.status() != StatusCode::OK {
            return Err(failure(response).await);
        }
        let listing: Listing = transport::decode_json(&transport::read_body(response).await?)?;

        let value = target.ip.to_string();
        let existing = listing
            .records
            .into_iter()
            .find(|r| r.name == self.name && r.kind == target.record_type());

        match existing {
            None => {
                let url = common::endpoint(&self.base, &self.records_path())?;
                let payload = json!({
                    "type": target.record_type(),
                    "data": value,
                    "name": self.name,
                    "ttl": self.ttl,
                });
                let response = client.post(url).bearer_auth(&self.token).json(&payload).send().await?;
                if response.status() != StatusCode::CREATED {
                    return Err(failure(response).await);
                }
                let created: Created = transport::decode_json(&transport::read_body(response).await?)?;
                info!(domain = %self.domain, name = %self.name, "created Vultr record");
                common::confirm(target, Some(transport::parse_ip(&created.record.data)?))
            }
            Some(record) if record.data == value => Ok(target.ip),
            Some(record) => {
                let path = format!("{}/{}", self.records_path(), record.id);
                let url = common::endpoint(&self.base, &path)?;
                let payload = json!({ "data": value, "name": self.name, "ttl": self.ttl });
                let response = client.patch(url).bearer_auth(&self.token).json(&payload).send().await?;
                if response.status() != StatusCode::NO_CONTENT {
                    return Err(failure(response).await);
                }
                Ok(target.ip)
            }
        }
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(VultrProvider::new(record)?))
}
