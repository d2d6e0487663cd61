//! Servercow
//!
//! ```http
//! POST https://api.servercow.de/dns/v1/domains/:domain
//! X-Auth-Username: ...
//! X-Auth-Password: ...
//!
//! {"type": "A", "name": "www", "content": "203.0.113.7", "ttl": 120}
//! ```
//!
//! The POST is an upsert. Success is `{"message": "ok"}`, failures carry
//! an `error` field.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::net::IpAddr;

use crate::common;

pub const NAME: &str = "servercow";

const BASE_URL: &str = "https://api.servercow.de";
const DEFAULT_TTL: u32 = 120;

#[derive(Deserialize)]
struct Answer {
    #[serde(default)]
    message: String,
    #[serde(default)]
    error: String,
}

pub struct ServercowProvider {
    username: String,
    password: String,
    domain: String,
    name: String,
    ttl: u32,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for ServercowProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServercowProvider")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("domain", &self.domain)
            .field("name", &self.name)
            .finish()
    }
}

impl ServercowProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            username: common::required(record, NAME, "username")?,
            password: common::required(record, NAME, "password")?,
            domain: record.domain.clone(),
            name: common::owner_or_empty(record).to_string(),
            ttl: record.ttl.unwrap_or(DEFAULT_TTL),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Servercow", "https://servercow.de/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

#[async_trait]
impl DnsProvider for ServercowProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let url = common::endpoint(&self.base, &format!("/dns/v1/domains/{}", self.domain))?;
        let payload = json!({
            "type": target.record_type(),
            "name": self.name,
            "content": target.ip.to_string(),
            "ttl": self.ttl,
        });

        let response = client
            .post(url)
            .header("X-Auth-Username", &self.username)
            .header("X-Auth-Password", &self.password)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let body = transport::read_body(response).await?;

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::auth(single_line(&body)));
        }
        if status.as_u16() > 415 {
            return Err(Error::bad_status(status.as_u16(), single_line(&body)));
        }

        let answer: Answer = transport::decode_json(&body)?;
        if !answer.error.is_empty() {
            return Err(Error::bad_request(answer.error));
        }
        if answer.message != "ok" {
            return Err(Error::unknown_response(single_line(&body)));
        }
        Ok(target.ip)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(ServercowProvider::new(record)?))
}
