//! GoDaddy
//!
//! A single PUT replaces the record set, so no lookup is needed:
//!
//! ```http
//! PUT https://api.godaddy.com/v1/domains/:domain/records/A/:owner
//! Authorization: sso-key :key::secret
//!
//! [{"data": "203.0.113.7"}]
//! ```

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::common;

pub const NAME: &str = "godaddy";

const BASE_URL: &str = "https://api.godaddy.com";
const KEY_PATTERN: &str = r"^[A-Za-z0-9]{8,14}_[A-Za-z0-9]{21,22}$";

#[derive(Deserialize)]
struct Failure {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

pub struct GoDaddyProvider {
    key: String,
    secret: String,
    domain: String,
    owner: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for GoDaddyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoDaddyProvider")
            .field("key", &"<REDACTED>")
            .field("secret", &"<REDACTED>")
            .field("domain", &self.domain)
            .field("owner", &self.owner)
            .finish()
    }
}

impl GoDaddyProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        let key = common::required(record, NAME, "key")?;
        common::check_format(NAME, "key", &key, KEY_PATTERN)?;
        Ok(Self {
            key,
            secret: common::required(record, NAME, "secret")?,
            domain: record.domain.clone(),
            owner: record.owner.clone(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "GoDaddy", "https://godaddy.com", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

#[async_trait]
impl DnsProvider for GoDaddyProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let path = format!(
            "/v1/domains/{}/records/{}/{}",
            self.domain,
            target.record_type(),
            self.owner
        );
        let url = common::endpoint(&self.base, &path)?;
        debug!(domain = %self.domain, owner = %self.owner, "replacing GoDaddy record set");

        let response = client
            .put(url)
            .header("Authorization", format!("sso-key {}:{}", self.key, self.secret))
            .header("Accept", "application/json")
            .json(&json!([{ "data": target.ip.to_string() }]))
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::OK {
            return Ok(target.ip);
        }

        let body = transport::read_body(response).await?;
        let message = match serde_json::from_str::<Failure>(&body) {
            Ok(failure) if !failure.message.is_empty() => format!("{}: {}", failure.code, failure.message),
            _ => single_line(&body),
        };
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::auth(message),
            StatusCode::NOT_FOUND => Error::zone_not_found(message),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Error::bad_request(message),
            _ => Error::bad_status(status.as_u16(), message),
        })
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(GoDaddyProvider::new(record)?))
}
