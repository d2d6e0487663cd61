//! ZoneEdit
//!
//! ```http
//! GET https://api.cp.zoneedit.com/dyn/generic.php?hostname=:fqdn&myip=:ip
//! Authorization: Basic :username::token
//! ```
//!
//! Answers are XML-ish one-liners:
//!
//! ```text
//! <SUCCESS CODE="200" TEXT="Update succeeded." ZONE="example.com" IP="203.0.113.7">
//! <ERROR CODE="708" TEXT="Failed login: user">
//! ```

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, find_ips, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{StatusCode, Url};
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::{common, dyndns};

pub const NAME: &str = "zoneedit";

const BASE_URL: &str = "https://api.cp.zoneedit.com";

pub struct ZoneEditProvider {
    username: String,
    token: String,
    fqdn: String,
    wildcard: bool,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for ZoneEditProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZoneEditProvider")
            .field("username", &self.username)
            .field("token", &"<REDACTED>")
            .field("fqdn", &self.fqdn)
            .finish()
    }
}

impl ZoneEditProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            username: common::required(record, NAME, "username")?,
            token: common::required(record, NAME, "token")?,
            fqdn: record.fqdn(),
            wildcard: record.is_wildcard(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "ZoneEdit", "https://www.zoneedit.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

fn interpret(body: &str, username: &str, target: UpdateTarget) -> Result<IpAddr> {
    let lower = body.to_ascii_lowercase();
    if lower.contains(r#"success_code="200""#) || lower.contains(r#"success code="200""#) {
        // The address now set is the last one in the answer.
        let (v4, _) = find_ips(&lower);
        let echoed = match v4.as_slice() {
            [.., last] if !target.is_ipv6() => Some(IpAddr::V4(*last)),
            _ => None,
        };
        return common::confirm(target, echoed);
    }
    if lower.trim().is_empty() {
        Err(Error::unknown_response("empty response body"))
    } else if lower.contains(r#"error code="702""#) || lower.contains("minimum 600 seconds between requests") {
        Err(Error::Abuse("at least 10 minutes are required between requests".to_string()))
    } else if lower.contains(r#"error code="709""#) || lower.contains("invalid hostname") {
        Err(Error::Abuse(single_line(body)))
    } else if lower.contains(r#"error code="708""#) || lower.contains("failed login") {
        Err(Error::auth(format!("for user {username}")))
    } else {
        Err(Error::unknown_response(single_line(body)))
    }
}

#[async_trait]
impl DnsProvider for ZoneEditProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let mut url = dyndns::nic_update_url(&self.base, "/dyn/generic.php", &self.fqdn, target)?;
        if self.wildcard {
            url.query_pairs_mut().append_pair("wildcard", "ON");
        }
        debug!(fqdn = %self.fqdn, "updating ZoneEdit host");
        let response = client
            .get(url)
            .basic_auth(&self.username, Some(&self.token))
            .send()
            .await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        if status != StatusCode::OK {
            return Err(Error::bad_status(status.as_u16(), single_line(&body)));
        }
        interpret(&body, &self.username, target)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }

    fn supports_provider_ip(&self) -> bool {
        true
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(ZoneEditProvider::new(record)?))
}
