//! FreeDNS (afraid.org)
//!
//! ```http
//! GET https://sync.afraid.org/u/:token/?ip=:ip
//! GET https://v6.sync.afraid.org/u/:token/?ip=:ip
//! ```
//!
//! The randomized update token is part of the path and names the host, so
//! it is redacted from every logged URL. Answers are plain sentences:
//!
//! ```text
//! Updated 1 host(s) home.example.com to 203.0.113.7 in 0.2 seconds
//! No IP change detected for home.example.com with IP 203.0.113.7, skipping update
//! ERROR: Unable to locate this record
//! ```

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, RedactedUrl, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{StatusCode, Url};
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::{common, dyndns};

pub const NAME: &str = "freedns";

const IPV4_BASE_URL: &str = "https://sync.afraid.org";
const IPV6_BASE_URL: &str = "https://v6.sync.afraid.org";

pub struct FreeDnsProvider {
    token: String,
    ipv4_base: Url,
    ipv6_base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for FreeDnsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreeDnsProvider").field("token", &"<REDACTED>").finish()
    }
}

impl FreeDnsProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            token: common::required(record, NAME, "token")?,
            ipv4_base: common::base_url(IPV4_BASE_URL)?,
            ipv6_base: common::base_url(IPV6_BASE_URL)?,
            description: ProviderDescription::new(NAME, "FreeDNS", "https://freedns.afraid.org/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.ipv4_base = base.clone();
        self.ipv6_base = base;
        self
    }
}

fn interpret(body: &str, target: UpdateTarget) -> Result<IpAddr> {
    let line = single_line(body);
    let lower = line.to_ascii_lowercase();
    if lower.starts_with("updated") || lower.starts_with("no ip change detected") {
        return common::confirm(target, dyndns::echoed_ip(body, target));
    }
    if lower.contains("unable to locate") {
        return Err(Error::hostname_not_exists(line));
    }
    if lower.contains("invalid update url") || lower.contains("authentication") {
        return Err(Error::auth(line));
    }
    Err(Error::unknown_response(line))
}

#[async_trait]
impl DnsProvider for FreeDnsProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let base = if target.is_ipv6() { &self.ipv6_base } else { &self.ipv4_base };
        let mut url = common::endpoint(base, &format!("/u/{}/", self.token))?;
        if target.sends_ip() {
            url.query_pairs_mut().append_pair("ip", &target.ip.to_string());
        }
        debug!(
            url = %RedactedUrl::new(&url, &[]).with_secret_path(&self.token),
            "updating FreeDNS host"
        );
        let response = client.get(url).send().await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        if status != StatusCode::OK {
            return Err(Error::bad_status(status.as_u16(), single_line(&body)));
        }
        interpret(&body, target)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }

    fn supports_provider_ip(&self) -> bool {
        true
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(FreeDnsProvider::new(record)?))
}
