//! dynv6
//!
//! ```http
//! GET https://ipv4.dynv6.com/api/update?token=:token&zone=:fqdn&ipv4=:ip
//! GET https://ipv6.dynv6.com/api/update?token=:token&zone=:fqdn&ipv6=:ip
//! ```
//!
//! Each family has its own endpoint so that `auto` picks up the source
//! address of the right one.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, RedactedUrl, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{StatusCode, Url};
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::common;

pub const NAME: &str = "dynv6";

const IPV4_BASE_URL: &str = "https://ipv4.dynv6.com";
const IPV6_BASE_URL: &str = "https://ipv6.dynv6.com";

pub struct Dynv6Provider {
    token: String,
    zone: String,
    ipv4_base: Url,
    ipv6_base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for Dynv6Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dynv6Provider")
            .field("token", &"<REDACTED>")
            .field("zone", &self.zone)
            .finish()
    }
}

impl Dynv6Provider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        common::reject_wildcard(record, NAME)?;
        Ok(Self {
            token: common::required(record, NAME, "token")?,
            zone: record.fqdn(),
            ipv4_base: common::base_url(IPV4_BASE_URL)?,
            ipv6_base: common::base_url(IPV6_BASE_URL)?,
            description: ProviderDescription::new(NAME, "dynv6", "https://dynv6.com/", record),
        })
    }

    /// Send both families to `base`
    pub fn with_base_url(mut self, base: Url) -> Self {
        self.ipv4_base = base.clone();
        self.ipv6_base = base;
        self
    }
}

#[async_trait]
impl DnsProvider for Dynv6Provider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let (base, key) = if target.is_ipv6() {
            (&self.ipv6_base, "ipv6")
        } else {
            (&self.ipv4_base, "ipv4")
        };
        let value = if target.sends_ip() { target.ip.to_string() } else { "auto".to_string() };
        let mut url = common::endpoint(base, "/api/update")?;
        url.query_pairs_mut()
            .append_pair("token", &self.token)
            .append_pair("zone", &self.zone)
            .append_pair(key, &value);
        debug!(url = %RedactedUrl::new(&url, &["token"]), "updating dynv6 zone");

        let response = client.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::OK {
            return Ok(target.ip);
        }
        let body = transport::read_body(response).await?;
        Err(Error::bad_status(status.as_u16(), single_line(&body)))
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }

    fn supports_provider_ip(&self) -> bool {
        true
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(Dynv6Provider::new(record)?))
}
