//! Now-DNS
//!
//! ```http
//! GET https://now-dns.com/update?hostname=:domain&myip=:ip
//! Authorization: Basic :username::password
//! ```
//!
//! Failures come back as `400` with a DynDNS-2 token in the body.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::{RecordConfig, Result};
use reqwest::Url;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::{common, dyndns};

pub const NAME: &str = "nowdns";

const BASE_URL: &str = "https://now-dns.com";

pub struct NowDnsProvider {
    username: String,
    password: String,
    hostname: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for NowDnsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NowDnsProvider")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("hostname", &self.hostname)
            .finish()
    }
}

impl NowDnsProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            username: common::required(record, NAME, "username")?,
            password: common::required(record, NAME, "password")?,
            hostname: record.fqdn(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Now-DNS", "https://now-dns.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

#[async_trait]
impl DnsProvider for NowDnsProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let url = dyndns::nic_update_url(&self.base, "/update", &self.hostname, target)?;
        debug!(hostname = %self.hostname, "updating Now-DNS host");
        let request = client.get(url).basic_auth(&self.username, Some(&self.password));
        dyndns::send(request, target).await
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }

    fn supports_provider_ip(&self) -> bool {
        true
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(NowDnsProvider::new(record)?))
}
