//! Hurricane Electric
//!
//! ```http
//! GET https://dyn.dns.he.net/nic/update?hostname=:fqdn&myip=:ip
//! Authorization: Basic :fqdn::password
//! ```
//!
//! The per-record DDNS key is the password and the FQDN the username.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::{RecordConfig, Result};
use reqwest::Url;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::{common, dyndns};

pub const NAME: &str = "he";

const BASE_URL: &str = "https://dyn.dns.he.net";

pub struct HeProvider {
    fqdn: String,
    password: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for HeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeProvider")
            .field("fqdn", &self.fqdn)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

impl HeProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            fqdn: record.fqdn(),
            password: common::required(record, NAME, "password")?,
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "he.net", "https://dns.he.net/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

#[async_trait]
impl DnsProvider for HeProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let url = dyndns::nic_update_url(&self.base, "/nic/update", &self.fqdn, target)?;
        debug!(fqdn = %self.fqdn, "updating he.net record");
        let request = client.get(url).basic_auth(&self.fqdn, Some(&self.password));
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
    Ok(Box::new(HeProvider::new(record)?))
}
