//! No-IP
//!
//! ```http
//! GET https://dynupdate.no-ip.com/nic/update?hostname=:fqdn&myip=:ip
//! Authorization: Basic :username::password
//! ```
//!
//! Answers use the DynDNS-2 return codes, `good` and `nochg` followed by
//! the address now set.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::Url;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::{common, dyndns};

pub const NAME: &str = "noip";

const BASE_URL: &str = "https://dynupdate.no-ip.com";
const MAX_USERNAME_LEN: usize = 50;

pub struct NoIpProvider {
    username: String,
    password: String,
    fqdn: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for NoIpProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoIpProvider")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("fqdn", &self.fqdn)
            .finish()
    }
}

impl NoIpProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        let username = common::required(record, NAME, "username")?;
        if username.len() > MAX_USERNAME_LEN {
            return Err(Error::config(format!(
                "{NAME}: username is longer than {MAX_USERNAME_LEN} characters"
            )));
        }
        Ok(Self {
            username,
            password: common::required(record, NAME, "password")?,
            fqdn: record.fqdn(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "NoIP", "https://www.noip.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

#[async_trait]
impl DnsProvider for NoIpProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let url = dyndns::nic_update_url(&self.base, "/nic/update", &self.fqdn, target)?;
        debug!(fqdn = %self.fqdn, "updating No-IP host");
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
    Ok(Box::new(NoIpProvider::new(record)?))
}
