//! Dyn (Oracle Dyn Remote Access)
//!
//! ```http
//! GET https://members.dyndns.org/v3/update?hostname=:fqdn&myip=:ip
//! Authorization: Basic :username::client_key
//! ```
//!
//! The origin of the DynDNS-2 protocol. The updater client key stands in
//! for the account password.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::{RecordConfig, Result};
use reqwest::Url;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::{common, dyndns};

pub const NAME: &str = "dyn";

const BASE_URL: &str = "https://members.dyndns.org";

pub struct DynProvider {
    username: String,
    client_key: String,
    fqdn: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for DynProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynProvider")
            .field("username", &self.username)
            .field("client_key", &"<REDACTED>")
            .field("fqdn", &self.fqdn)
            .finish()
    }
}

impl DynProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            username: common::required(record, NAME, "username")?,
            client_key: common::required(record, NAME, "client_key")?,
            fqdn: record.fqdn(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Dyn DNS", "https://account.dyn.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

#[async_trait]
impl DnsProvider for DynProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let url = dyndns::nic_update_url(&self.base, "/v3/update", &self.fqdn, target)?;
        debug!(fqdn = %self.fqdn, "updating Dyn host");
        let request = client.get(url).basic_auth(&self.username, Some(&self.client_key));
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
    Ok(Box::new(DynProvider::new(record)?))
}
