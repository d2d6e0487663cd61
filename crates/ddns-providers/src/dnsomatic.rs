//! DNS-O-Matic
//!
//! ```http
//! GET https://updates.dnsomatic.com/nic/update?hostname=:fqdn&myip=:ip&wildcard=NOCHG&mx=NOCHG&backmx=NOCHG
//! ```
//!
//! A `*` owner updates the domain itself with `wildcard=ON`.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::{RecordConfig, Result};
use reqwest::Url;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::{common, dyndns};

pub const NAME: &str = "dnsomatic";

const BASE_URL: &str = "https://updates.dnsomatic.com";
const USERNAME_PATTERN: &str = r"^[a-zA-Z0-9@._-]{3,25}$";

pub struct DnsOMaticProvider {
    username: String,
    password: String,
    hostname: String,
    wildcard: bool,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for DnsOMaticProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsOMaticProvider")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("hostname", &self.hostname)
            .field("wildcard", &self.wildcard)
            .finish()
    }
}

impl DnsOMaticProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        let username = common::required(record, NAME, "username")?;
        common::check_format(NAME, "username", &username, USERNAME_PATTERN)?;
        let wildcard = record.owner == "*";
        Ok(Self {
            username,
            password: common::required(record, NAME, "password")?,
            hostname: if wildcard { record.domain.clone() } else { record.fqdn() },
            wildcard,
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "DNS-O-Matic", "https://www.dnsomatic.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

#[async_trait]
impl DnsProvider for DnsOMaticProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let mut url = dyndns::nic_update_url(&self.base, "/nic/update", &self.hostname, target)?;
        url.query_pairs_mut()
            .append_pair("wildcard", if self.wildcard { "ON" } else { "NOCHG" })
            .append_pair("mx", "NOCHG")
            .append_pair("backmx", "NOCHG");
        debug!(hostname = %self.hostname, "updating DNS-O-Matic host");
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
    Ok(Box::new(DnsOMaticProvider::new(record)?))
}
