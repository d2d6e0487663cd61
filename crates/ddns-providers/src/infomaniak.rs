//! Infomaniak
//!
//! ```http
//! GET https://infomaniak.com/nic/update?hostname=:fqdn&myip=:ip
//! Authorization: Basic :username::password
//! ```

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::{RecordConfig, Result};
use reqwest::Url;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::{common, dyndns};

pub const NAME: &str = "infomaniak";

const BASE_URL: &str = "https://infomaniak.com";

pub struct InfomaniakProvider {
    username: String,
    password: String,
    fqdn: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for InfomaniakProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfomaniakProvider")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("fqdn", &self.fqdn)
            .finish()
    }
}

impl InfomaniakProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            username: common::required(record, NAME, "username")?,
            password: common::required(record, NAME, "password")?,
            fqdn: record.fqdn(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Infomaniak", "https://www.infomaniak.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

#[async_trait]
impl DnsProvider for InfomaniakProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let url = dyndns::nic_update_url(&self.base, "/nic/update", &self.fqdn, target)?;
        debug!(fqdn = %self.fqdn, "updating Infomaniak host");
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
    Ok(Box::new(InfomaniakProvider::new(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_is_required() {
        let record = RecordConfig::new(NAME, "example.com").with_credential("username", "user");
        assert!(InfomaniakProvider::new(&record).is_err());
    }
}
