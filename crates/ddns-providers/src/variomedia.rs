//! Variomedia
//!
//! ```http
//! GET https://dyndns.variomedia.de/nic/update?hostname=:fqdn&myip=:ip
//! Authorization: Basic :email::password
//! ```

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::{RecordConfig, Result};
use reqwest::Url;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::{common, dyndns};

pub const NAME: &str = "variomedia";

const BASE_URL: &str = "https://dyndns.variomedia.de";

pub struct VariomediaProvider {
    email: String,
    password: String,
    fqdn: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for VariomediaProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariomediaProvider")
            .field("email", &self.email)
            .field("password", &"<REDACTED>")
            .field("fqdn", &self.fqdn)
            .finish()
    }
}

impl VariomediaProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        common::reject_wildcard(record, NAME)?;
        Ok(Self {
            email: common::required(record, NAME, "email")?,
            password: common::required(record, NAME, "password")?,
            fqdn: record.fqdn(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Variomedia", "https://www.variomedia.de/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

#[async_trait]
impl DnsProvider for VariomediaProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let url = dyndns::nic_update_url(&self.base, "/nic/update", &self.fqdn, target)?;
        debug!(fqdn = %self.fqdn, "updating Variomedia host");
        let request = client.get(url).basic_auth(&self.email, Some(&self.password));
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
    Ok(Box::new(VariomediaProvider::new(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_owner_is_rejected() {
        let record = RecordConfig::new(NAME, "example.com")
            .with_owner("*")
            .with_credential("email", "me@example.com")
            .with_credential("password", "pass");
        assert!(VariomediaProvider::new(&record).is_err());
    }
}
