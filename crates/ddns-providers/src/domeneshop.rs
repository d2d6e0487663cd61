//! Domeneshop
//!
//! ```http
//! GET https://api.domeneshop.no/v0/dyndns/update?hostname=:fqdn&myip=:ip
//! Authorization: Basic :token::secret
//! ```
//!
//! Success is an empty `204`.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{StatusCode, Url};
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::{common, dyndns};

pub const NAME: &str = "domeneshop";

const BASE_URL: &str = "https://api.domeneshop.no";

pub struct DomeneshopProvider {
    token: String,
    secret: String,
    fqdn: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for DomeneshopProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomeneshopProvider")
            .field("token", &"<REDACTED>")
            .field("secret", &"<REDACTED>")
            .field("fqdn", &self.fqdn)
            .finish()
    }
}

impl DomeneshopProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        common::reject_wildcard(record, NAME)?;
        Ok(Self {
            token: common::required(record, NAME, "token")?,
            secret: common::required(record, NAME, "secret")?,
            fqdn: record.fqdn(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Domeneshop", "https://domene.shop/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

#[async_trait]
impl DnsProvider for DomeneshopProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let url = dyndns::nic_update_url(&self.base, "/v0/dyndns/update", &self.fqdn, target)?;
        debug!(fqdn = %self.fqdn, "updating Domeneshop record");
        let response = client
            .get(url)
            .basic_auth(&self.token, Some(&self.secret))
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(target.ip);
        }
        let body = transport::read_body(response).await?;
        match status {
            StatusCode::NOT_FOUND => Err(Error::hostname_not_exists(single_line(&body))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::auth(single_line(&body))),
            _ => Err(Error::bad_status(status.as_u16(), single_line(&body))),
        }
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(DomeneshopProvider::new(record)?))
}
