//! Loopia
//!
//! ```http
//! GET https://dyndns.loopia.se/?hostname=:fqdn&myip=:ip
//! Authorization: Basic :username::password
//! ```
//!
//! `911` is answered for malformed requests as well as server trouble and
//! is treated as a bad request.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{StatusCode, Url};
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::{common, dyndns};

pub const NAME: &str = "loopia";

const BASE_URL: &str = "https://dyndns.loopia.se";

pub struct LoopiaProvider {
    username: String,
    password: String,
    fqdn: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for LoopiaProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopiaProvider")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("fqdn", &self.fqdn)
            .finish()
    }
}

impl LoopiaProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        common::reject_wildcard(record, NAME)?;
        Ok(Self {
            username: common::required(record, NAME, "username")?,
            password: common::required(record, NAME, "password")?,
            fqdn: record.fqdn(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Loopia", "https://www.loopia.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

#[async_trait]
impl DnsProvider for LoopiaProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let url = dyndns::nic_update_url(&self.base, "/", &self.fqdn, target)?;
        debug!(fqdn = %self.fqdn, "updating Loopia host");
        let response = client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        if status != StatusCode::OK {
            return Err(Error::bad_status(status.as_u16(), single_line(&body)));
        }
        if dyndns::first_token(&body) == "911" {
            return Err(Error::bad_request(single_line(&body)));
        }
        dyndns::classify(status, &body)?;
        Ok(target.ip)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(LoopiaProvider::new(record)?))
}
