//! easyDNS
//!
//! ```http
//! GET https://api.cp.easydns.com/dyn/generic.php?hostname=:fqdn&myip=:ip
//! Authorization: Basic :username::token
//! ```
//!
//! Answers are upper-case status words such as `NOERROR` or `NO_ACCESS`.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{StatusCode, Url};
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::{common, dyndns};

pub const NAME: &str = "easydns";

const BASE_URL: &str = "https://api.cp.easydns.com";

pub struct EasyDnsProvider {
    username: String,
    token: String,
    fqdn: String,
    wildcard: bool,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for EasyDnsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EasyDnsProvider")
            .field("username", &self.username)
            .field("token", &"<REDACTED>")
            .field("fqdn", &self.fqdn)
            .finish()
    }
}

impl EasyDnsProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            username: common::required(record, NAME, "username")?,
            token: common::required(record, NAME, "token")?,
            fqdn: record.fqdn(),
            wildcard: record.is_wildcard(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "EasyDNS", "https://easydns.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

/// Map an easyDNS status word onto the error taxonomy
fn interpret(body: &str, target: UpdateTarget) -> Result<IpAddr> {
    let line = single_line(body);
    if body.trim().is_empty() {
        Err(Error::unknown_response("empty response body"))
    } else if body.contains("NO_SERVICE") {
        Err(Error::FeatureUnavailable(line))
    } else if body.contains("NO_ACCESS") {
        Err(Error::auth(line))
    } else if body.contains("ILLEGAL_INPUT") || body.contains("TOO_SOON") {
        Err(Error::Abuse(line))
    } else if body.contains("NO_ERROR") || body.contains("NOERROR") || body.contains("OK") {
        Ok(target.ip)
    } else {
        Err(Error::unknown_response(line))
    }
}

#[async_trait]
impl DnsProvider for EasyDnsProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let mut url = dyndns::nic_update_url(&self.base, "/dyn/generic.php", &self.fqdn, target)?;
        if self.wildcard {
            url.query_pairs_mut().append_pair("wildcard", "ON");
        }
        debug!(fqdn = %self.fqdn, "updating easyDNS host");
        let response = client
            .get(url)
            .basic_auth(&self.username, Some(&self.token))
            .send()
            .await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        if status != StatusCode::OK {
            return Err(Error::bad_status(status.as_u16(), single_line(&body)));
        }
        interpret(&body, target)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }

    fn supports_provider_ip(&self) -> bool {
        true
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(EasyDnsProvider::new(record)?))
}
