//! Securepoint Dynamic DNS
//!
//! ```http
//! GET https://update.spdyn.de/nic/update?hostname=:fqdn&myip=:ip&user=:user&pass=:password
//! ```
//!
//! Either an account (`user` and `password`) or a per-host `token` is
//! configured. With a token the FQDN is the user. The vendor always wants
//! `myip`, so a placeholder is sent when it should pick the address.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, RedactedUrl, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{StatusCode, Url};
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::{common, dyndns};

pub const NAME: &str = "spdyn";

const BASE_URL: &str = "https://update.spdyn.de";
const PLACEHOLDER_IP: &str = "10.0.0.1";

pub struct SpdynProvider {
    fqdn: String,
    user: String,
    pass: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for SpdynProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpdynProvider")
            .field("fqdn", &self.fqdn)
            .field("user", &self.user)
            .field("pass", &"<REDACTED>")
            .finish()
    }
}

impl SpdynProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        let fqdn = record.fqdn();
        let (user, pass) = match record.credential("token") {
            Some(token) => (fqdn.clone(), token.to_string()),
            None => match (record.credential("user"), record.credential("password")) {
                (Some(user), Some(password)) => (user.to_string(), password.to_string()),
                _ => {
                    return Err(Error::config(format!(
                        "{NAME}: either token or user and password must be set for {fqdn}"
                    )));
                }
            },
        };
        Ok(Self {
            fqdn,
            user,
            pass,
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Spdyn DNS", "https://spdyn.de/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn url(&self, target: UpdateTarget) -> Result<Url> {
        let mut url = common::endpoint(&self.base, "/nic/update")?;
        let ip = if target.sends_ip() { target.ip.to_string() } else { PLACEHOLDER_IP.to_string() };
        url.query_pairs_mut()
            .append_pair("hostname", &self.fqdn)
            .append_pair("myip", &ip)
            .append_pair("user", &self.user)
            .append_pair("pass", &self.pass);
        Ok(url)
    }
}

#[async_trait]
impl DnsProvider for SpdynProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let url = self.url(target)?;
        debug!(url = %RedactedUrl::new(&url, &["pass"]), "updating Spdyn host");
        let response = client.get(url).send().await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        if status != StatusCode::OK {
            return Err(Error::bad_status(status.as_u16(), single_line(&body)));
        }
        match dyndns::first_token(&body).as_str() {
            "notfqdn" => Err(Error::bad_request("not a fully qualified domain name")),
            "fatal" => Err(Error::hostname_not_exists(single_line(&body))),
            _ => {
                dyndns::classify(status, &body)?;
                Ok(target.ip)
            }
        }
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }

    fn supports_provider_ip(&self) -> bool {
        true
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(SpdynProvider::new(record)?))
}
