//! DonDominio
//!
//! ```http
//! GET https://dondns.dondominio.com/json/?user=:username&apikey=:key&host=:fqdn&ip=:ip&lang=en
//! Accept: application/json
//! ```
//!
//! ```json
//! {"success": false, "messages": ["Invalid user or API key"]}
//! ```
//!
//! The key used to be configured as `password`, which is still accepted.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, RedactedUrl};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::Url;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::common;

pub const NAME: &str = "dondominio";

const BASE_URL: &str = "https://dondns.dondominio.com";

#[derive(Deserialize)]
struct Answer {
    success: bool,
    #[serde(default)]
    messages: Vec<String>,
}

pub struct DonDominioProvider {
    username: String,
    key: String,
    name: String,
    fqdn: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for DonDominioProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DonDominioProvider")
            .field("username", &self.username)
            .field("key", &"<REDACTED>")
            .field("name", &self.name)
            .field("fqdn", &self.fqdn)
            .finish()
    }
}

impl DonDominioProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        let key = match record.credential("password") {
            Some(password) => password.to_string(),
            None => common::required(record, NAME, "key")?,
        };
        Ok(Self {
            username: common::required(record, NAME, "username")?,
            key,
            name: common::required(record, NAME, "name")?,
            fqdn: record.fqdn(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "DonDominio", "https://www.dondominio.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

#[async_trait]
impl DnsProvider for DonDominioProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let mut url = common::endpoint(&self.base, "/json/")?;
        url.query_pairs_mut()
            .append_pair("user", &self.username)
            .append_pair("apikey", &self.key)
            .append_pair("host", &self.fqdn)
            .append_pair("ip", &target.ip.to_string())
            .append_pair("lang", "en");
        debug!(url = %RedactedUrl::new(&url, &["apikey"]), "updating DonDominio host");

        let response = client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let answer: Answer = transport::decode_json(&transport::read_body(response).await?)?;
        if !answer.success {
            return Err(Error::unknown_response(answer.messages.join(", ")));
        }
        Ok(target.ip)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(DonDominioProvider::new(record)?))
}
