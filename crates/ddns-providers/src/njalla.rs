//! Njalla
//!
//! ```http
//! GET https://njal.la/update?h=:fqdn&k=:key&a=:ipv4
//! GET https://njal.la/update?h=:fqdn&k=:key&aaaa=:ipv6
//! GET https://njal.la/update?h=:fqdn&k=:key&auto
//! ```
//!
//! ```json
//! {"status": 200, "message": "record updated", "value": {"A": "203.0.113.7"}}
//! ```

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, RedactedUrl};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::common;

pub const NAME: &str = "njalla";

const BASE_URL: &str = "https://njal.la";

#[derive(Deserialize)]
struct Answer {
    #[serde(default)]
    message: String,
    #[serde(default)]
    value: Values,
}

#[derive(Deserialize, Default)]
struct Values {
    #[serde(rename = "A", default)]
    a: String,
    #[serde(rename = "AAAA", default)]
    aaaa: String,
}

pub struct NjallaProvider {
    fqdn: String,
    key: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for NjallaProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NjallaProvider")
            .field("fqdn", &self.fqdn)
            .field("key", &"<REDACTED>")
            .finish()
    }
}

impl NjallaProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            fqdn: record.fqdn(),
            key: common::required(record, NAME, "key")?,
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Njalla", "https://njal.la/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn url(&self, target: UpdateTarget) -> Result<Url> {
        let mut url = common::endpoint(&self.base, "/update")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("h", &self.fqdn).append_pair("k", &self.key);
            if !target.sends_ip() {
                query.append_pair("auto", "");
            } else if target.is_ipv6() {
                query.append_pair("aaaa", &target.ip.to_string());
            } else {
                query.append_pair("a", &target.ip.to_string());
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl DnsProvider for NjallaProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let url = self.url(target)?;
        debug!(url = %RedactedUrl::new(&url, &["k"]), "updating Njalla record");
        let response = client.get(url).send().await?;
        let status = response.status();
        let answer: Answer = transport::decode_json(&transport::read_body(response).await?)?;

        match status {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => return Err(Error::auth(answer.message)),
            StatusCode::INTERNAL_SERVER_ERROR => return Err(Error::bad_request(answer.message)),
            _ => return Err(Error::bad_status(status.as_u16(), answer.message)),
        }
        if answer.message != "record updated" {
            return Err(Error::unknown_response(answer.message));
        }
        let raw = if target.is_ipv6() { &answer.value.aaaa } else { &answer.value.a };
        let received = raw
            .parse()
            .map_err(|_| Error::malformed_received_ip(raw.clone()))?;
        common::confirm(target, Some(received))
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }

    fn supports_provider_ip(&self) -> bool {
        true
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(NjallaProvider::new(record)?))
}
