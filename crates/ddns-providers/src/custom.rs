//! Custom HTTPS endpoint
//!
//! ```http
//! GET :url&:ipv4key=:ip
//! GET :url&:ipv6key=:ip
//! ```
//!
//! The configured URL must be HTTPS and keeps its own query. The address
//! is added under `ipv4key` or `ipv6key`, replacing any existing value,
//! and a `200` whose body matches `success_regex` is a success.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use regex::Regex;
use reqwest::{StatusCode, Url};
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::common;

pub const NAME: &str = "custom";

pub struct CustomProvider {
    url: Url,
    ipv4_key: String,
    ipv6_key: String,
    success: Regex,
    description: ProviderDescription,
}

impl fmt::Debug for CustomProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The URL usually carries a token.
        f.debug_struct("CustomProvider")
            .field("host", &self.url.host_str())
            .field("url", &"<REDACTED>")
            .field("success", &self.success.as_str())
            .finish()
    }
}

impl CustomProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        let raw = common::required(record, NAME, "url")?;
        let url = Url::parse(&raw).map_err(|e| Error::config(format!("{NAME}: url is not valid: {e}")))?;
        if url.scheme() != "https" {
            return Err(Error::config(format!("{NAME}: url scheme {} is not https", url.scheme())));
        }
        let pattern = common::required(record, NAME, "success_regex")?;
        let success = Regex::new(&pattern)
            .map_err(|e| Error::config(format!("{NAME}: success_regex is not valid: {e}")))?;
        Ok(Self {
            url,
            ipv4_key: common::required(record, NAME, "ipv4key")?,
            ipv6_key: common::required(record, NAME, "ipv6key")?,
            success,
            description: ProviderDescription::new(NAME, "Custom", "", record),
        })
    }

    /// Point the endpoint at another origin, keeping path and query
    pub fn with_base_url(mut self, base: Url) -> Self {
        let mut url = base;
        url.set_path(self.url.path());
        url.set_query(self.url.query());
        self.url = url;
        self
    }

    fn request_url(&self, target: UpdateTarget) -> Url {
        let key = if target.is_ipv6() { &self.ipv6_key } else { &self.ipv4_key };
        let kept: Vec<(String, String)> = self
            .url
            .query_pairs()
            .filter(|(k, _)| *k != key.as_str())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(key, &target.ip.to_string());
        url
    }
}

#[async_trait]
impl DnsProvider for CustomProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let url = self.request_url(target);
        debug!(host = ?self.url.host_str(), "updating through custom endpoint");
        let response = client.get(url).send().await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        if status != StatusCode::OK {
            return Err(Error::bad_status(status.as_u16(), single_line(&body)));
        }
        if self.success.is_match(&body) {
            Ok(target.ip)
        } else {
            Err(Error::unknown_response(single_line(&body)))
        }
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(CustomProvider::new(record)?))
}
