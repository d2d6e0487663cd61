//! myaddr.tools
//!
//! ```http
//! POST https://myaddr.tools/update
//! Content-Type: application/x-www-form-urlencoded
//!
//! key=:key&ip=:ip
//! ```
//!
//! The key identifies the registered name, so domain and owner only label
//! the record locally.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{StatusCode, Url};
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::common;

pub const NAME: &str = "myaddr";

const BASE_URL: &str = "https://myaddr.tools";

pub struct MyAddrProvider {
    key: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for MyAddrProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MyAddrProvider").field("key", &"<REDACTED>").finish()
    }
}

impl MyAddrProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            key: common::required(record, NAME, "key")?,
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "myaddr", "https://myaddr.tools/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

#[async_trait]
impl DnsProvider for MyAddrProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let url = common::endpoint(&self.base, "/update")?;
        let ip = target.ip.to_string();
        debug!(ip = %ip, "updating myaddr registration");
        let response = client
            .post(url)
            .form(&[("key", self.key.as_str()), ("ip", ip.as_str())])
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::OK {
            return Ok(target.ip);
        }
        let body = transport::read_body(response).await?;
        match status {
            StatusCode::BAD_REQUEST => Err(Error::bad_request(single_line(&body))),
            StatusCode::NOT_FOUND => Err(Error::auth(format!("key is not valid: {}", single_line(&body)))),
            _ => Err(Error::bad_status(status.as_u16(), single_line(&body))),
        }
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(MyAddrProvider::new(record)?))
}
