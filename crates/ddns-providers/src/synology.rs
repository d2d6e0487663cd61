//! Synology DDNS
//!
//! ```http
//! POST https://ddns.synology.com/main.php
//! Content-Type: application/x-www-form-urlencoded
//!
//! hostname=:fqdn&auth_key=:k&api_key=:k&ipv4=:ip&mac=:mac&myds_id=:id&serial=:s&_=hostname/create
//! ```
//!
//! Only hostnames under Synology's own domains are accepted. The answer is
//! `{"code": "good"}` on success.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport;
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::fmt;
use std::net::IpAddr;

use crate::common;

pub const NAME: &str = "synology";

const BASE_URL: &str = "https://ddns.synology.com";
/// Used when no `mac_address` is configured; the service needs one
const FALLBACK_MAC: &str = "00:11:32:00:00:00";

const SUPPORTED_DOMAINS: &[&str] = &[
    "synology.me",
    "diskstation.me",
    "i234.me",
    "dcloud.biz",
    "dcloud.me",
    "dcloud.mobi",
    "dsmynas.com",
    "dsmynas.net",
    "dsmynas.org",
    "familyds.com",
    "familyds.net",
    "familyds.org",
];

#[derive(Deserialize)]
struct Answer {
    #[serde(default)]
    code: String,
}

pub struct SynologyProvider {
    myds_id: String,
    serial: String,
    mac_address: String,
    auth_key: String,
    api_key: String,
    fqdn: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for SynologyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynologyProvider")
            .field("myds_id", &self.myds_id)
            .field("serial", &"<REDACTED>")
            .field("auth_key", &"<REDACTED>")
            .field("api_key", &"<REDACTED>")
            .field("fqdn", &self.fqdn)
            .finish()
    }
}

impl SynologyProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        let domain = record.domain.to_ascii_lowercase();
        if !SUPPORTED_DOMAINS.iter().any(|suffix| domain.ends_with(suffix)) {
            return Err(Error::config(format!(
                "{NAME}: domain {} must be under one of {}",
                record.domain,
                SUPPORTED_DOMAINS.join(", ")
            )));
        }

        Ok(Self {
            myds_id: common::required(record, NAME, "myds_id")?,
            serial: common::required(record, NAME, "serial")?,
            auth_key: common::required(record, NAME, "auth_key")?,
            api_key: common::required(record, NAME, "api_key")?,
            mac_address: record
                .credential("mac_address")
                .unwrap_or(FALLBACK_MAC)
                .to_string(),
            fqdn: record.fqdn(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Synology", "https://www.synology.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

#[async_trait]
impl DnsProvider for SynologyProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let ip = target.ip.to_string();
        let family = if target.is_ipv6() { "ipv6" } else { "ipv4" };
        let form = [
            ("hostname", self.fqdn.as_str()),
            ("auth_key", &self.auth_key),
            ("api_key", &self.api_key),
            (family, &ip),
            ("mac", &self.mac_address),
            ("myds_id", &self.myds_id),
            ("serial", &self.serial),
            ("_", "hostname/create"),
        ];

        let response = client
            .post(common::endpoint(&self.base, "/main.php")?)
            .form(&form)
            .send()
            .await?;
        let body = transport::expect_status(response, StatusCode::OK).await?;
        let answer: Answer = serde_json::from_str(&body).unwrap_or(Answer { code: String::new() });

        match answer.code.as_str() {
            "good" => Ok(target.ip),
            "apikey_not_found" => Err(Error::auth("api key not found")),
            "badauth" => Err(Error::bad_request("badauth")),
            _ => Err(Error::unknown_response(transport::single_line(&body))),
        }
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(SynologyProvider::new(record)?))
}
