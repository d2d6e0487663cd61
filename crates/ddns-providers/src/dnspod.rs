//! DNSPod
//!
//! Form-encoded POSTs against the legacy API, authenticated with a
//! `login_token` field (`id,token`):
//!
//! ```http
//! POST https://dnsapi.cn/Record.List   domain, sub_domain, record_type
//! POST https://dnsapi.cn/Record.Ddns   record_id, record_line, value
//! ```
//!
//! Every answer carries `status.code`, `"1"` on success.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport;
use ddns_core::{Error, RecordConfig, Result};
use reqwest::Url;
use serde::Deserialize;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::common;

pub const NAME: &str = "dnspod";

const BASE_URL: &str = "https://dnsapi.cn";

#[derive(Deserialize)]
struct Status {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct ListResponse {
    status: Status,
    #[serde(default)]
    records: Vec<PodRecord>,
}

#[derive(Deserialize)]
struct PodRecord {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: String,
    value: String,
    line: String,
}

#[derive(Deserialize)]
struct DdnsResponse {
    status: Status,
    record: Option<DdnsRecord>,
}

#[derive(Deserialize)]
struct DdnsRecord {
    value: String,
}

fn check_status(status: &Status) -> Result<()> {
    let message = format!("{}: {}", status.code, status.message);
    match status.code.as_str() {
        "1" => Ok(()),
        "-1" | "-7" | "-8" => Err(Error::auth(message)),
        "6" | "-15" => Err(Error::zone_not_found(message)),
        "10" => Err(Error::record_not_found(message)),
        _ => Err(Error::unknown_response(message)),
    }
}

pub struct DnsPodProvider {
    token: String,
    domain: String,
    owner: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for DnsPodProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsPodProvider")
            .field("token", &"<REDACTED>")
            .field("domain", &self.domain)
            .field("owner", &self.owner)
            .finish()
    }
}

impl DnsPodProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            token: common::required(record, NAME, "token")?,
            domain: record.domain.clone(),
            owner: record.owner.clone(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "DNSPod", "https://www.dnspod.cn/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        client: &reqwest::Client,
        action: &str,
        fields: &[(&str, &str)],
    ) -> Result<T> {
        let url = common::endpoint(&self.base, &format!("/{action}"))?;
        let mut form = vec![
            ("login_token", self.token.as_str()),
            ("format", "json"),
            ("domain", self.domain.as_str()),
        ];
        form.extend_from_slice(fields);
        debug!(action, domain = %self.domain, "calling DNSPod");

        let response = client
            .post(url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await?;
        let body = transport::expect_success(response).await?;
        transport::decode_json(&body)
    }
}

#[async_trait]
impl DnsProvider for DnsPodProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let record_type = target.record_type();
        let listing: ListResponse = self
            .post(
                client,
                "Record.List",
                &[("length", "200"), ("sub_domain", self.owner.as_str()), ("record_type", record_type)],
            )
            .await?;
        check_status(&listing.status)?;

        let record = listing
            .records
            .into_iter()
            .find(|r| r.name == self.owner && r.kind == record_type)
            .ok_or_else(|| {
                Error::record_not_found(format!("no {record_type} record {} in {}", self.owner, self.domain))
            })?;

        let value = target.ip.to_string();
        if record.value == value {
            return Ok(target.ip);
        }

        let updated: DdnsResponse = self
            .post(
                client,
                "Record.Ddns",
                &[
                    ("record_id", record.id.as_str()),
                    ("value", value.as_str()),
                    ("record_line", record.line.as_str()),
                    ("sub_domain", self.owner.as_str()),
                ],
            )
            .await?;
        check_status(&updated.status)?;

        let echoed = match updated.record {
            Some(record) => Some(transport::parse_ip(&record.value)?),
            None => None,
        };
        common::confirm(target, echoed)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(DnsPodProvider::new(record)?))
}
