//! NameSilo
//!
//! ```http
//! GET https://www.namesilo.com/api/dnsListRecords?version=1&type=json&key=:key&domain=:domain
//! GET https://www.namesilo.com/api/dnsAddRecord?...&rrtype=A&rrhost=:owner&rrvalue=:ip
//! GET https://www.namesilo.com/api/dnsUpdateRecord?...&rrid=:id&rrhost=:owner&rrvalue=:ip
//! ```
//!
//! Every answer is `{"reply": {"code": 300, "detail": "success"}}`; the
//! code comes back as a number or a string. Nothing is written when the
//! record already holds the address.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, RedactedUrl};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::net::IpAddr;
use tracing::{debug, info};

use crate::common;

pub const NAME: &str = "namesilo";

const BASE_URL: &str = "https://www.namesilo.com";
const MIN_TTL: u32 = 3600;
const MAX_TTL: u32 = 2_592_001;

#[derive(Deserialize)]
struct Envelope {
    reply: Reply,
}

#[derive(Deserialize)]
struct Reply {
    #[serde(default)]
    code: Value,
    #[serde(default)]
    detail: String,
    #[serde(default)]
    resource_record: Vec<SiloRecord>,
}

#[derive(Deserialize)]
struct SiloRecord {
    record_id: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    host: String,
    #[serde(default)]
    value: String,
}

pub struct NameSiloProvider {
    key: String,
    domain: String,
    fqdn: String,
    /// `rrhost` value, empty for the apex
    host: String,
    ttl: Option<u32>,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for NameSiloProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameSiloProvider")
            .field("key", &"<REDACTED>")
            .field("fqdn", &self.fqdn)
            .finish()
    }
}

impl NameSiloProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        let key = common::required(record, NAME, "key")?;
        common::ttl_at_least(record, NAME, MIN_TTL)?;
        if let Some(ttl) = record.ttl.filter(|ttl| *ttl > MAX_TTL) {
            return Err(Error::config(format!("{NAME}: ttl {ttl} must be at most {MAX_TTL}")));
        }

        Ok(Self {
            key,
            domain: record.domain.clone(),
            fqdn: record.fqdn(),
            host: common::owner_or_empty(record).to_string(),
            ttl: record.ttl,
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "NameSilo", "https://www.namesilo.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn request_url(&self, operation: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = common::endpoint(&self.base, &format!("/api/{operation}"))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("version", "1")
                .append_pair("type", "json")
                .append_pair("key", &self.key)
                .append_pair("domain", &self.domain);
            for (name, value) in params {
                query.append_pair(name, value);
            }
        }
        Ok(url)
    }

    async fn call(&self, client: &reqwest::Client, url: Url) -> Result<Reply> {
        debug!(url = %RedactedUrl::new(&url, &["key"]), "calling NameSilo");
        let body = transport::expect_status(client.get(url).send().await?, StatusCode::OK).await?;
        let envelope: Envelope = transport::decode_json(&body)?;
        check_code(&envelope.reply)?;
        Ok(envelope.reply)
    }
}

/// NameSilo reply codes, 300 being success
fn check_code(reply: &Reply) -> Result<()> {
    let code = match &reply.code {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| Error::unknown_response(format!("reply code {} is not an integer", reply.code)))?;

    let message = format!("{code}: {}", reply.detail);
    match code {
        300 => Ok(()),
        110 => Err(Error::auth(message)),
        112 => Err(Error::FeatureUnavailable(message)),
        113 => Err(Error::Abuse(message)),
        200 => Err(Error::zone_not_found(message)),
        201 => Err(Error::DnsServerSide(message)),
        280 => Err(Error::bad_request(message)),
        _ => Err(Error::unknown_response(message)),
    }
}

#[async_trait]
impl DnsProvider for NameSiloProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let record_type = target.record_type();
        let listing = self.call(client, self.request_url("dnsListRecords", &[])?).await?;
        let existing = listing
            .resource_record
            .iter()
            .find(|r| r.host == self.fqdn && r.kind == record_type);

        let ip = target.ip.to_string();
        let ttl = self.ttl.map(|ttl| ttl.to_string());
        let mut params = vec![("rrhost", self.host.as_str()), ("rrvalue", ip.as_str())];
        if let Some(ttl) = &ttl {
            params.push(("rrttl", ttl));
        }

        match existing {
            Some(record) if transport::parse_ip(&record.value).ok() == Some(target.ip) => {
                debug!(fqdn = %self.fqdn, "NameSilo record already up to date");
            }
            Some(record) => {
                params.push(("rrid", &record.record_id));
                self.call(client, self.request_url("dnsUpdateRecord", &params)?).await?;
            }
            None => {
                params.push(("rrtype", record_type));
                self.call(client, self.request_url("dnsAddRecord", &params)?).await?;
                info!(fqdn = %self.fqdn, record_type, "created NameSilo record");
            }
        }
        Ok(target.ip)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(NameSiloProvider::new(record)?))
}
