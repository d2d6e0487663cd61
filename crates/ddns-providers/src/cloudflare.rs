//! Cloudflare DNS
//!
//! REST API v4, zone-scoped. The zone identifier comes from the record's
//! credentials, so no zone lookup is needed.
//!
//! ## Authentication
//!
//! One of, in order of preference:
//! - `token`: API token, sent as a bearer token
//! - `user_service_key`: origin CA key, `X-Auth-User-Service-Key`
//! - `email` and `key`: global API key, `X-Auth-Email` and `X-Auth-Key`
//!
//! ## API Calls
//!
//! ```http
//! GET  /client/v4/zones/:zone/dns_records?type=A&name=www.example.com
//! POST /client/v4/zones/:zone/dns_records           (no record yet)
//! PUT  /client/v4/zones/:zone/dns_records/:record   (content differs)
//! ```
//!
//! Every answer is the `{success, errors, result}` envelope. The written
//! record is echoed in `result` and its `content` is checked against the
//! address sent.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{RequestBuilder, Response, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::net::IpAddr;
use tracing::{debug, info};

use crate::common;

pub const NAME: &str = "cloudflare";

const BASE_URL: &str = "https://api.cloudflare.com";

/// Automatic TTL
const AUTO_TTL: u32 = 1;
const MIN_TTL: u32 = 60;

enum Auth {
    Token(String),
    UserServiceKey(String),
    GlobalKey { email: String, key: String },
}

impl Auth {
    fn from_record(record: &RecordConfig) -> Result<Self> {
        if let Some(token) = record.credential("token") {
            return Ok(Auth::Token(token.to_string()));
        }
        if let Some(key) = record.credential("user_service_key") {
            common::check_format(NAME, "user_service_key", key, r"^v1\.0.+$")?;
            return Ok(Auth::UserServiceKey(key.to_string()));
        }
        match (record.credential("email"), record.credential("key")) {
            (Some(email), Some(key)) => {
                common::check_format(NAME, "email", email, r"^[^@\s]+@[^@\s]+\.[^@\s]+$")?;
                common::check_format(NAME, "key", key, r"^[a-zA-Z0-9]+$")?;
                Ok(Auth::GlobalKey {
                    email: email.to_string(),
                    key: key.to_string(),
                })
            }
            _ => Err(Error::config(format!(
                "{NAME}: set token, user_service_key or email and key for {}",
                record.fqdn()
            ))),
        }
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Auth::Token(token) => request.bearer_auth(token),
            Auth::UserServiceKey(key) => request.header("X-Auth-User-Service-Key", key),
            Auth::GlobalKey { email, key } => request
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", key),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Auth::Token(_) => "token",
            Auth::UserServiceKey(_) => "user service key",
            Auth::GlobalKey { .. } => "global key",
        }
    }
}

/// Cloudflare DNS provider
pub struct CloudflareProvider {
    auth: Auth,
    zone_id: String,
    name: String,
    ttl: u32,
    proxied: bool,
    base: Url,
    description: ProviderDescription,
}

// Custom Debug implementation that hides the credentials
impl fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("auth", &self.auth.kind())
            .field("credentials", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .field("proxied", &self.proxied)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
    content: Option<String>,
}

impl DnsRecord {
    fn stored_ip(&self) -> Option<IpAddr> {
        self.content.as_deref().and_then(|c| transport::parse_ip(c).ok())
    }
}

impl CloudflareProvider {
    /// Create a provider for one record
    ///
    /// # Parameters
    ///
    /// - `record`: Must carry `zone_identifier` and one of the credential sets
    ///
    /// # Returns
    ///
    /// - `Ok(CloudflareProvider)`: Credentials are well formed
    /// - `Err(Error::Config)`: Missing zone, credentials, or a TTL below 60
    pub fn new(record: &RecordConfig) -> Result<Self> {
        let auth = Auth::from_record(record)?;
        let zone_id = common::required(record, NAME, "zone_identifier")?;
        let ttl = record.ttl.unwrap_or(AUTO_TTL);
        if ttl != AUTO_TTL {
            common::ttl_at_least(record, NAME, MIN_TTL)?;
        }

        Ok(Self {
            auth,
            zone_id,
            name: record.fqdn(),
            ttl,
            proxied: record.proxied,
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Cloudflare", "https://www.cloudflare.com", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn records_url(&self) -> Result<Url> {
        common::endpoint(&self.base, &format!("/client/v4/zones/{}/dns_records", self.zone_id))
    }

    /// Existing record of the target type, if any
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?type=A&name=www.example.com
    /// ```
    async fn lookup(&self, client: &reqwest::Client, record_type: &str) -> Result<Option<DnsRecord>> {
        let request = client
            .get(self.records_url()?)
            .query(&[("type", record_type), ("name", self.name.as_str())]);
        let response = self.auth.apply(request).send().await?;
        let mut records: Vec<DnsRecord> = read_envelope(response).await?;

        match records.len() {
            0 => Ok(None),
            1 => Ok(records.pop()),
            n => Err(Error::result_count(format!(
                "{n} {record_type} records named {} instead of 1",
                self.name
            ))),
        }
    }

    fn payload(&self, target: UpdateTarget) -> serde_json::Value {
        json!({
            "type": target.record_type(),
            "name": self.name,
            "content": target.ip.to_string(),
            "proxied": self.proxied,
            "ttl": self.ttl,
        })
    }

    async fn create(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<DnsRecord> {
        let request = client.post(self.records_url()?).json(&self.payload(target));
        let response = self.auth.apply(request).send().await?;
        read_envelope(response).await
    }

    async fn replace(&self, client: &reqwest::Client, id: &str, target: UpdateTarget) -> Result<DnsRecord> {
        let url = common::endpoint(
            &self.base,
            &format!("/client/v4/zones/{}/dns_records/{}", self.zone_id, id),
        )?;
        let request = client.put(url).json(&self.payload(target));
        let response = self.auth.apply(request).send().await?;
        read_envelope(response).await
    }
}

/// Decode the `{success, errors, result}` envelope
async fn read_envelope<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = transport::read_body(response).await?;

    let envelope: Envelope<T> = match serde_json::from_str(&body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(Error::bad_status(status.as_u16(), single_line(&body)));
        }
        Err(e) => {
            return Err(Error::unknown_response(format!("decoding JSON: {e}: {}", single_line(&body))));
        }
    };

    if !envelope.success || !status.is_success() {
        let message = envelope
            .errors
            .iter()
            .map(|e| format!("{} ({})", e.message, e.code))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(match status.as_u16() {
            400 => Error::bad_request(message),
            401 | 403 => Error::auth(message),
            _ if envelope.errors.iter().any(|e| e.code == 10000) => Error::auth(message),
            s if s >= 400 => Error::bad_status(s, message),
            _ => Error::unknown_response(format!("success is false: {message}")),
        });
    }

    envelope
        .result
        .ok_or_else(|| Error::unknown_response(format!("no result in {}", single_line(&body))))
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let record_type = target.record_type();

        let written = match self.lookup(client, record_type).await? {
            Some(existing) if existing.stored_ip() == Some(target.ip) => {
                debug!(name = %self.name, ip = %target.ip, "Cloudflare record already up to date");
                return Ok(target.ip);
            }
            Some(existing) => {
                debug!(name = %self.name, was = existing.content.as_deref().unwrap_or(""), "replacing Cloudflare record");
                self.replace(client, &existing.id, target).await?
            }
            None => {
                info!(name = %self.name, record_type, "creating Cloudflare record");
                self.create(client, target).await?
            }
        };

        let echoed = match written.content.as_deref() {
            Some(content) if !content.is_empty() => Some(transport::parse_ip(content)?),
            _ => None,
        };
        common::confirm(target, echoed)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(CloudflareProvider::new(record)?))
}
