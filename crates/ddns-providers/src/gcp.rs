//! Google Cloud DNS
//!
//! A service account key signs a JWT, exchanged for an OAuth2 access token:
//!
//! ```http
//! POST https://oauth2.googleapis.com/token
//!      grant_type=urn:ietf:params:oauth:grant-type:jwt-bearer&assertion=:jwt
//!
//! GET   https://dns.googleapis.com/dns/v1/projects/:project/managedZones/:zone/rrsets/:fqdn./A
//! POST  https://dns.googleapis.com/dns/v1/projects/:project/managedZones/:zone/rrsets     (404 above)
//! PATCH https://dns.googleapis.com/dns/v1/projects/:project/managedZones/:zone/rrsets/:fqdn./A
//! Authorization: Bearer :access_token
//! ```
//!
//! The `credentials` option holds the service account JSON, as an object or
//! as a string. Nothing is written when the RRSet already holds the address.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport;
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::net::IpAddr;
use tracing::{debug, info};

use crate::common;
use crate::rsa_key::RsaKey;

pub const NAME: &str = "gcp";

const BASE_URL: &str = "https://dns.googleapis.com";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SCOPE: &str = "https://www.googleapis.com/auth/ndev.clouddns.readwrite";
const JWT_BEARER: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: i64 = 3600;
const DEFAULT_TTL: u32 = 300;

#[derive(Deserialize)]
struct ServiceAccount {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    client_email: String,
    #[serde(default)]
    private_key: String,
    token_uri: Option<String>,
}

#[derive(Deserialize)]
struct Token {
    access_token: String,
}

#[derive(Deserialize)]
struct RrSet {
    #[serde(default)]
    rrdatas: Vec<String>,
    #[serde(default)]
    ttl: Option<u32>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: GoogleError,
}

#[derive(Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<GoogleErrorItem>,
}

#[derive(Deserialize)]
struct GoogleErrorItem {
    #[serde(default)]
    reason: String,
}

pub struct GcpProvider {
    project: String,
    zone: String,
    client_email: String,
    key: RsaKey,
    token_url: Url,
    /// Absolute name with the trailing dot
    name: String,
    ttl: u32,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for GcpProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcpProvider")
            .field("project", &self.project)
            .field("zone", &self.zone)
            .field("client_email", &self.client_email)
            .field("key", &"<REDACTED>")
            .field("name", &self.name)
            .finish()
    }
}

impl GcpProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        let project = common::required(record, NAME, "project")?;
        let zone = common::required(record, NAME, "zone")?;
        let account = service_account(record)?;
        if account.kind != "service_account" {
            return Err(Error::config(format!(
                "{NAME}: credentials type {:?} is not supported, use a service account key",
                account.kind
            )));
        }
        if account.client_email.is_empty() {
            return Err(Error::config(format!("{NAME}: credentials lack client_email")));
        }

        Ok(Self {
            project,
            zone,
            key: RsaKey::parse(NAME, &account.private_key)?,
            token_url: common::base_url(account.token_uri.as_deref().unwrap_or(TOKEN_URL))?,
            client_email: account.client_email,
            name: format!("{}.", record.fqdn()),
            ttl: record.ttl.unwrap_or(DEFAULT_TTL),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Google Cloud", "https://cloud.google.com/", record),
        })
    }

    /// Point the DNS API at `base` and the token exchange at `base/token`
    pub fn with_base_url(mut self, base: Url) -> Self {
        if let Ok(token_url) = common::endpoint(&base, "/token") {
            self.token_url = token_url;
        }
        self.base = base;
        self
    }

    fn assertion(&self) -> Result<String> {
        let now = Utc::now().timestamp();
        let header = json!({"alg": "RS256", "typ": "JWT"});
        let claims = json!({
            "iss": self.client_email,
            "scope": SCOPE,
            "aud": self.token_url.as_str(),
            "iat": now,
            "exp": now + TOKEN_LIFETIME_SECS,
        });
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        );
        let signature = self.key.sign_sha256(signing_input.as_bytes())?;
        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    async fn access_token(&self, client: &reqwest::Client) -> Result<String> {
        let assertion = self.assertion()?;
        let form = [("grant_type", JWT_BEARER), ("assertion", assertion.as_str())];
        let response = client.post(self.token_url.clone()).form(&form).send().await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        match status {
            StatusCode::OK => Ok(transport::decode_json::<Token>(&body)?.access_token),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => Err(Error::auth(transport::single_line(&body))),
            s => Err(Error::bad_status(s.as_u16(), transport::single_line(&body))),
        }
    }

    fn url(&self, suffix: &str) -> Result<Url> {
        let path = format!(
            "/dns/v1/projects/{}/managedZones/{}/rrsets{suffix}",
            self.project, self.zone
        );
        let mut url = common::endpoint(&self.base, &path)?;
        url.query_pairs_mut().append_pair("alt", "json").append_pair("prettyPrint", "false");
        Ok(url)
    }
}

fn service_account(record: &RecordConfig) -> Result<ServiceAccount> {
    let parsed = match record.credentials.get("credentials") {
        Some(Value::String(raw)) if !raw.is_empty() => serde_json::from_str(raw),
        Some(value @ Value::Object(_)) => serde_json::from_value(value.clone()),
        _ => return Err(Error::config(format!("{NAME}: `credentials` is required"))),
    };
    parsed.map_err(|e| Error::config(format!("{NAME}: credentials are not a service account key: {e}")))
}

/// Read a response with a 2xx status, classifying Google error envelopes
async fn read(response: Response) -> Result<String> {
    let status = response.status();
    let body = transport::read_body(response).await?;
    if status.is_success() {
        return Ok(body);
    }
    let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => {
            let reasons: Vec<&str> = envelope.error.errors.iter().map(|e| e.reason.as_str()).collect();
            if reasons.is_empty() {
                envelope.error.message
            } else {
                format!("{} ({})", envelope.error.message, reasons.join(", "))
            }
        }
        Err(_) => transport::single_line(&body),
    };
    Err(Error::bad_status(status.as_u16(), message))
}

#[async_trait]
impl DnsProvider for GcpProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let token = self.access_token(client).await?;
        let record_type = target.record_type();
        let rrset_path = format!("/{}/{}", self.name, record_type);

        let response = client.get(self.url(&rrset_path)?).bearer_auth(&token).send().await?;
        let existing = if response.status() == StatusCode::NOT_FOUND {
            None
        } else {
            Some(transport::decode_json::<RrSet>(&read(response).await?)?)
        };

        let ttl = existing.as_ref().and_then(|set| set.ttl).unwrap_or(self.ttl);
        let payload = json!({
            "name": self.name,
            "type": record_type,
            "ttl": ttl,
            "rrdatas": [target.ip.to_string()],
        });
        match existing {
            Some(set) if set.rrdatas.iter().any(|d| transport::parse_ip(d).ok() == Some(target.ip)) => {
                debug!(name = %self.name, "Cloud DNS RRSet already up to date");
            }
            Some(_) => {
                let request = client.patch(self.url(&rrset_path)?).bearer_auth(&token).json(&payload);
                read(request.send().await?).await?;
            }
            None => {
                let request = client.post(self.url("")?).bearer_auth(&token).json(&payload);
                read(request.send().await?).await?;
                info!(name = %self.name, record_type, "created Cloud DNS RRSet");
            }
        }
        Ok(target.ip)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(GcpProvider::new(record)?))
}
