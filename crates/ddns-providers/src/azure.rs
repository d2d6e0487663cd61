//! Azure DNS (Resource Manager REST API)
//!
//! ```http
//! POST https://login.microsoftonline.com/:tenant/oauth2/v2.0/token
//!      grant_type=client_credentials&client_id=..&client_secret=..&scope=https://management.azure.com/.default
//!
//! GET https://management.azure.com/subscriptions/:sub/resourceGroups/:group/providers/
//!     Microsoft.Network/dnsZones/:zone/A/:owner?api-version=2018-05-01
//! PUT (same URL)    If-Match: :etag when the record set exists
//! Authorization: Bearer :access_token
//! ```
//!
//! A missing record set is created. An existing one keeps its properties
//! and has every address of the family replaced.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::net::IpAddr;
use tracing::{debug, info};

use crate::common;

pub const NAME: &str = "azure";

const LOGIN_URL: &str = "https://login.microsoftonline.com";
const MANAGEMENT_URL: &str = "https://management.azure.com";
const SCOPE: &str = "https://management.azure.com/.default";
const API_VERSION: &str = "2018-05-01";
const DEFAULT_TTL: u32 = 3600;

#[derive(Deserialize)]
struct Token {
    access_token: String,
}

#[derive(Deserialize)]
struct RecordSet {
    #[serde(default)]
    etag: Option<String>,
    #[serde(default)]
    properties: Value,
}

pub struct AzureProvider {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    subscription_id: String,
    resource_group: String,
    zone: String,
    owner: String,
    ttl: u32,
    login: Url,
    management: Url,
    description: ProviderDescription,
}

impl fmt::Debug for AzureProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureProvider")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<REDACTED>")
            .field("subscription_id", &self.subscription_id)
            .field("resource_group", &self.resource_group)
            .field("zone", &self.zone)
            .field("owner", &self.owner)
            .finish()
    }
}

impl AzureProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            tenant_id: common::required(record, NAME, "tenant_id")?,
            client_id: common::required(record, NAME, "client_id")?,
            client_secret: common::required(record, NAME, "client_secret")?,
            subscription_id: common::required(record, NAME, "subscription_id")?,
            resource_group: common::required(record, NAME, "resource_group_name")?,
            zone: record.domain.clone(),
            owner: record.owner.clone(),
            ttl: record.ttl.unwrap_or(DEFAULT_TTL),
            login: common::base_url(LOGIN_URL)?,
            management: common::base_url(MANAGEMENT_URL)?,
            description: ProviderDescription::new(
                NAME,
                "Azure",
                "https://azure.microsoft.com/en-us/services/dns/",
                record,
            ),
        })
    }

    /// Point both the login and management endpoints at `base`
    pub fn with_base_url(mut self, base: Url) -> Self {
        self.login = base.clone();
        self.management = base;
        self
    }

    async fn access_token(&self, client: &reqwest::Client) -> Result<String> {
        let url = common::endpoint(&self.login, &format!("/{}/oauth2/v2.0/token", self.tenant_id))?;
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", SCOPE),
        ];
        let response = client.post(url).form(&form).send().await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            return Err(Error::auth(single_line(&body)));
        }
        if status != StatusCode::OK {
            return Err(Error::bad_status(status.as_u16(), single_line(&body)));
        }
        let token: Token = transport::decode_json(&body)?;
        Ok(token.access_token)
    }

    fn record_set_url(&self, record_type: &str) -> Result<Url> {
        let path = format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/dnsZones/{}/{}/{}",
            self.subscription_id, self.resource_group, self.zone, record_type, self.owner
        );
        let mut url = common::endpoint(&self.management, &path)?;
        url.query_pairs_mut().append_pair("api-version", API_VERSION);
        Ok(url)
    }
}

/// Set every address of the family in `properties` to `target`
fn rewrite_addresses(properties: &mut Value, target: UpdateTarget) {
    let (list, field) = if target.is_ipv6() {
        ("AAAARecords", "ipv6Address")
    } else {
        ("ARecords", "ipv4Address")
    };
    if !properties.is_object() {
        *properties = json!({});
    }
    let records = &mut properties[list];
    match records.as_array_mut() {
        Some(entries) if !entries.is_empty() => {
            for entry in entries {
                entry[field] = json!(target.ip.to_string());
            }
        }
        _ => *records = json!([{ field: target.ip.to_string() }]),
    }
}

#[async_trait]
impl DnsProvider for AzureProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let token = self.access_token(client).await?;
        let url = self.record_set_url(target.record_type())?;

        let response = client.get(url.clone()).bearer_auth(&token).send().await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        let (etag, mut properties) = match status {
            StatusCode::OK => {
                let set: RecordSet = transport::decode_json(&body)?;
                (set.etag, set.properties)
            }
            StatusCode::NOT_FOUND => (None, json!({"TTL": self.ttl})),
            s => return Err(Error::bad_status(s.as_u16(), single_line(&body))),
        };

        rewrite_addresses(&mut properties, target);
        let mut request = client.put(url).bearer_auth(&token).json(&json!({"properties": properties}));
        if let Some(etag) = &etag {
            request = request.header("If-Match", etag);
        }
        transport::expect_success(request.send().await?).await?;

        if etag.is_none() {
            info!(zone = %self.zone, owner = %self.owner, "created Azure record set");
        } else {
            debug!(zone = %self.zone, owner = %self.owner, "updated Azure record set");
        }
        Ok(target.ip)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(AzureProvider::new(record)?))
}
