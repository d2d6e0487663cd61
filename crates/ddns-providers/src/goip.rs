//! GoIP
//!
//! ```http
//! GET https://www.goip.de/setip?subdomain=:fqdn&username=:username&password=:password&shortResponse=true&ip=:ipv4
//! ```
//!
//! `goip.de` and `goip.it` are public suffixes, so the configured domain is
//! `name.goip.de` or `name.goip.it`. A bare `goip.de` domain takes its
//! name from the last label of the owner. IPv6 is never detected by the
//! vendor and is always sent as `ip6`.
//!
//! A successful short answer starts with `:fqdn (:ip)`.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, RedactedUrl, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{StatusCode, Url};
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::common;

pub const NAME: &str = "goip";

const BASE_URL: &str = "https://www.goip.de";
const DOMAIN_PATTERN: &str = r"^.+\.(goip\.de|goip\.it)$";
const MAX_OWNER_LABELS: usize = 2;

pub struct GoIpProvider {
    username: String,
    password: String,
    fqdn: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for GoIpProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoIpProvider")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("fqdn", &self.fqdn)
            .finish()
    }
}

/// Split a bare `goip.de` domain into the owner and `name.goip.de`
fn normalize(domain: &str, owner: &str) -> (String, String) {
    let suffix = if domain.is_empty() { "goip.de" } else { domain };
    if suffix != "goip.de" && suffix != "goip.it" {
        return (domain.to_string(), owner.to_string());
    }
    match owner.rsplit_once('.') {
        Some((rest, name)) => (format!("{name}.{suffix}"), rest.to_string()),
        None => (format!("{owner}.{suffix}"), "@".to_string()),
    }
}

impl GoIpProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        let (domain, owner) = normalize(&record.domain, &record.owner);
        common::check_format(NAME, "domain", &domain, DOMAIN_PATTERN)?;
        if owner == "*" {
            return Err(Error::config(format!("{NAME}: wildcard owner is not supported for {domain}")));
        }
        if owner.split('.').count() > MAX_OWNER_LABELS {
            return Err(Error::config(format!("{NAME}: owner {owner:?} has too many labels")));
        }
        let fqdn = if owner == "@" { domain } else { format!("{owner}.{domain}") };
        Ok(Self {
            username: common::required(record, NAME, "username")?,
            password: common::required(record, NAME, "password")?,
            fqdn,
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "GoIP.de", "https://www.goip.de/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn url(&self, target: UpdateTarget) -> Result<Url> {
        let mut url = common::endpoint(&self.base, "/setip")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("subdomain", &self.fqdn)
                .append_pair("username", &self.username)
                .append_pair("password", &self.password)
                .append_pair("shortResponse", "true");
            if target.is_ipv6() {
                query.append_pair("ip6", &target.ip.to_string());
            } else if target.sends_ip() {
                query.append_pair("ip", &target.ip.to_string());
            }
        }
        Ok(url)
    }

    fn interpret(&self, body: &str, target: UpdateTarget) -> Result<IpAddr> {
        if body.to_ascii_lowercase().starts_with("zugriff verweigert") {
            return Err(Error::auth(single_line(body)));
        }
        let echoed = body
            .strip_prefix(self.fqdn.as_str())
            .and_then(|rest| rest.trim_start().strip_prefix('('))
            .and_then(|rest| rest.split_once(')'))
            .map(|(ip, _)| ip.trim());
        match echoed {
            Some(raw) => {
                let received = raw
                    .parse()
                    .map_err(|_| Error::malformed_received_ip(raw.to_string()))?;
                common::confirm(target, Some(received))
            }
            None => Err(Error::unknown_response(single_line(body))),
        }
    }
}

#[async_trait]
impl DnsProvider for GoIpProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        if target.is_ipv6() && target.ip.is_unspecified() {
            return Err(Error::bad_request("an IPv6 address is required"));
        }
        let url = self.url(target)?;
        debug!(url = %RedactedUrl::new(&url, &["password"]), "updating GoIP subdomain");
        let response = client.get(url).send().await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        if status != StatusCode::OK {
            return Err(Error::bad_status(status.as_u16(), single_line(&body)));
        }
        self.interpret(&body, target)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }

    fn supports_provider_ip(&self) -> bool {
        true
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(GoIpProvider::new(record)?))
}
