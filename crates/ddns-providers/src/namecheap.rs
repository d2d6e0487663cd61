//! Namecheap
//!
//! ```http
//! GET https://dynamicdns.park-your-domain.com/update?host=:owner&domain=:domain&password=:password&ip=:ip
//! Accept: application/xml
//! ```
//!
//! The answer is a small XML document:
//!
//! ```xml
//! <interface-response>
//!   <IP>203.0.113.7</IP>
//!   <ErrCount>1</ErrCount>
//!   <errors><Err1>Passwords do not match</Err1></errors>
//! </interface-response>
//! ```
//!
//! Only IPv4 is supported. The password is the 32 character hex DDNS
//! password of the domain.

use async_trait::async_trait;
use ddns_core::config::IpVersion;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, RedactedUrl, single_line};
use ddns_core::{Error, RecordConfig, Result};
use regex::Regex;
use reqwest::header::ACCEPT;
use reqwest::{StatusCode, Url};
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::common;

pub const NAME: &str = "namecheap";

const BASE_URL: &str = "https://dynamicdns.park-your-domain.com";
const PASSWORD_PATTERN: &str = r"^[a-f0-9]{32}$";

pub struct NamecheapProvider {
    owner: String,
    domain: String,
    password: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for NamecheapProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamecheapProvider")
            .field("owner", &self.owner)
            .field("domain", &self.domain)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

impl NamecheapProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        if record.ip_version == IpVersion::V6 {
            return Err(Error::config(format!("{NAME}: IPv6 is not supported for {}", record.fqdn())));
        }
        let password = common::required(record, NAME, "password")?;
        common::check_format(NAME, "password", &password, PASSWORD_PATTERN)?;
        Ok(Self {
            owner: record.owner.clone(),
            domain: record.domain.clone(),
            password,
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Namecheap", "https://www.namecheap.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }
}

/// Text of the first `<tag>` element in `xml`
fn element<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let pattern = format!(r"(?s)<{tag}>(.*?)</{tag}>");
    let regex = Regex::new(&pattern).ok()?;
    regex
        .captures(xml)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

fn interpret(body: &str, target: UpdateTarget) -> Result<IpAddr> {
    if let Some(message) = element(body, "Err1").filter(|m| !m.is_empty()) {
        let lower = message.to_ascii_lowercase();
        if lower.contains("password") {
            return Err(Error::auth(message.to_string()));
        }
        return Err(Error::bad_request(message.to_string()));
    }
    match element(body, "IP").filter(|ip| !ip.is_empty()) {
        None => Ok(target.ip),
        Some(raw) => {
            let received = raw
                .parse()
                .map_err(|_| Error::malformed_received_ip(raw.to_string()))?;
            common::confirm(target, Some(received))
        }
    }
}

#[async_trait]
impl DnsProvider for NamecheapProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        if target.is_ipv6() {
            return Err(Error::FeatureUnavailable("IPv6 is not supported".to_string()));
        }
        let mut url = common::endpoint(&self.base, "/update")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("host", &self.owner)
                .append_pair("domain", &self.domain)
                .append_pair("password", &self.password);
            if target.sends_ip() {
                query.append_pair("ip", &target.ip.to_string());
            }
        }
        debug!(url = %RedactedUrl::new(&url, &["password"]), "updating Namecheap host");

        let response = client
            .get(url)
            .header(ACCEPT, "application/xml")
            .send()
            .await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        if status != StatusCode::OK {
            return Err(Error::bad_status(status.as_u16(), single_line(&body)));
        }
        interpret(&body, target)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }

    fn supports_provider_ip(&self) -> bool {
        true
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(NamecheapProvider::new(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddns_core::ErrorKind;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PASSWORD: &str = "0123456789abcdef0123456789abcdef";

    fn record() -> RecordConfig {
        RecordConfig::new(NAME, "example.com")
            .with_owner("home")
            .with_credential("password", PASSWORD)
    }

    fn target() -> UpdateTarget {
        UpdateTarget::address("203.0.113.7".parse().unwrap())
    }

    #[test]
    fn password_must_be_hex() {
        let record = record().with_credential("password", "not-hex");
        assert!(NamecheapProvider::new(&record).is_err());
    }

    #[test]
    fn ipv6_records_are_rejected() {
        let record = record().with_ip_version(IpVersion::V6);
        assert!(NamecheapProvider::new(&record).is_err());
    }

    #[test]
    fn xml_answers() {
        let ok = "<interface-response><IP>203.0.113.7</IP><ErrCount>0</ErrCount><errors /></interface-response>";
        assert_eq!(interpret(ok, target()).unwrap(), target().ip);

        let no_ip = "<interface-response><ErrCount>0</ErrCount></interface-response>";
        assert_eq!(interpret(no_ip, target()).unwrap(), target().ip);

        let mismatch = "<interface-response><IP>198.51.100.1</IP></interface-response>";
        assert_eq!(interpret(mismatch, target()).unwrap_err().kind(), ErrorKind::IpMismatch);

        let bad = "<interface-response><ErrCount>1</ErrCount><errors><Err1>Passwords do not match</Err1></errors></interface-response>";
        assert_eq!(interpret(bad, target()).unwrap_err().kind(), ErrorKind::Auth);

        let malformed = "<interface-response><IP>not-an-ip</IP></interface-response>";
        assert_eq!(interpret(malformed, target()).unwrap_err().kind(), ErrorKind::MalformedReceivedIp);
    }

    #[tokio::test]
    async fn update_sends_owner_and_domain_separately() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/update"))
            .and(query_param("host", "home"))
            .and(query_param("domain", "example.com"))
            .and(query_param("password", PASSWORD))
            .and(query_param("ip", "203.0.113.7"))
            .and(header("Accept", "application/xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<?xml version=\"1.0\" encoding=\"utf-16\"?><interface-response><IP>203.0.113.7</IP><ErrCount>0</ErrCount></interface-response>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let provider = NamecheapProvider::new(&record())
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap());
        let client = transport::build_client(transport::DEFAULT_TIMEOUT).unwrap();
        assert_eq!(provider.update(&client, target()).await.unwrap(), target().ip);
    }
}
