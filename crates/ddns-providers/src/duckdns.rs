//! DuckDNS
//!
//! ```http
//! GET https://www.duckdns.org/update?verbose=true&domains=<label>&token=<token>&ip=<ip>
//! ```
//!
//! The token travels in the query string. The verbose body is `OK` or `KO`
//! on the first line, followed by the IPv4 and IPv6 addresses now set.
//! Without an address DuckDNS uses the source address of the request.
//!
//! The older form with domain `duckdns.org` (or empty) and the label as the
//! last owner label, `home.example` under `duckdns.org`, is also accepted.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, RedactedUrl, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::Url;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::common;
use crate::dyndns::echoed_ip;

pub const NAME: &str = "duckdns";

const BASE_URL: &str = "https://www.duckdns.org";
const ETLD: &str = "duckdns.org";
const SUFFIX: &str = ".duckdns.org";
const TOKEN_PATTERN: &str =
    r"^[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}$";

pub struct DuckDnsProvider {
    /// Label under duckdns.org, `example` for `example.duckdns.org`
    label: String,
    token: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for DuckDnsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuckDnsProvider")
            .field("label", &self.label)
            .field("token", &"<REDACTED>")
            .finish()
    }
}

impl DuckDnsProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        common::reject_wildcard(record, NAME)?;

        let label = label_of(record)
            .ok_or_else(|| {
                Error::config(format!(
                    "{NAME}: domain {} must be a single label under duckdns.org",
                    record.domain
                ))
            })?
            .to_string();

        let token = common::required(record, NAME, "token")?;
        common::check_format(NAME, "token", &token, TOKEN_PATTERN)?;

        Ok(Self {
            label,
            token,
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "DuckDNS", "https://www.duckdns.org/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn update_url(&self, target: UpdateTarget) -> Result<Url> {
        let mut url = common::endpoint(&self.base, "/update")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("verbose", "true");
            query.append_pair("domains", &self.label);
            query.append_pair("token", &self.token);
            if target.sends_ip() {
                let key = if target.is_ipv6() { "ipv6" } else { "ip" };
                query.append_pair(key, &target.ip.to_string());
            }
        }
        Ok(url)
    }
}

/// Label under duckdns.org, folding the last owner label for bare `duckdns.org`
fn label_of(record: &RecordConfig) -> Option<&str> {
    if record.domain.is_empty() || record.domain == ETLD {
        return record
            .owner
            .rsplit('.')
            .next()
            .filter(|label| !label.is_empty() && *label != "@" && *label != "*");
    }
    record
        .domain
        .strip_suffix(SUFFIX)
        .filter(|label| !label.is_empty() && !label.contains('.'))
}

#[async_trait]
impl DnsProvider for DuckDnsProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let url = self.update_url(target)?;
        debug!(url = %RedactedUrl::new(&url, &["token"]), "updating DuckDNS record");

        let body = transport::expect_success(client.get(url).send().await?).await?;
        let line = single_line(&body);

        if line.starts_with("KO") {
            return Err(Error::auth(line));
        }
        if !line.starts_with("OK") {
            return Err(Error::unknown_response(line));
        }

        match echoed_ip(&body, target) {
            Some(ip) => common::confirm(target, Some(ip)),
            None if target.provider_supplied => Ok(target.ip),
            None => Err(Error::malformed_received_ip(format!("no address in {line:?}"))),
        }
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }

    fn supports_provider_ip(&self) -> bool {
        true
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(DuckDnsProvider::new(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddns_core::ErrorKind;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee";

    fn record() -> RecordConfig {
        RecordConfig::new(NAME, "example.duckdns.org").with_credential("token", TOKEN)
    }

    async fn provider(server: &MockServer) -> DuckDnsProvider {
        DuckDnsProvider::new(&record())
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap())
    }

    fn client() -> reqwest::Client {
        transport::build_client(transport::DEFAULT_TIMEOUT).unwrap()
    }

    fn ip(raw: &str) -> IpAddr {
        raw.parse().unwrap()
    }

    #[test]
    fn update_url_has_the_documented_shape() {
        let provider = DuckDnsProvider::new(&record()).unwrap();
        let url = provider
            .update_url(UpdateTarget::address(ip("203.0.113.7")))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.duckdns.org/update?verbose=true&domains=example&token=aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee&ip=203.0.113.7"
        );
    }

    #[test]
    fn construction_checks_domain_and_token() {
        assert!(DuckDnsProvider::new(&RecordConfig::new(NAME, "example.com").with_credential("token", TOKEN)).is_err());
        assert!(DuckDnsProvider::new(&RecordConfig::new(NAME, "example.duckdns.org").with_credential("token", "nope")).is_err());
        assert!(DuckDnsProvider::new(&record().with_owner("*")).is_err());
        assert!(DuckDnsProvider::new(&record().with_owner("www")).is_ok());
    }

    #[test]
    fn bare_duckdns_domain_takes_the_label_from_the_owner() {
        let bare = |owner: &str| {
            RecordConfig::new(NAME, "duckdns.org")
                .with_owner(owner)
                .with_credential("token", TOKEN)
        };
        assert_eq!(DuckDnsProvider::new(&bare("example")).unwrap().label, "example");
        assert_eq!(DuckDnsProvider::new(&bare("www.example")).unwrap().label, "example");
        assert!(DuckDnsProvider::new(&bare("@")).is_err());
    }

    #[test]
    fn debug_hides_the_token() {
        let shown = format!("{:?}", DuckDnsProvider::new(&record()).unwrap());
        assert!(!shown.contains(TOKEN));
        assert!(shown.contains("<REDACTED>"));
    }

    #[tokio::test]
    async fn ok_body_confirms_the_sent_address() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/update"))
            .and(query_param("verbose", "true"))
            .and(query_param("domains", "example"))
            .and(query_param("token", TOKEN))
            .and(query_param("ip", "203.0.113.7"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK\n203.0.113.7\n\nUPDATED"))
            .expect(1)
            .mount(&server)
            .await;

        let confirmed = provider(&server)
            .await
            .update(&client(), UpdateTarget::address(ip("203.0.113.7")))
            .await
            .unwrap();
        assert_eq!(confirmed, ip("203.0.113.7"));
    }

    #[tokio::test]
    async fn ko_body_is_an_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/update"))
            .respond_with(ResponseTemplate::new(200).set_body_string("KO"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .await
            .update(&client(), UpdateTarget::address(ip("203.0.113.7")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }

    #[tokio::test]
    async fn different_echo_is_a_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/update"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK\n203.0.113.8\n"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .await
            .update(&client(), UpdateTarget::address(ip("203.0.113.7")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IpMismatch);
    }

    #[tokio::test]
    async fn provider_supplied_omits_the_address() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/update"))
            .and(query_param_is_missing("ip"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK\n198.51.100.4\n"))
            .expect(1)
            .mount(&server)
            .await;

        let confirmed = provider(&server)
            .await
            .update(&client(), UpdateTarget::provider_supplied(ip("0.0.0.0")))
            .await
            .unwrap();
        assert_eq!(confirmed, ip("198.51.100.4"));
    }
}
