//! DDNSS.de
//!
//! ```http
//! GET https://www.ddnss.de/upd.php?user=:username&pwd=:password&host=:fqdn&ip=:ipv4
//! GET https://www.ddnss.de/upd.php?user=:username&pwd=:password&host=:fqdn&ip6=:ipv6
//! ```
//!
//! The answer is an HTML page carrying `Updated 1 hostname` on success or
//! one of the DynDNS-2 error tokens.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, RedactedUrl, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{StatusCode, Url};
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::common;

pub const NAME: &str = "ddnss";

const BASE_URL: &str = "https://www.ddnss.de";

pub struct DdnssProvider {
    username: String,
    password: String,
    fqdn: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for DdnssProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DdnssProvider")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("fqdn", &self.fqdn)
            .finish()
    }
}

impl DdnssProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            username: common::required(record, NAME, "username")?,
            password: common::required(record, NAME, "password")?,
            fqdn: record.fqdn(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "DDNSS.de", "https://ddnss.de/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn interpret(&self, body: &str, target: UpdateTarget) -> Result<IpAddr> {
        if body.contains("badysys") {
            Err(Error::bad_request("invalid system parameter"))
        } else if body.contains("badauth") {
            Err(Error::auth("bad authentication"))
        } else if body.contains("notfqdn") || body.contains("nohost") {
            Err(Error::hostname_not_exists(self.fqdn.clone()))
        } else if body.contains("Updated 1 hostname") {
            Ok(target.ip)
        } else {
            Err(Error::unknown_response(single_line(body)))
        }
    }
}

#[async_trait]
impl DnsProvider for DdnssProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let mut url = common::endpoint(&self.base, "/upd.php")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("user", &self.username)
                .append_pair("pwd", &self.password)
                .append_pair("host", &self.fqdn);
            if target.sends_ip() {
                let key = if target.is_ipv6() { "ip6" } else { "ip" };
                query.append_pair(key, &target.ip.to_string());
            }
        }
        debug!(url = %RedactedUrl::new(&url, &["pwd"]), "updating DDNSS host");

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
    Ok(Box::new(DdnssProvider::new(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddns_core::ErrorKind;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> DdnssProvider {
        let record = RecordConfig::new(NAME, "example.ddnss.de")
            .with_credential("username", "user")
            .with_credential("password", "pass");
        DdnssProvider::new(&record)
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap())
    }

    fn client() -> reqwest::Client {
        transport::build_client(transport::DEFAULT_TIMEOUT).unwrap()
    }

    #[tokio::test]
    async fn updated_page_is_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/upd.php"))
            .and(query_param("user", "user"))
            .and(query_param("pwd", "pass"))
            .and(query_param("host", "example.ddnss.de"))
            .and(query_param("ip", "203.0.113.7"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>Updated 1 hostname.</body></html>"))
            .expect(1)
            .mount(&server)
            .await;

        let target = UpdateTarget::address("203.0.113.7".parse().unwrap());
        assert_eq!(provider(&server).update(&client(), target).await.unwrap(), target.ip);
    }

    #[tokio::test]
    async fn badauth_is_an_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>badauth</html>"))
            .mount(&server)
            .await;

        let target = UpdateTarget::address("2001:db8::7".parse().unwrap());
        let err = provider(&server).update(&client(), target).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }
}
