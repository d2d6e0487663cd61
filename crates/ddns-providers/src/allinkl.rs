//! ALL-INKL (KAS)
//!
//! ```http
//! GET https://dyndns.kasserver.com/?host=:fqdn&myip=:ipv4
//! GET https://dyndns.kasserver.com/?host=:fqdn&myip6=:ipv6
//! Authorization: Basic :username::password
//! ```
//!
//! The answer may carry HTML around the DynDNS-2 token.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::Url;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::{common, dyndns};

pub const NAME: &str = "allinkl";

const BASE_URL: &str = "https://dyndns.kasserver.com";

pub struct AllInklProvider {
    username: String,
    password: String,
    fqdn: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for AllInklProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllInklProvider")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("fqdn", &self.fqdn)
            .finish()
    }
}

impl AllInklProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            username: common::required(record, NAME, "username")?,
            password: common::required(record, NAME, "password")?,
            fqdn: record.fqdn(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "ALL-INKL.COM", "https://all-inkl.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn url(&self, target: UpdateTarget) -> Result<Url> {
        let mut url = common::endpoint(&self.base, "/")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("host", &self.fqdn);
            if target.sends_ip() {
                let key = if target.is_ipv6() { "myip6" } else { "myip" };
                query.append_pair(key, &target.ip.to_string());
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl DnsProvider for AllInklProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let url = self.url(target)?;
        debug!(fqdn = %self.fqdn, "updating ALL-INKL host");
        let response = client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        if !status.is_success() {
            return Err(Error::bad_status(status.as_u16(), single_line(&body)));
        }
        if body.contains("good") || body.contains("nochg") {
            let echoed = dyndns::echoed_ip(&body, target)
                .ok_or_else(|| Error::unknown_response(format!("no address in {:?}", single_line(&body))))?;
            return common::confirm(target, Some(echoed));
        }
        dyndns::interpret(status, &body, target)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }

    fn supports_provider_ip(&self) -> bool {
        true
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(AllInklProvider::new(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddns_core::ErrorKind;
    use wiremock::matchers::{method, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> AllInklProvider {
        let record = RecordConfig::new(NAME, "example.com")
            .with_owner("home")
            .with_credential("username", "user")
            .with_credential("password", "pass");
        AllInklProvider::new(&record)
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap())
    }

    fn client() -> reqwest::Client {
        transport::build_client(transport::DEFAULT_TIMEOUT).unwrap()
    }

    #[tokio::test]
    async fn ipv6_goes_in_myip6() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("host", "home.example.com"))
            .and(query_param("myip6", "2001:db8::7"))
            .and(query_param_is_missing("myip"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>good 2001:db8::7</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let target = UpdateTarget::address("2001:db8::7".parse().unwrap());
        assert_eq!(provider(&server).update(&client(), target).await.unwrap(), target.ip);
    }

    #[tokio::test]
    async fn success_without_address_is_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("nochg"))
            .mount(&server)
            .await;

        let target = UpdateTarget::address("203.0.113.7".parse().unwrap());
        let err = provider(&server).update(&client(), target).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownResponse);
    }
}
