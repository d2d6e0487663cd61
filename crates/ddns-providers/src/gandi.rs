//! Gandi LiveDNS
//!
//! ```http
//! PUT https://api.gandi.net/v5/livedns/domains/:domain/records/:owner/A
//!
//! {"rrset_values": ["203.0.113.7"], "rrset_ttl": 3600}
//! ```
//!
//! A personal access token is sent as a bearer token. The older API key
//! is sent as `Authorization: Apikey`.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde_json::json;
use std::fmt;
use std::net::IpAddr;

use crate::common;

pub const NAME: &str = "gandi";

const BASE_URL: &str = "https://api.gandi.net";
const DEFAULT_TTL: u32 = 3600;
const MIN_TTL: u32 = 300;

enum Auth {
    PersonalAccessToken(String),
    ApiKey(String),
}

pub struct GandiProvider {
    auth: Auth,
    domain: String,
    owner: String,
    ttl: u32,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for GandiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let auth = match self.auth {
            Auth::PersonalAccessToken(_) => "personal_access_token",
            Auth::ApiKey(_) => "key",
        };
        f.debug_struct("GandiProvider")
            .field("auth", &auth)
            .field("secret", &"<REDACTED>")
            .field("domain", &self.domain)
            .field("owner", &self.owner)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl GandiProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        common::ttl_at_least(record, NAME, MIN_TTL)?;
        let auth = match (record.credential("personal_access_token"), record.credential("key")) {
            (Some(token), _) => Auth::PersonalAccessToken(token.to_string()),
            (None, Some(key)) => Auth::ApiKey(key.to_string()),
            (None, None) => {
                return Err(Error::config(format!(
                    "{NAME}: set personal_access_token or key for {}",
                    record.fqdn()
                )));
            }
        };
        Ok(Self {
            auth,
            domain: record.domain.clone(),
            owner: record.owner.clone(),
            ttl: record.ttl.unwrap_or(DEFAULT_TTL),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Gandi", "https://www.gandi.net/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::PersonalAccessToken(token) => request.bearer_auth(token),
            Auth::ApiKey(key) => request.header("Authorization", format!("Apikey {key}")),
        }
    }
}

#[async_trait]
impl DnsProvider for GandiProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let path = format!(
            "/v5/livedns/domains/{}/records/{}/{}",
            self.domain,
            self.owner,
            target.record_type()
        );
        let url = common::endpoint(&self.base, &path)?;
        let payload = json!({
            "rrset_values": [target.ip.to_string()],
            "rrset_ttl": self.ttl,
        });

        let response = self.authorized(client.put(url)).json(&payload).send().await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        match status {
            StatusCode::OK | StatusCode::CREATED => Ok(target.ip),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::auth(single_line(&body))),
            StatusCode::NOT_FOUND => Err(Error::zone_not_found(single_line(&body))),
            StatusCode::BAD_REQUEST => Err(Error::bad_request(single_line(&body))),
            _ => Err(Error::bad_status(status.as_u16(), single_line(&body))),
        }
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(GandiProvider::new(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn ttl_floor_and_default() {
        let record = RecordConfig::new(NAME, "example.com").with_credential("key", "k");
        assert!(GandiProvider::new(&record.clone().with_ttl(60)).is_err());
        assert_eq!(GandiProvider::new(&record).unwrap().ttl, 3600);
    }

    #[tokio::test]
    async fn personal_access_token_is_a_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v5/livedns/domains/example.com/records/www/A"))
            .and(header("Authorization", "Bearer pat-123"))
            .and(body_json(json!({"rrset_values": ["203.0.113.7"], "rrset_ttl": 3600})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"message": "DNS Record Created"})))
            .expect(1)
            .mount(&server)
            .await;

        let record = RecordConfig::new(NAME, "example.com")
            .with_owner("www")
            .with_credential("personal_access_token", "pat-123");
        let provider = GandiProvider::new(&record)
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap());
        let client = transport::build_client(transport::DEFAULT_TIMEOUT).unwrap();
        let target = UpdateTarget::address("203.0.113.7".parse().unwrap());
        assert_eq!(provider.update(&client, target).await.unwrap(), target.ip);
    }
}
