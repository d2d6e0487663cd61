//! OVH
//!
//! Two modes, picked with the `mode` credential:
//!
//! - `dynamic` (default): DynHost, a DynDNS-2 endpoint with basic auth
//!   (`username`, `password`).
//!
//!   ```http
//!   GET https://www.ovh.com/nic/update?system=dyndns&hostname=<fqdn>&myip=<ip>
//!   ```
//!
//! - `api`: the signed zone API (`app_key`, `app_secret`, `consumer_key`,
//!   optional `api_endpoint`, a short name such as `ovh-eu` or a URL).
//!
//!   ```http
//!   GET  {api}/domain/zone/:domain/record?fieldType=A&subDomain=www
//!   POST {api}/domain/zone/:domain/record        (no record yet)
//!   PUT  {api}/domain/zone/:domain/record/:id    (every match)
//!   POST {api}/domain/zone/:domain/refresh
//!   ```
//!
//! API requests carry `X-Ovh-Timestamp` and
//! `X-Ovh-Signature = "$1$" + sha1_hex(secret+consumer+METHOD+url+body+timestamp)`.
//! OVH rejects timestamps too far from its own clock, so the offset to
//! `GET {api}/auth/time` is measured once and applied to every signature.

use async_trait::async_trait;
use chrono::Utc;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{Method, Response, Url};
use serde::Deserialize;
use serde_json::json;
use sha1::{Digest, Sha1};
use std::fmt;
use std::net::IpAddr;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::{common, dyndns};

pub const NAME: &str = "ovh";

const DYNHOST_BASE_URL: &str = "https://www.ovh.com";
const DEFAULT_API_ENDPOINT: &str = "ovh-eu";

/// Resolve an endpoint short name to its base URL
fn api_endpoint(name: &str) -> &str {
    match name {
        "ovh-eu" => "https://eu.api.ovh.com/1.0",
        "ovh-ca" => "https://ca.api.ovh.com/1.0",
        "ovh-us" => "https://api.us.ovhcloud.com/1.0",
        "kimsufi-eu" => "https://eu.api.kimsufi.com/1.0",
        "kimsufi-ca" => "https://ca.api.kimsufi.com/1.0",
        "soyoustart-eu" => "https://eu.api.soyoustart.com/1.0",
        "soyoustart-ca" => "https://ca.api.soyoustart.com/1.0",
        url => url,
    }
}

/// `X-Ovh-Signature` of one request
pub fn signature(
    app_secret: &str,
    consumer_key: &str,
    method: &str,
    url: &str,
    body: &str,
    timestamp: i64,
) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("{app_secret}+{consumer_key}+{method}+{url}+{body}+{timestamp}"));
    format!("$1${}", hex::encode(hasher.finalize()))
}

struct Api {
    endpoint: String,
    app_key: String,
    app_secret: String,
    consumer_key: String,
    /// Server clock minus local clock, in seconds
    clock_offset: OnceCell<i64>,
}

enum Mode {
    DynHost { username: String, password: String, base: Url },
    Api(Api),
}

/// OVH DNS provider
pub struct OvhProvider {
    mode: Mode,
    domain: String,
    fqdn: String,
    sub_domain: String,
    ttl: Option<u32>,
    description: ProviderDescription,
}

impl fmt::Debug for OvhProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("OvhProvider");
        match &self.mode {
            Mode::DynHost { username, .. } => s
                .field("mode", &"dynamic")
                .field("username", username)
                .field("password", &"<REDACTED>"),
            Mode::Api(api) => s
                .field("mode", &"api")
                .field("endpoint", &api.endpoint)
                .field("app_key", &"<REDACTED>")
                .field("app_secret", &"<REDACTED>")
                .field("consumer_key", &"<REDACTED>"),
        };
        s.field("fqdn", &self.fqdn).finish()
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default, alias = "Message")]
    message: String,
}

impl OvhProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        let mode = match record.credential("mode").unwrap_or("dynamic") {
            "dynamic" => Mode::DynHost {
                username: common::required(record, NAME, "username")?,
                password: common::required(record, NAME, "password")?,
                base: common::base_url(DYNHOST_BASE_URL)?,
            },
            "api" => {
                let endpoint =
                    api_endpoint(record.credential("api_endpoint").unwrap_or(DEFAULT_API_ENDPOINT));
                common::base_url(endpoint)?;
                Mode::Api(Api {
                    endpoint: endpoint.trim_end_matches('/').to_string(),
                    app_key: common::required(record, NAME, "app_key")?,
                    app_secret: common::required(record, NAME, "app_secret")?,
                    consumer_key: common::required(record, NAME, "consumer_key")?,
                    clock_offset: OnceCell::new(),
                })
            }
            other => {
                return Err(Error::config(format!(
                    "{NAME}: mode {other:?} is not one of dynamic, api"
                )));
            }
        };

        Ok(Self {
            mode,
            domain: record.domain.clone(),
            fqdn: record.fqdn(),
            sub_domain: common::owner_or_empty(record).to_string(),
            ttl: record.ttl,
            description: ProviderDescription::new(NAME, "OVH", "https://www.ovh.com/", record),
        })
    }

    /// Point the DynHost endpoint elsewhere; API mode takes `api_endpoint`
    pub fn with_base_url(mut self, url: Url) -> Self {
        if let Mode::DynHost { base, .. } = &mut self.mode {
            *base = url;
        }
        self
    }

    async fn update_dynhost(
        &self,
        client: &reqwest::Client,
        username: &str,
        password: &str,
        base: &Url,
        target: UpdateTarget,
    ) -> Result<IpAddr> {
        let mut url = common::endpoint(base, "/nic/update")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("system", "dyndns");
            query.append_pair("hostname", &self.fqdn);
            if target.sends_ip() {
                query.append_pair("myip", &target.ip.to_string());
            }
        }
        debug!(%url, "updating OVH DynHost record");

        let request = client.get(url).basic_auth(username, Some(password));
        dyndns::send(request, target).await
    }

    async fn update_api(&self, client: &reqwest::Client, api: &Api, target: UpdateTarget) -> Result<IpAddr> {
        let zone = format!("/domain/zone/{}", self.domain);
        let record_type = target.record_type();

        let mut lookup = api.url(&format!("{zone}/record"))?;
        lookup
            .query_pairs_mut()
            .append_pair("fieldType", record_type)
            .append_pair("subDomain", &self.sub_domain);
        let ids: Vec<u64> = api.call(client, Method::GET, lookup, None).await?;

        if ids.is_empty() {
            info!(fqdn = %self.fqdn, record_type, "creating OVH record");
            let mut body = json!({
                "fieldType": record_type,
                "subDomain": self.sub_domain,
                "target": target.ip.to_string(),
            });
            if let Some(ttl) = self.ttl {
                body["ttl"] = json!(ttl);
            }
            let url = api.url(&format!("{zone}/record"))?;
            api.call::<serde_json::Value>(client, Method::POST, url, Some(body)).await?;
        } else {
            for id in ids {
                let url = api.url(&format!("{zone}/record/{id}"))?;
                let body = json!({ "target": target.ip.to_string() });
                api.call::<serde_json::Value>(client, Method::PUT, url, Some(body)).await?;
            }
        }

        let refresh = api.url(&format!("{zone}/refresh"))?;
        api.call::<serde_json::Value>(client, Method::POST, refresh, None).await?;

        Ok(target.ip)
    }
}

impl Api {
    fn url(&self, path: &str) -> Result<Url> {
        common::base_url(&format!("{}{}", self.endpoint, path))
    }

    /// Local time shifted onto the OVH clock
    async fn timestamp(&self, client: &reqwest::Client) -> Result<i64> {
        let offset = self
            .clock_offset
            .get_or_try_init(|| async {
                let url = self.url("/auth/time")?;
                let body = transport::expect_success(client.get(url).send().await?).await?;
                let server: i64 = body.trim().parse().map_err(|_| {
                    Error::unknown_response(format!("auth/time answered {:?}", single_line(&body)))
                })?;
                let offset = server - Utc::now().timestamp();
                debug!(offset, "measured OVH clock offset");
                Ok::<i64, Error>(offset)
            })
            .await?;
        Ok(Utc::now().timestamp() + offset)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        client: &reqwest::Client,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let body = match body {
            Some(value) => serde_json::to_string(&value)?,
            None => String::new(),
        };
        let timestamp = self.timestamp(client).await?;
        let signed = signature(
            &self.app_secret,
            &self.consumer_key,
            method.as_str(),
            url.as_str(),
            &body,
            timestamp,
        );

        let response = client
            .request(method, url)
            .header("Content-Type", "application/json;charset=utf-8")
            .header("X-Ovh-Application", &self.app_key)
            .header("X-Ovh-Consumer", &self.consumer_key)
            .header("X-Ovh-Timestamp", timestamp.to_string())
            .header("X-Ovh-Signature", signed)
            .body(body)
            .send()
            .await?;

        read_response(response).await
    }
}

async fn read_response<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let query_id = response
        .headers()
        .get("X-Ovh-Queryid")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = transport::read_body(response).await?;

    if status.is_success() {
        // refresh answers with an empty body
        let body = if body.trim().is_empty() { "null" } else { body.as_str() };
        return transport::decode_json(body);
    }

    let message = match serde_json::from_str::<ApiError>(&body) {
        Ok(e) if !e.message.is_empty() => format!("{} (query id {query_id})", e.message),
        _ => single_line(&body),
    };
    Err(match status.as_u16() {
        400 => Error::bad_request(message),
        401 | 403 => Error::auth(message),
        404 => Error::zone_not_found(message),
        s => Error::bad_status(s, message),
    })
}

#[async_trait]
impl DnsProvider for OvhProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        match &self.mode {
            Mode::DynHost { username, password, base } => {
                self.update_dynhost(client, username, password, base, target).await
            }
            Mode::Api(api) => self.update_api(client, api, target).await,
        }
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }

    fn supports_provider_ip(&self) -> bool {
        matches!(self.mode, Mode::DynHost { .. })
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(OvhProvider::new(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddns_core::ErrorKind;
    use wiremock::matchers::{basic_auth, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> reqwest::Client {
        transport::build_client(transport::DEFAULT_TIMEOUT).unwrap()
    }

    fn api_record(endpoint: &str) -> RecordConfig {
        RecordConfig::new(NAME, "example.com")
            .with_owner("www")
            .with_credential("mode", "api")
            .with_credential("api_endpoint", endpoint)
            .with_credential("app_key", "AK")
            .with_credential("app_secret", "AS")
            .with_credential("consumer_key", "CK")
    }

    #[test]
    fn endpoint_short_names() {
        assert_eq!(api_endpoint("ovh-eu"), "https://eu.api.ovh.com/1.0");
        assert_eq!(api_endpoint("ovh-us"), "https://api.us.ovhcloud.com/1.0");
        assert_eq!(api_endpoint("https://example.net/1.0"), "https://example.net/1.0");
    }

    #[test]
    fn signature_is_sha1_hex_with_prefix() {
        let signed = signature("AS", "CK", "GET", "https://eu.api.ovh.com/1.0/auth/time", "", 1_700_000_000);
        assert!(signed.starts_with("$1$"));
        assert_eq!(signed.len(), 3 + 40);
        assert_ne!(
            signed,
            signature("AS", "CK", "GET", "https://eu.api.ovh.com/1.0/auth/time", "", 1_700_000_001)
        );
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let record = RecordConfig::new(NAME, "example.com").with_credential("mode", "carrier");
        assert!(OvhProvider::new(&record).is_err());
    }

    #[test]
    fn debug_hides_api_secrets() {
        let provider = OvhProvider::new(&api_record("ovh-eu")).unwrap();
        let shown = format!("{provider:?}");
        assert!(!shown.contains("\"AS\""));
        assert!(!shown.contains("\"CK\""));
    }

    #[tokio::test]
    async fn signatures_use_the_server_clock() {
        let server = MockServer::start().await;
        let server_time = Utc::now().timestamp() - 300;

        Mock::given(method("GET"))
            .and(path("/1.0/auth/time"))
            .respond_with(ResponseTemplate::new(200).set_body_string(server_time.to_string()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/1.0/domain/zone/example.com/record"))
            .and(query_param("fieldType", "A"))
            .and(query_param("subDomain", "www"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/1.0/domain/zone/example.com/record"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"id\": 1}"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/1.0/domain/zone/example.com/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = format!("{}/1.0", server.uri());
        let provider = OvhProvider::new(&api_record(&endpoint)).unwrap();
        let target = UpdateTarget::address("203.0.113.7".parse().unwrap());
        assert_eq!(provider.update(&client(), target).await.unwrap(), target.ip);

        let requests = server.received_requests().await.unwrap();
        let signed: Vec<_> = requests
            .iter()
            .filter(|r| r.headers.get("x-ovh-signature").is_some())
            .collect();
        assert_eq!(signed.len(), 3);

        for request in signed {
            let timestamp: i64 = request.headers["x-ovh-timestamp"]
                .to_str()
                .unwrap()
                .parse()
                .unwrap();
            assert!((timestamp - server_time).abs() <= 5, "timestamp {timestamp} follows the server clock");

            // the mock server does not see our host, rebuild the URL we signed
            let mut signed_url = format!("{}{}", server.uri(), request.url.path());
            if let Some(query) = request.url.query() {
                signed_url = format!("{signed_url}?{query}");
            }
            let body = String::from_utf8(request.body.clone()).unwrap();
            let expected = signature("AS", "CK", request.method.as_str(), &signed_url, &body, timestamp);
            assert_eq!(request.headers["x-ovh-signature"].to_str().unwrap(), expected);
            assert_eq!(request.headers["x-ovh-application"].to_str().unwrap(), "AK");
        }
    }

    #[tokio::test]
    async fn rejected_credentials_are_an_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1.0/auth/time"))
            .respond_with(ResponseTemplate::new(200).set_body_string(Utc::now().timestamp().to_string()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/1.0/domain/zone/example.com/record"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("X-Ovh-Queryid", "EU.ext-1.abc")
                    .set_body_string("{\"message\": \"Invalid signature\"}"),
            )
            .mount(&server)
            .await;

        let provider = OvhProvider::new(&api_record(&format!("{}/1.0", server.uri()))).unwrap();
        let err = provider
            .update(&client(), UpdateTarget::address("203.0.113.7".parse().unwrap()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(err.to_string().contains("EU.ext-1.abc"));
    }

    #[tokio::test]
    async fn dynhost_mode_speaks_dyndns() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nic/update"))
            .and(query_param("system", "dyndns"))
            .and(query_param("hostname", "www.example.com"))
            .and(query_param("myip", "203.0.113.7"))
            .and(basic_auth("user", "pass"))
            .respond_with(ResponseTemplate::new(200).set_body_string("good 203.0.113.7"))
            .expect(1)
            .mount(&server)
            .await;

        let record = RecordConfig::new(NAME, "example.com")
            .with_owner("www")
            .with_credential("username", "user")
            .with_credential("password", "pass");
        let provider = OvhProvider::new(&record)
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap());
        let target = UpdateTarget::address("203.0.113.7".parse().unwrap());
        assert_eq!(provider.update(&client(), target).await.unwrap(), target.ip);
    }
}
