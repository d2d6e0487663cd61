//! Hetzner Cloud DNS (RRSet API)
//!
//! ```http
//! GET  https://api.hetzner.cloud/v1/zones/:zone/rrsets/:name/:type
//! POST https://api.hetzner.cloud/v1/zones/:zone/rrsets/:name/:type/actions/add_records   (404 above)
//! POST https://api.hetzner.cloud/v1/zones/:zone/rrsets/:name/:type/actions/set_records   (value differs)
//! Authorization: Bearer :token
//! ```
//!
//! Writes answer `201` with an action whose status must be `running` or
//! `success`. Registered as both `hetznercloud` and `hetznernetworking`.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::net::IpAddr;
use tracing::{debug, info};

use crate::common;

pub const NAME: &str = "hetznercloud";
pub const NETWORKING_NAME: &str = "hetznernetworking";

const BASE_URL: &str = "https://api.hetzner.cloud";

#[derive(Deserialize)]
struct RrSetEnvelope {
    rrset: RrSet,
}

#[derive(Deserialize)]
struct RrSet {
    #[serde(default)]
    records: Vec<RrValue>,
}

#[derive(Deserialize)]
struct RrValue {
    value: String,
}

#[derive(Deserialize)]
struct ActionEnvelope {
    action: Action,
}

#[derive(Deserialize)]
struct Action {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    status: String,
}

pub struct HetznerCloudProvider {
    token: String,
    zone: String,
    /// Name relative to the zone, `@` for the apex
    name: String,
    ttl: Option<u32>,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for HetznerCloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HetznerCloudProvider")
            .field("token", &"<REDACTED>")
            .field("zone", &self.zone)
            .field("name", &self.name)
            .finish()
    }
}

impl HetznerCloudProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Self::named(NAME, record)
    }

    fn named(provider: &'static str, record: &RecordConfig) -> Result<Self> {
        let token = common::required(record, provider, "token")?;
        let zone = common::required(record, provider, "zone_identifier")?;
        let name = relative_name(&record.fqdn(), &zone).unwrap_or_else(|| record.owner.clone());

        Ok(Self {
            token,
            zone,
            name,
            ttl: record.ttl,
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(provider, "Hetzner Cloud", "https://www.hetzner.com/cloud", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn rrset_url(&self, record_type: &str, action: Option<&str>) -> Result<Url> {
        let mut path = format!("/v1/zones/{}/rrsets/{}/{}", self.zone, self.name, record_type);
        if let Some(action) = action {
            path.push_str("/actions/");
            path.push_str(action);
        }
        common::endpoint(&self.base, &path)
    }

    /// Current values of the RRSet, `None` when it does not exist
    async fn lookup(&self, client: &reqwest::Client, record_type: &str) -> Result<Option<Vec<String>>> {
        let response = client
            .get(self.rrset_url(record_type, None)?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        match status {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::OK => {
                let envelope: RrSetEnvelope = transport::decode_json(&body)?;
                Ok(Some(envelope.rrset.records.into_iter().map(|r| r.value).collect()))
            }
            s => Err(Error::bad_status(s.as_u16(), single_line(&body))),
        }
    }

    async fn act(&self, client: &reqwest::Client, action: &str, target: UpdateTarget) -> Result<()> {
        let mut payload = json!({"records": [{"value": target.ip.to_string()}]});
        if let Some(ttl) = self.ttl.filter(|_| action == "add_records") {
            payload["ttl"] = json!(ttl);
        }

        let response = client
            .post(self.rrset_url(target.record_type(), Some(action))?)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        match status {
            StatusCode::CREATED => {}
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                return Err(Error::bad_request(single_line(&body)));
            }
            s => return Err(Error::bad_status(s.as_u16(), single_line(&body))),
        }

        let envelope: ActionEnvelope = transport::decode_json(&body)?;
        match envelope.action {
            Action { id: 0, .. } => Err(Error::unknown_response(format!("no action in {}", single_line(&body)))),
            Action { status, .. } if status == "running" || status == "success" => Ok(()),
            Action { status, .. } => Err(Error::unknown_response(format!("action status {status}"))),
        }
    }
}

/// Name of `fqdn` relative to `zone` when the zone is given by name
fn relative_name(fqdn: &str, zone: &str) -> Option<String> {
    let fqdn = fqdn.trim_end_matches('.').to_ascii_lowercase();
    let zone = zone.trim_end_matches('.').to_ascii_lowercase();
    if fqdn == zone {
        return Some("@".to_string());
    }
    fqdn.strip_suffix(&format!(".{zone}")).map(str::to_string)
}

#[async_trait]
impl DnsProvider for HetznerCloudProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let record_type = target.record_type();
        match self.lookup(client, record_type).await? {
            None => {
                self.act(client, "add_records", target).await?;
                info!(zone = %self.zone, name = %self.name, record_type, "created Hetzner Cloud RRSet");
            }
            Some(values) if values.iter().any(|v| transport::parse_ip(v).ok() == Some(target.ip)) => {
                debug!(zone = %self.zone, name = %self.name, "Hetzner Cloud RRSet already up to date");
            }
            Some(_) => self.act(client, "set_records", target).await?,
        }
        Ok(target.ip)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(HetznerCloudProvider::new(record)?))
}

pub fn create_networking(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(HetznerCloudProvider::named(NETWORKING_NAME, record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddns_core::ErrorKind;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(owner: &str) -> RecordConfig {
        RecordConfig::new(NAME, "example.com")
            .with_owner(owner)
            .with_credential("token", "hc-token")
            .with_credential("zone_identifier", "example.com")
    }

    fn provider(server: &MockServer, record: &RecordConfig) -> HetznerCloudProvider {
        HetznerCloudProvider::new(record)
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap())
    }

    fn client() -> reqwest::Client {
        transport::build_client(transport::DEFAULT_TIMEOUT).unwrap()
    }

    fn target() -> UpdateTarget {
        UpdateTarget::address("203.0.113.7".parse().unwrap())
    }

    #[test]
    fn names_are_relative_to_the_zone() {
        assert_eq!(relative_name("example.com", "example.com.").as_deref(), Some("@"));
        assert_eq!(relative_name("a.b.Example.com", "example.com").as_deref(), Some("a.b"));
        assert_eq!(relative_name("a.example.org", "example.com"), None);
        let by_id = record("vpn").with_credential("zone_identifier", "123456");
        assert_eq!(HetznerCloudProvider::new(&by_id).unwrap().name, "vpn");
    }

    #[tokio::test]
    async fn missing_rrset_is_added() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/zones/example.com/rrsets/@/A"))
            .and(header("authorization", "Bearer hc-token"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/zones/example.com/rrsets/@/A/actions/add_records"))
            .and(body_json(json!({"records": [{"value": "203.0.113.7"}], "ttl": 120})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "action": {"id": 7, "status": "running"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let record = record("@").with_ttl(120);
        assert_eq!(provider(&server, &record).update(&client(), target()).await.unwrap(), target().ip);
    }

    #[tokio::test]
    async fn stale_rrset_is_set() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/zones/example.com/rrsets/vpn/A"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rrset": {"id": "vpn/A", "records": [{"value": "198.51.100.1"}]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/zones/example.com/rrsets/vpn/A/actions/set_records"))
            .and(body_json(json!({"records": [{"value": "203.0.113.7"}]})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "action": {"id": 8, "status": "success"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        provider(&server, &record("vpn")).update(&client(), target()).await.unwrap();
    }

    #[tokio::test]
    async fn failed_action_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "action": {"id": 9, "status": "error"}
            })))
            .mount(&server)
            .await;

        let err = provider(&server, &record("vpn")).update(&client(), target()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownResponse);
    }

    #[tokio::test]
    async fn invalid_token_is_an_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"error":{"code":"unauthorized"}}"#))
            .mount(&server)
            .await;

        let err = provider(&server, &record("vpn")).update(&client(), target()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        let networking = create_networking(&record("vpn")).unwrap();
        assert_eq!(networking.describe().provider, NETWORKING_NAME);
    }
}
