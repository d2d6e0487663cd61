//! netcup CCP DNS (JSON webservice)
//!
//! ```http
//! POST https://ccp.netcup.net/run/webservice/servers/endpoint.php?JSON
//!
//! {"action": "login", "param": {"apikey": ..., "apipassword": ..., "customernumber": ...}}
//! {"action": "infoDnsRecords", "param": {..., "apisessionid": ..., "domainname": ...}}
//! {"action": "updateDnsRecords", "param": {..., "dnsrecordset": {"dnsrecords": [...]}}}
//! {"action": "logout", "param": {...}}
//! ```
//!
//! Every answer wraps its payload as `{status, statuscode, shortmessage,
//! responsedata}`. The update answer lists the zone's records, and the
//! written one must hold the new address. Wildcard hosts are refused.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport;
use ddns_core::{Error, RecordConfig, Result};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::common;

pub const NAME: &str = "netcup";

const BASE_URL: &str = "https://ccp.netcup.net";
const ENDPOINT_PATH: &str = "/run/webservice/servers/endpoint.php";

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    status: String,
    #[serde(default)]
    statuscode: u32,
    #[serde(default)]
    shortmessage: String,
    #[serde(default)]
    responsedata: Value,
}

#[derive(Deserialize)]
struct Login {
    #[serde(default)]
    apisessionid: String,
}

#[derive(Deserialize, Serialize, Default)]
struct RecordSet {
    #[serde(default)]
    dnsrecords: Vec<NetcupRecord>,
}

#[derive(Deserialize, Serialize, Clone, Default)]
struct NetcupRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
    #[serde(default)]
    hostname: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    destination: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    priority: String,
    #[serde(default)]
    deleterecord: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    state: String,
}

pub struct NetcupProvider {
    customer_number: String,
    api_key: String,
    password: String,
    domain: String,
    host: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for NetcupProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetcupProvider")
            .field("customer_number", &self.customer_number)
            .field("api_key", &"<REDACTED>")
            .field("password", &"<REDACTED>")
            .field("domain", &self.domain)
            .field("host", &self.host)
            .finish()
    }
}

impl NetcupProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        common::reject_wildcard(record, NAME)?;
        Ok(Self {
            customer_number: common::required(record, NAME, "customer_number")?,
            api_key: common::required(record, NAME, "api_key")?,
            password: common::required(record, NAME, "password")?,
            domain: record.domain.clone(),
            host: record.owner.clone(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "netcup", "https://www.netcup.eu/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    /// Run one webservice action and decode its `responsedata`
    async fn call<T: DeserializeOwned>(&self, client: &reqwest::Client, action: &str, param: Value) -> Result<T> {
        let mut url = common::endpoint(&self.base, ENDPOINT_PATH)?;
        url.set_query(Some("JSON"));
        let response = client
            .post(url)
            .header("Accept", "application/json")
            .json(&json!({"action": action, "param": param}))
            .send()
            .await?;
        let body = transport::expect_success(response).await?;
        let envelope: Envelope = transport::decode_json(&body)?;
        if envelope.status == "error" {
            let message = format!("{action}: {} (status {})", envelope.shortmessage, envelope.statuscode);
            return Err(if action == "login" { Error::auth(message) } else { Error::unknown_response(message) });
        }
        serde_json::from_value(envelope.responsedata)
            .map_err(|e| Error::unknown_response(format!("{action}: decoding response data: {e}")))
    }

    async fn login(&self, client: &reqwest::Client) -> Result<String> {
        let login: Login = self
            .call(
                client,
                "login",
                json!({
                    "apikey": self.api_key,
                    "apipassword": self.password,
                    "customernumber": self.customer_number,
                }),
            )
            .await?;
        if login.apisessionid.is_empty() {
            return Err(Error::unknown_response("login returned an empty session"));
        }
        Ok(login.apisessionid)
    }

    fn session_param(&self, session: &str) -> Value {
        json!({
            "apikey": self.api_key,
            "apisessionid": session,
            "customernumber": self.customer_number,
            "domainname": self.domain,
        })
    }

    async fn write(&self, client: &reqwest::Client, session: &str, target: UpdateTarget) -> Result<IpAddr> {
        let record_type = target.record_type();
        let current: RecordSet = self.call(client, "infoDnsRecords", self.session_param(session)).await?;
        let mut record = current
            .dnsrecords
            .into_iter()
            .find(|r| r.hostname == self.host && r.kind == record_type)
            .unwrap_or_else(|| NetcupRecord {
                hostname: self.host.clone(),
                kind: record_type.to_string(),
                ..NetcupRecord::default()
            });
        record.destination = target.ip.to_string();

        let mut param = self.session_param(session);
        param["dnsrecordset"] = json!(RecordSet { dnsrecords: vec![record] });
        let written: RecordSet = self.call(client, "updateDnsRecords", param).await?;
        let count = written.dnsrecords.len();
        let echoed = written
            .dnsrecords
            .into_iter()
            .find(|r| r.hostname == self.host && r.kind == record_type)
            .ok_or_else(|| Error::record_not_found(format!("{} {record_type} in {count} returned records", self.host)))?;
        common::confirm(target, Some(transport::parse_ip(&echoed.destination)?))
    }
}

#[async_trait]
impl DnsProvider for NetcupProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let session = self.login(client).await?;
        let result = self.write(client, &session, target).await;

        // Sessions expire on their own; a failed logout only costs a slot.
        let param = self.session_param(&session);
        if let Err(e) = self.call::<Value>(client, "logout", param).await {
            debug!(domain = %self.domain, error = %e, "netcup logout failed");
        }
        result
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(NetcupProvider::new(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddns_core::ErrorKind;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record() -> RecordConfig {
        RecordConfig::new(NAME, "example.de")
            .with_owner("home")
            .with_credential("customer_number", "12345")
            .with_credential("api_key", "nc-key")
            .with_credential("password", "nc-pass")
    }

    fn provider(server: &MockServer) -> NetcupProvider {
        NetcupProvider::new(&record())
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap())
    }

    fn client() -> reqwest::Client {
        transport::build_client(transport::DEFAULT_TIMEOUT).unwrap()
    }

    fn target() -> UpdateTarget {
        UpdateTarget::address("203.0.113.7".parse().unwrap())
    }

    fn success(data: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "status": "success", "statuscode": 2000, "shortmessage": "ok", "responsedata": data
        }))
    }

    async fn mount_action(server: &MockServer, action: &str, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path(ENDPOINT_PATH))
            .and(query_param("JSON", ""))
            .and(body_partial_json(json!({"action": action})))
            .respond_with(response)
            .mount(server)
            .await;
    }

    #[test]
    fn wildcard_host_is_refused() {
        assert!(NetcupProvider::new(&record().with_owner("*")).is_err());
    }

    #[tokio::test]
    async fn existing_record_is_rewritten_in_one_session() {
        let server = MockServer::start().await;
        mount_action(&server, "login", success(json!({"apisessionid": "sess"}))).await;
        mount_action(
            &server,
            "infoDnsRecords",
            success(json!({"dnsrecords": [
                {"id": "7", "hostname": "home", "type": "A", "destination": "198.51.100.1",
                 "priority": "0", "deleterecord": false, "state": "yes"}
            ]})),
        )
        .await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT_PATH))
            .and(body_partial_json(json!({
                "action": "updateDnsRecords",
                "param": {"apisessionid": "sess", "domainname": "example.de",
                          "dnsrecordset": {"dnsrecords": [{"id": "7", "destination": "203.0.113.7"}]}}
            })))
            .respond_with(success(json!({"dnsrecords": [
                {"id": "7", "hostname": "home", "type": "A", "destination": "203.0.113.7"}
            ]})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"action": "logout"})))
            .respond_with(success(Value::Null))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(provider(&server).update(&client(), target()).await.unwrap(), target().ip);
    }

    #[tokio::test]
    async fn refused_login_is_an_auth_failure() {
        let server = MockServer::start().await;
        mount_action(
            &server,
            "login",
            ResponseTemplate::new(200).set_body_json(json!({
                "status": "error", "statuscode": 4013, "shortmessage": "Api key missing"
            })),
        )
        .await;

        let err = provider(&server).update(&client(), target()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(!err.to_string().contains("nc-pass"));
    }

    #[tokio::test]
    async fn mismatched_destination_is_reported() {
        let server = MockServer::start().await;
        mount_action(&server, "login", success(json!({"apisessionid": "sess"}))).await;
        mount_action(&server, "infoDnsRecords", success(json!({"dnsrecords": []}))).await;
        mount_action(
            &server,
            "updateDnsRecords",
            success(json!({"dnsrecords": [{"hostname": "home", "type": "A", "destination": "198.51.100.9"}]})),
        )
        .await;
        mount_action(&server, "logout", success(Value::Null)).await;

        let err = provider(&server).update(&client(), target()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IpMismatch);
    }
}
