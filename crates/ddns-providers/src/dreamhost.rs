//! DreamHost
//!
//! The API has no update command, so a changed address is written as a new
//! record and the stale one removed afterwards:
//!
//! ```http
//! GET https://api.dreamhost.com/?key=:key&unique_id=:uuid&format=json&cmd=dns-list_records
//! GET ...&cmd=dns-add_record&record=:fqdn&type=A&value=:ip
//! GET ...&cmd=dns-remove_record&record=:fqdn&type=A&value=:old
//! ```
//!
//! Answers are `{"result": "success" | "error", "data": ...}`.

use async_trait::async_trait;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, RedactedUrl};
use ddns_core::{Error, RecordConfig, Result};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::net::IpAddr;
use tracing::{debug, info};

use crate::common;

pub const NAME: &str = "dreamhost";

const BASE_URL: &str = "https://api.dreamhost.com";
const KEY_PATTERN: &str = r"^[a-zA-Z0-9]{16}$";

#[derive(Deserialize)]
struct Answer {
    result: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct ListedRecord {
    #[serde(default)]
    editable: String,
    #[serde(rename = "type")]
    kind: String,
    record: String,
    value: String,
}

pub struct DreamHostProvider {
    key: String,
    fqdn: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for DreamHostProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DreamHostProvider")
            .field("key", &"<REDACTED>")
            .field("fqdn", &self.fqdn)
            .finish()
    }
}

impl DreamHostProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        let key = common::required(record, NAME, "key")?;
        common::check_format(NAME, "key", &key, KEY_PATTERN)?;
        Ok(Self {
            key,
            fqdn: record.fqdn(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "DreamHost", "https://www.dreamhost.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    async fn command(&self, client: &reqwest::Client, cmd: &str, extra: &[(&str, &str)]) -> Result<Value> {
        let mut url = common::endpoint(&self.base, "/")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("key", &self.key)
                .append_pair("unique_id", &uuid::Uuid::new_v4().to_string())
                .append_pair("format", "json")
                .append_pair("cmd", cmd);
            for (key, value) in extra {
                query.append_pair(key, value);
            }
        }
        debug!(url = %RedactedUrl::new(&url, &["key"]), "calling DreamHost");

        let body = transport::expect_success(client.get(url).send().await?).await?;
        let answer: Answer = transport::decode_json(&body)?;
        if answer.result == "success" {
            return Ok(answer.data);
        }

        let detail = answer.data.as_str().unwrap_or_default().to_string();
        Err(match detail.as_str() {
            "invalid_api_key" | "key_has_expired" => Error::auth(detail),
            "no_such_zone" | "no_such_domain" => Error::zone_not_found(detail),
            "record_already_exists_not_editable" | "record_is_not_editable" => {
                Error::bad_request(detail)
            }
            _ => Error::unknown_response(format!("{}: {detail}", answer.result)),
        })
    }
}

#[async_trait]
impl DnsProvider for DreamHostProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let record_type = target.record_type();
        let data = self.command(client, "dns-list_records", &[]).await?;
        let records: Vec<ListedRecord> = serde_json::from_value(data)
            .map_err(|e| Error::unknown_response(format!("decoding record list: {e}")))?;

        let existing = records
            .into_iter()
            .find(|r| r.kind == record_type && r.record == self.fqdn);
        let mut stale = None;
        if let Some(record) = existing {
            if record.editable == "0" {
                return Err(Error::bad_request(format!("record {} is not editable", self.fqdn)));
            }
            match record.value.parse::<IpAddr>() {
                Ok(old) if old == target.ip => return Ok(target.ip),
                Ok(old) => stale = Some(old),
                Err(_) => {}
            }
        }

        let value = target.ip.to_string();
        let fields = [("record", self.fqdn.as_str()), ("type", record_type), ("value", value.as_str())];
        self.command(client, "dns-add_record", &fields).await?;

        if let Some(old) = stale {
            let old = old.to_string();
            let fields = [("record", self.fqdn.as_str()), ("type", record_type), ("value", old.as_str())];
            self.command(client, "dns-remove_record", &fields).await?;
            info!(fqdn = %self.fqdn, removed = %old, "replaced DreamHost record");
        }
        Ok(target.ip)
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(DreamHostProvider::new(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddns_core::ErrorKind;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "6SHU5P2HLDAYECUM";

    fn provider(server: &MockServer) -> DreamHostProvider {
        let record = RecordConfig::new(NAME, "example.com")
            .with_owner("home")
            .with_credential("key", KEY);
        DreamHostProvider::new(&record)
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap())
    }

    fn client() -> reqwest::Client {
        transport::build_client(transport::DEFAULT_TIMEOUT).unwrap()
    }

    fn listing(value: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "result": "success",
            "data": [{"editable": "1", "type": "A", "record": "home.example.com", "value": value, "zone": "example.com"}]
        }))
    }

    #[tokio::test]
    async fn new_record_is_added_before_the_old_is_removed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("cmd", "dns-list_records"))
            .and(query_param("key", KEY))
            .respond_with(listing("198.51.100.1"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("cmd", "dns-add_record"))
            .and(query_param("value", "203.0.113.7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "success", "data": "record_added"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("cmd", "dns-remove_record"))
            .and(query_param("value", "198.51.100.1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "success", "data": "record_removed"})))
            .expect(1)
            .mount(&server)
            .await;

        let target = UpdateTarget::address("203.0.113.7".parse().unwrap());
        provider(&server).update(&client(), target).await.unwrap();

        let commands: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter_map(|r| r.url.query_pairs().find(|(k, _)| k == "cmd").map(|(_, v)| v.into_owned()))
            .collect();
        assert_eq!(commands, ["dns-list_records", "dns-add_record", "dns-remove_record"]);
    }

    #[tokio::test]
    async fn current_record_is_left_alone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("cmd", "dns-list_records"))
            .respond_with(listing("203.0.113.7"))
            .expect(1)
            .mount(&server)
            .await;

        let target = UpdateTarget::address("203.0.113.7".parse().unwrap());
        provider(&server).update(&client(), target).await.unwrap();
    }

    #[tokio::test]
    async fn invalid_key_is_an_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "error", "data": "invalid_api_key"})))
            .mount(&server)
            .await;

        let target = UpdateTarget::address("203.0.113.7".parse().unwrap());
        let err = provider(&server).update(&client(), target).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }
}
