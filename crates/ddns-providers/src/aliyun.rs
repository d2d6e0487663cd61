//! Alibaba Cloud DNS
//!
//! RPC-style API where every call is a signed GET:
//!
//! ```http
//! GET https://alidns.aliyuncs.com/?Action=DescribeDomainRecords&...&Signature=...
//! ```
//!
//! The signature is HMAC-SHA1, keyed with `access_secret&`, over
//! `GET&%2F&` followed by the percent-encoded canonical query (parameters
//! sorted by name, RFC 3986 encoding).

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use hmac::{Hmac, Mac};
use reqwest::Url;
use serde::Deserialize;
use sha1::Sha1;
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use tracing::{debug, info};

use crate::common;

pub const NAME: &str = "aliyun";

const BASE_URL: &str = "https://alidns.aliyuncs.com";
const API_VERSION: &str = "2015-01-09";

/// Percent-encode per RFC 3986, leaving only unreserved characters
pub fn percent_encode(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", percent_encode(key), percent_encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// String signed for a GET with `params`
pub fn string_to_sign(params: &BTreeMap<String, String>) -> String {
    format!("GET&%2F&{}", percent_encode(&canonical_query(params)))
}

/// Base64 HMAC-SHA1 signature of `params`
pub fn sign(access_secret: &str, params: &BTreeMap<String, String>) -> String {
    let key = format!("{access_secret}&");
    let mut mac = match Hmac::<Sha1>::new_from_slice(key.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC takes keys of any size"),
    };
    mac.update(string_to_sign(params).as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(rename = "Code", default)]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

#[derive(Deserialize)]
struct DescribeResponse {
    #[serde(rename = "DomainRecords")]
    domain_records: DomainRecords,
}

#[derive(Deserialize)]
struct DomainRecords {
    #[serde(rename = "Record", default)]
    record: Vec<DomainRecord>,
}

#[derive(Deserialize)]
struct DomainRecord {
    #[serde(rename = "RecordId")]
    record_id: String,
    #[serde(rename = "RR")]
    rr: String,
    #[serde(rename = "Value")]
    value: String,
}

pub struct AliyunProvider {
    access_key_id: String,
    access_secret: String,
    domain: String,
    owner: String,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for AliyunProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AliyunProvider")
            .field("access_key_id", &self.access_key_id)
            .field("access_secret", &"<REDACTED>")
            .field("domain", &self.domain)
            .field("owner", &self.owner)
            .finish()
    }
}

impl AliyunProvider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        Ok(Self {
            access_key_id: common::required(record, NAME, "access_key_id")?,
            access_secret: common::required(record, NAME, "access_secret")?,
            domain: record.domain.clone(),
            owner: record.owner.clone(),
            base: common::base_url(BASE_URL)?,
            description: ProviderDescription::new(NAME, "Aliyun", "https://www.aliyun.com/", record),
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn common_params(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("AccessKeyId".to_string(), self.access_key_id.clone());
        params.insert("Format".to_string(), "JSON".to_string());
        params.insert("Version".to_string(), API_VERSION.to_string());
        params.insert("SignatureMethod".to_string(), "HMAC-SHA1".to_string());
        params.insert(
            "Timestamp".to_string(),
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        );
        params.insert("SignatureVersion".to_string(), "1.0".to_string());
        params.insert("SignatureNonce".to_string(), uuid::Uuid::new_v4().to_string());
        params
    }

    /// Sign and send one action, decoding its JSON answer
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        client: &reqwest::Client,
        action: &str,
        extra: &[(&str, &str)],
    ) -> Result<T> {
        let mut params = self.common_params();
        params.insert("Action".to_string(), action.to_string());
        for (key, value) in extra {
            params.insert((*key).to_string(), (*value).to_string());
        }
        let signature = sign(&self.access_secret, &params);
        params.insert("Signature".to_string(), signature);

        let mut url = common::endpoint(&self.base, "/")?;
        url.set_query(Some(&canonical_query(&params)));
        debug!(action, domain = %self.domain, "calling Aliyun DNS");

        let response = client.get(url).send().await?;
        let status = response.status();
        let body = transport::read_body(response).await?;
        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &body));
        }
        transport::decode_json(&body)
    }
}

fn classify_error(status: u16, body: &str) -> Error {
    let Ok(error) = serde_json::from_str::<ApiError>(body) else {
        return Error::bad_status(status, single_line(body));
    };
    let message = format!("{}: {}", error.code, error.message);
    if error.code.starts_with("InvalidAccessKeyId") || error.code == "SignatureDoesNotMatch" {
        Error::auth(message)
    } else if error.code == "InvalidDomainName.NoExist" {
        Error::zone_not_found(message)
    } else {
        Error::bad_status(status, message)
    }
}

#[async_trait]
impl DnsProvider for AliyunProvider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let record_type = target.record_type();
        let value = target.ip.to_string();

        let found: DescribeResponse = self
            .call(
                client,
                "DescribeDomainRecords",
                &[("DomainName", self.domain.as_str()), ("RRKeyWord", self.owner.as_str()), ("Type", record_type)],
            )
            .await?;
        // RRKeyWord is a substring search
        let matching: Vec<DomainRecord> = found
            .domain_records
            .record
            .into_iter()
            .filter(|record| record.rr == self.owner)
            .collect();

        match matching.as_slice() {
            [] => {
                let _: serde_json::Value = self
                    .call(
                        client,
                        "AddDomainRecord",
                        &[
                            ("DomainName", self.domain.as_str()),
                            ("RR", self.owner.as_str()),
                            ("Type", record_type),
                            ("Value", value.as_str()),
                        ],
                    )
                    .await?;
                info!(domain = %self.domain, owner = %self.owner, "created Aliyun record");
                Ok(target.ip)
            }
            [existing] if existing.value == value => Ok(target.ip),
            [existing] => {
                let _: serde_json::Value = self
                    .call(
                        client,
                        "UpdateDomainRecord",
                        &[
                            ("RecordId", existing.record_id.as_str()),
                            ("RR", self.owner.as_str()),
                            ("Type", record_type),
                            ("Value", value.as_str()),
                        ],
                    )
                    .await?;
                Ok(target.ip)
            }
            many => Err(Error::result_count(format!(
                "{} {record_type} records found for {} of {} instead of 1",
                many.len(),
                self.owner,
                self.domain
            ))),
        }
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(AliyunProvider::new(record)?))
}
