//! Amazon Route 53
//!
//! A single `UPSERT` change batch, signed with AWS Signature Version 4.
//!
//! ```http
//! POST https://route53.amazonaws.com/2013-04-01/hostedzone/:zone_id/rrset
//! Content-Type: application/xml
//! X-Amz-Date: 20240101T000000Z
//! Authorization: AWS4-HMAC-SHA256 Credential=..., SignedHeaders=..., Signature=...
//! ```
//!
//! Route 53 is a global service signed for `us-east-1` unless a region is
//! configured (see the `aws` adapter). Errors come back
//! as an `<ErrorResponse>` document carrying a code and a message.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ddns_core::traits::{DnsProvider, ProviderDescription, UpdateTarget};
use ddns_core::transport::{self, single_line};
use ddns_core::{Error, RecordConfig, Result};
use hmac::{Hmac, Mac};
use regex::Regex;
use reqwest::Url;
use sha2::{Digest, Sha256};
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::common;

pub const NAME: &str = "route53";

const BASE_URL: &str = "https://route53.amazonaws.com";
const REGION: &str = "us-east-1";
const SERVICE: &str = "route53";
const DEFAULT_TTL: u32 = 300;
const SIGNED_HEADERS: &str = "content-type;host;x-amz-date";

type HmacSha256 = Hmac<Sha256>;

fn hmac_sha256(key: &[u8], data: &str) -> Vec<u8> {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC takes keys of any size"),
    };
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Derive the SigV4 signing key for one day, region and service
pub fn signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date);
    let k_region = hmac_sha256(&k_date, region);
    let k_service = hmac_sha256(&k_region, service);
    hmac_sha256(&k_service, "aws4_request")
}

/// SigV4 signer for the Route 53 API
pub struct Signer {
    access_key: String,
    secret_key: String,
    region: String,
}

impl Signer {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: REGION.to_string(),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Canonical request over the headers this adapter sends
    pub fn canonical_request(method: &str, path: &str, host: &str, amz_date: &str, payload: &[u8]) -> String {
        format!(
            "{method}\n{path}\n\ncontent-type:application/xml\nhost:{host}\nx-amz-date:{amz_date}\n\n{SIGNED_HEADERS}\n{}",
            sha256_hex(payload)
        )
    }

    /// `Authorization` header value for a request made at `now`
    pub fn authorization(&self, method: &str, path: &str, host: &str, payload: &[u8], now: DateTime<Utc>) -> String {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{date}/{}/{SERVICE}/aws4_request", self.region);

        let canonical = Self::canonical_request(method, path, host, &amz_date, payload);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            sha256_hex(canonical.as_bytes())
        );
        let key = signing_key(&self.secret_key, &date, &self.region, SERVICE);
        let signature = hex::encode(hmac_sha256(&key, &string_to_sign));

        format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
            self.access_key
        )
    }
}

/// Route 53 DNS provider
pub struct Route53Provider {
    signer: Signer,
    zone_id: String,
    fqdn: String,
    ttl: u32,
    base: Url,
    description: ProviderDescription,
}

impl fmt::Debug for Route53Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route53Provider")
            .field("access_key", &self.signer.access_key)
            .field("region", &self.signer.region)
            .field("secret_key", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("fqdn", &self.fqdn)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl Route53Provider {
    pub fn new(record: &RecordConfig) -> Result<Self> {
        let access_key = common::required(record, NAME, "access_key")?;
        let secret_key = common::required(record, NAME, "secret_key")?;
        let zone_id = common::required(record, NAME, "zone_id")?;
        Self::from_parts(
            Signer::new(access_key, secret_key),
            &zone_id,
            record,
            ProviderDescription::new(NAME, "Amazon Route 53", "https://aws.amazon.com/route53/", record),
        )
    }

    /// Build from credentials already read under another provider's keys
    pub(crate) fn from_parts(
        signer: Signer,
        zone_id: &str,
        record: &RecordConfig,
        description: ProviderDescription,
    ) -> Result<Self> {
        Ok(Self {
            signer,
            zone_id: zone_id.trim_start_matches("/hostedzone/").to_string(),
            fqdn: record.fqdn(),
            ttl: record.ttl.unwrap_or(DEFAULT_TTL),
            base: common::base_url(BASE_URL)?,
            description,
        })
    }

    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base = base;
        self
    }

    fn change_batch(&self, target: UpdateTarget) -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<ChangeResourceRecordSetsRequest xmlns="https://route53.amazonaws.com/doc/2013-04-01/">"#,
                "<ChangeBatch><Changes><Change><Action>UPSERT</Action><ResourceRecordSet>",
                "<Name>{name}</Name><Type>{kind}</Type><TTL>{ttl}</TTL>",
                "<ResourceRecords><ResourceRecord><Value>{ip}</Value></ResourceRecord></ResourceRecords>",
                "</ResourceRecordSet></Change></Changes></ChangeBatch></ChangeResourceRecordSetsRequest>"
            ),
            name = self.fqdn,
            kind = target.record_type(),
            ttl = self.ttl,
            ip = target.ip,
        )
    }
}

/// Pull `<tag>value</tag>` out of an XML error document
fn xml_field(body: &str, tag: &str) -> Option<String> {
    let regex = Regex::new(&format!("<{tag}>([^<]*)</{tag}>")).ok()?;
    regex.captures(body).map(|c| c[1].to_string())
}

fn classify_error(status: u16, body: &str) -> Error {
    let code = xml_field(body, "Code").unwrap_or_default();
    let message = match xml_field(body, "Message") {
        Some(message) => format!("{code}: {message}"),
        None => single_line(body),
    };
    match code.as_str() {
        "SignatureDoesNotMatch" | "InvalidClientTokenId" | "AccessDenied" | "IncompleteSignature" => {
            Error::auth(message)
        }
        "NoSuchHostedZone" => Error::zone_not_found(message),
        "InvalidChangeBatch" | "InvalidInput" => Error::bad_request(message),
        "Throttling" | "PriorRequestNotComplete" => Error::RateLimited(message),
        _ => Error::bad_status(status, message),
    }
}

#[async_trait]
impl DnsProvider for Route53Provider {
    async fn update(&self, client: &reqwest::Client, target: UpdateTarget) -> Result<IpAddr> {
        let path = format!("/2013-04-01/hostedzone/{}/rrset", self.zone_id);
        let url = common::endpoint(&self.base, &path)?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(Error::config(format!("{NAME}: base URL has no host"))),
        };

        let payload = self.change_batch(target);
        let now = Utc::now();
        let authorization = self.signer.authorization("POST", &path, &host, payload.as_bytes(), now);
        debug!(fqdn = %self.fqdn, zone_id = %self.zone_id, "upserting Route 53 record set");

        let response = client
            .post(url)
            .header("Content-Type", "application/xml")
            .header("Accept", "application/xml")
            .header("X-Amz-Date", now.format("%Y%m%dT%H%M%SZ").to_string())
            .header("Authorization", authorization)
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        let body = transport::read_body(response).await?;
        if status.is_success() {
            return Ok(target.ip);
        }
        Err(classify_error(status.as_u16(), &body))
    }

    fn describe(&self) -> ProviderDescription {
        self.description.clone()
    }
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(Route53Provider::new(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddns_core::ErrorKind;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record() -> RecordConfig {
        RecordConfig::new(NAME, "example.com")
            .with_owner("test")
            .with_credential("access_key", "AKIDEXAMPLE")
            .with_credential("secret_key", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
            .with_credential("zone_id", "Z123456789")
    }

    #[test]
    fn signing_key_matches_the_published_derivation() {
        let key = signing_key("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY", "20120215", "us-east-1", "iam");
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn canonical_request_lists_the_signed_headers() {
        let canonical = Signer::canonical_request(
            "POST",
            "/2013-04-01/hostedzone/Z1/rrset",
            "route53.amazonaws.com",
            "20240101T000000Z",
            b"",
        );
        assert_eq!(
            canonical,
            "POST\n/2013-04-01/hostedzone/Z1/rrset\n\n\
             content-type:application/xml\nhost:route53.amazonaws.com\nx-amz-date:20240101T000000Z\n\n\
             content-type;host;x-amz-date\n\
             e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn authorization_names_the_credential_scope() {
        let signer = Signer::new("AKIDEXAMPLE", "secret");
        let now = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let header = signer.authorization("POST", "/", "route53.amazonaws.com", b"", now);
        assert!(header.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240101/us-east-1/route53/aws4_request, \
             SignedHeaders=content-type;host;x-amz-date, Signature="
        ));
        assert_eq!(header.rsplit('=').next().unwrap().len(), 64);
    }

    #[test]
    fn debug_hides_the_secret_key() {
        let shown = format!("{:?}", Route53Provider::new(&record()).unwrap());
        assert!(!shown.contains("wJalrXUtnFEMI"));
    }

    #[tokio::test]
    async fn upsert_is_signed_and_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2013-04-01/hostedzone/Z123456789/rrset"))
            .and(header("content-type", "application/xml"))
            .and(body_string_contains("<Name>test.example.com</Name><Type>A</Type><TTL>300</TTL>"))
            .and(body_string_contains("<Value>203.0.113.7</Value>"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<ChangeResourceRecordSetsResponse/>"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = Route53Provider::new(&record())
            .unwrap()
            .with_base_url(Url::parse(&server.uri()).unwrap());
        let target = UpdateTarget::address("203.0.113.7".parse().unwrap());
        let client = transport::build_client(transport::DEFAULT_TIMEOUT).unwrap();
        assert_eq!(provider.update(&client, target).await.unwrap(), target.ip);

        let requests = server.received_requests().await.unwrap();
        let authorization = requests[0].headers.get("authorization").unwrap().to_str().unwrap();
        assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
        assert!(authorization.contains("/us-east-1/route53/aws4_request, SignedHeaders=content-type;host;x-amz-date, Signature="));
        assert!(requests[0].headers.contains_key("x-amz-date"));
    }

    #[test]
    fn error_documents_are_classified() {
        let body = "<ErrorResponse><Error><Type>Sender</Type><Code>SignatureDoesNotMatch</Code>\
                    <Message>bad signature</Message></Error><RequestId>r1</RequestId></ErrorResponse>";
        let err = classify_error(403, body);
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(err.to_string().contains("bad signature"));

        let body = "<ErrorResponse><Error><Code>NoSuchHostedZone</Code><Message>no zone</Message></Error></ErrorResponse>";
        assert_eq!(classify_error(404, body).kind(), ErrorKind::ZoneNotFound);
    }
}
