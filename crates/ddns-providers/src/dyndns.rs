//! DynDNS-2 return codes
//!
//! Vendors of the text family answer with a short body whose first token
//! is the outcome, optionally followed by the address now set:
//!
//! | Token | Outcome |
//! |-------|---------|
//! | `good <ip>`, `nochg <ip>` | success |
//! | `nohost`, `notfqdn` | hostname does not exist |
//! | `badauth`, `!yours` | auth |
//! | `badagent` | banned user agent |
//! | `abuse`, `numhost` | abuse |
//! | `badrequest` | bad request |
//! | `!donator` | feature unavailable |
//! | `911`, `dnserr` | server side |
//!
//! Several vendors answer a non-200 status with one of these tokens, so
//! the body is classified before the status.

use ddns_core::traits::UpdateTarget;
use ddns_core::transport::{self, find_ips, single_line};
use ddns_core::{Error, Result};
use reqwest::{RequestBuilder, StatusCode, Url};
use std::net::IpAddr;

use crate::common::{self, confirm};

/// Send a DynDNS-2 request and interpret its answer
pub(crate) async fn send(request: RequestBuilder, target: UpdateTarget) -> Result<IpAddr> {
    let response = request.send().await?;
    let status = response.status();
    let body = transport::read_body(response).await?;
    interpret(status, &body, target)
}

/// Classify a DynDNS-2 answer and check the echoed address
pub(crate) fn interpret(status: StatusCode, body: &str, target: UpdateTarget) -> Result<IpAddr> {
    classify(status, body)?;
    confirm(target, echoed_ip(body, target))
}

/// Map the leading token of a body onto the error taxonomy
pub(crate) fn classify(status: StatusCode, body: &str) -> Result<()> {
    let line = single_line(body);
    let code = first_token(&line);

    match code.as_str() {
        "good" | "nochg" => Ok(()),
        "nohost" | "notfqdn" => Err(Error::hostname_not_exists(line)),
        "badauth" | "!yours" => Err(Error::auth(line)),
        "badagent" => Err(Error::BannedUserAgent(line)),
        "abuse" | "numhost" => Err(Error::Abuse(line)),
        "badrequest" => Err(Error::bad_request(line)),
        "!donator" => Err(Error::FeatureUnavailable(line)),
        "911" | "dnserr" => Err(Error::DnsServerSide(line)),
        _ if !status.is_success() => Err(Error::bad_status(status.as_u16(), line)),
        "" => Err(Error::unknown_response("empty response body")),
        _ => Err(Error::unknown_response(line)),
    }
}

/// Lowercased first whitespace-separated token of a body
pub(crate) fn first_token(body: &str) -> String {
    body.split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// First address in `body` of the target's family
///
/// A provider-supplied target falls back to the other family, since the
/// vendor may have picked up the source address of either.
pub(crate) fn echoed_ip(body: &str, target: UpdateTarget) -> Option<IpAddr> {
    let (v4, v6) = find_ips(body);
    let v4 = v4.first().copied().map(IpAddr::V4);
    let v6 = v6.first().copied().map(IpAddr::V6);

    let (same, other) = if target.is_ipv6() { (v6, v4) } else { (v4, v6) };
    if target.provider_supplied {
        same.or(other)
    } else {
        same
    }
}

/// URL of a `/nic/update` style request for `hostname`
///
/// `myip` carries the address of either family and is left out when the
/// vendor picks the address.
pub(crate) fn nic_update_url(base: &Url, path: &str, hostname: &str, target: UpdateTarget) -> Result<Url> {
    let mut url = common::endpoint(base, path)?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("hostname", hostname);
        if target.sends_ip() {
            query.append_pair("myip", &target.ip.to_string());
        }
    }
    Ok(url)
}
