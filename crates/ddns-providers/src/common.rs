//! Helpers shared by every adapter
//!
//! Construction-time checks (required credentials, wildcard owners, TTL
//! floors), URL building against an overridable base, and the final check
//! of an echoed address against the one that was sent.

use ddns_core::traits::UpdateTarget;
use ddns_core::{Error, RecordConfig, Result};
use regex::Regex;
use reqwest::Url;
use std::net::IpAddr;

/// Parse a base URL, either a built-in default or a test override
pub(crate) fn base_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::config(format!("invalid base URL {raw:?}: {e}")))
}

/// Absolute URL of `path` on `base`
///
/// `path` replaces whatever path `base` carries.
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|e| Error::config(format!("building URL for {path:?}: {e}")))
}

/// A credential that must be present and non-empty
pub(crate) fn required(record: &RecordConfig, provider: &str, key: &str) -> Result<String> {
    record
        .credential(key)
        .map(str::to_string)
        .ok_or_else(|| Error::config(format!("{provider}: {key} is not set for {}", record.fqdn())))
}

/// Refuse `*` owners on vendors that cannot express them
pub(crate) fn reject_wildcard(record: &RecordConfig, provider: &str) -> Result<()> {
    if record.is_wildcard() {
        return Err(Error::config(format!(
            "{provider}: wildcard owner is not supported for {}",
            record.domain
        )));
    }
    Ok(())
}

/// Refuse a configured TTL below the vendor's floor
pub(crate) fn ttl_at_least(record: &RecordConfig, provider: &str, min: u32) -> Result<()> {
    match record.ttl {
        Some(ttl) if ttl < min => Err(Error::config(format!(
            "{provider}: ttl {ttl} is below the minimum of {min} for {}",
            record.fqdn()
        ))),
        _ => Ok(()),
    }
}

/// Whether `value` matches `pattern` in full
pub(crate) fn matches(pattern: &str, value: &str) -> Result<bool> {
    let regex = Regex::new(pattern)
        .map_err(|e| Error::config(format!("credential pattern {pattern:?}: {e}")))?;
    Ok(regex.is_match(value))
}

/// Check a credential against its expected format
pub(crate) fn check_format(provider: &str, key: &str, value: &str, pattern: &str) -> Result<()> {
    if !matches(pattern, value)? {
        return Err(Error::config(format!("{provider}: {key} is not valid")));
    }
    Ok(())
}

/// Owner label as vendors that spell the apex as an empty string expect it
pub(crate) fn owner_or_empty(record: &RecordConfig) -> &str {
    if record.is_apex() { "" } else { record.owner.as_str() }
}

/// Check the address a vendor echoed against the target
///
/// A provider-supplied update accepts whatever the vendor picked. Without
/// an echo the target address is returned.
pub(crate) fn confirm(target: UpdateTarget, echoed: Option<IpAddr>) -> Result<IpAddr> {
    match echoed {
        Some(received) if target.sends_ip() && received != target.ip => Err(Error::IpMismatch {
            sent: target.ip,
            received,
        }),
        Some(received) => Ok(received),
        None => Ok(target.ip),
    }
}
