//! Healthcheck evaluation
//!
//! A deployment is healthy when no record failed its last cycle and every
//! idle record with a confirmed IP resolves to that IP through the local
//! resolver. Proxied records are skipped since they resolve to the vendor's
//! edge, and so are records the vendor updated without echoing an address.

use async_trait::async_trait;
use std::net::IpAddr;

use crate::error::Result;
use crate::runtime::{RuntimeSnapshot, Status};

/// Host name resolution used by the healthcheck
#[async_trait]
pub trait HostLookup: Send + Sync {
    /// Every address `host` resolves to
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>>;
}

/// Evaluate the health of all records
///
/// # Returns
///
/// - `Ok(())`: Healthy
/// - `Err(String)`: Every problem found, joined with `; `
pub async fn evaluate(
    snapshots: &[RuntimeSnapshot],
    lookup: &dyn HostLookup,
) -> std::result::Result<(), String> {
    let mut problems = Vec::new();

    for snapshot in snapshots {
        match snapshot.status {
            Status::Fail => {
                problems.push(format!("{}: {}", snapshot.fqdn, snapshot.message));
                continue;
            }
            Status::Updating => continue,
            _ => {}
        }
        if snapshot.description.proxied {
            continue;
        }
        let Some(expected) = snapshot.current_ip.filter(|ip| !ip.is_unspecified()) else {
            continue;
        };

        match lookup.lookup(&snapshot.fqdn).await {
            Ok(found) if found.contains(&expected) => {}
            Ok(found) => {
                let found: Vec<String> = found.iter().map(IpAddr::to_string).collect();
                problems.push(format!(
                    "lookup IP addresses for {} are {}, not {}",
                    snapshot.fqdn,
                    found.join(", "),
                    expected
                ));
            }
            Err(e) => problems.push(format!("lookup {}: {}", snapshot.fqdn, e)),
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems.join("; "))
    }
}
