//! Amazon Web Services (Route 53 through the AWS credential names)
//!
//! Same `UPSERT` change batch as the `route53` adapter, configured with the
//! key names of the AWS SDK and an optional signing region.
//!
//! ```json
//! {"provider": "aws", "aws_access_key": "...", "aws_secret_access_key": "...",
//!  "hosted_zone_id": "Z...", "region": "eu-west-1"}
//! ```

use ddns_core::traits::{DnsProvider, ProviderDescription};
use ddns_core::{RecordConfig, Result};

use crate::common;
use crate::route53::{Route53Provider, Signer};

pub const NAME: &str = "aws";

const DEFAULT_REGION: &str = "us-east-1";

pub fn new(record: &RecordConfig) -> Result<Route53Provider> {
    let access_key = common::required(record, NAME, "aws_access_key")?;
    let secret_key = common::required(record, NAME, "aws_secret_access_key")?;
    let zone_id = common::required(record, NAME, "hosted_zone_id")?;
    let region = record.credential("region").unwrap_or(DEFAULT_REGION);

    Route53Provider::from_parts(
        Signer::new(access_key, secret_key).with_region(region),
        &zone_id,
        record,
        ProviderDescription::new(NAME, "Amazon Route 53", "https://aws.amazon.com/route53/", record),
    )
}

pub fn create(record: &RecordConfig) -> Result<Box<dyn DnsProvider>> {
    Ok(Box::new(new(record)?))
}
