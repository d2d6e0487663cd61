// # DNS Provider Adapters
//
// One module per vendor, each implementing `ddns_core::traits::DnsProvider`
// for one declared record.
//
// ## Families
//
// - **DynDNS-2 text**: a single GET carrying the hostname and the address,
//   answered by a short text body. Shared return-code handling lives in
//   `dyndns`.
// - **REST/JSON**: look the record up, compare, then create or update by
//   identifier. Vendors that sign requests (route53, aliyun, ovh) build
//   their canonical request in their own module.
// - **Token exchange**: fetch a short-lived bearer first. gcp signs a JWT
//   and transip signs the login body with `rsa_key`; azure uses client
//   credentials; netcup opens and closes a JSON session.
// - **RouterOS API**: mikrotik speaks the binary sentence protocol over
//   TCP instead of HTTP.
//
// ## Conventions
//
// - Credentials are validated in `new`; an invalid bag never yields an adapter.
// - `Debug` prints `<REDACTED>` for every secret.
// - URLs carrying secrets are only logged through `transport::RedactedUrl`.
// - Every adapter takes a base URL override, used by the tests to point
//   requests at a local mock server.
//
// ## Usage
//
// ```rust,ignore
// let registry = ProviderRegistry::with_builtin_stores();
// ddns_providers::register_all(&registry);
// let providers = registry.create_providers(&config)?;
// ```

use ddns_core::ProviderRegistry;

mod common;
mod dyndns;
mod rsa_key;

pub mod aliyun;
pub mod allinkl;
pub mod apertodns;
pub mod arvancloud;
pub mod aws;
pub mod azure;
pub mod cloudflare;
pub mod custom;
pub mod dd24;
pub mod ddnss;
pub mod desec;
pub mod digitalocean;
pub mod dnsomatic;
pub mod dnspod;
pub mod domeneshop;
pub mod dondominio;
pub mod dreamhost;
pub mod duckdns;
pub mod dyn_com;
pub mod dynv6;
pub mod easydns;
pub mod freedns;
pub mod gandi;
pub mod gcp;
pub mod godaddy;
pub mod goip;
pub mod he;
pub mod hetzner;
pub mod hetznercloud;
pub mod infomaniak;
pub mod ionos;
pub mod ipv64;
pub mod linode;
pub mod loopia;
pub mod luadns;
pub mod mikrotik;
pub mod myaddr;
pub mod namecheap;
pub mod namecom;
pub mod namesilo;
pub mod netcup;
pub mod netlify;
pub mod nextdns;
pub mod njalla;
pub mod noip;
pub mod nowdns;
pub mod opendns;
pub mod ovh;
pub mod porkbun;
pub mod route53;
pub mod scaleway;
pub mod selfhost;
pub mod servercow;
pub mod spaceship;
pub mod spdyn;
pub mod strato;
pub mod synology;
pub mod transip;
pub mod variomedia;
pub mod vercel;
pub mod vultr;
pub mod zoneedit;

/// Register every adapter under its provider name
pub fn register_all(registry: &ProviderRegistry) {
    registry.register_provider(aliyun::NAME, Box::new(aliyun::create));
    registry.register_provider(allinkl::NAME, Box::new(allinkl::create));
    registry.register_provider(apertodns::NAME, Box::new(apertodns::create));
    registry.register_provider(arvancloud::NAME, Box::new(arvancloud::create));
    registry.register_provider(aws::NAME, Box::new(aws::create));
    registry.register_provider(azure::NAME, Box::new(azure::create));
    registry.register_provider(cloudflare::NAME, Box::new(cloudflare::create));
    registry.register_provider(custom::NAME, Box::new(custom::create));
    registry.register_provider(dd24::NAME, Box::new(dd24::create));
    registry.register_provider(ddnss::NAME, Box::new(ddnss::create));
    registry.register_provider(desec::NAME, Box::new(desec::create));
    registry.register_provider(digitalocean::NAME, Box::new(digitalocean::create));
    registry.register_provider(dnsomatic::NAME, Box::new(dnsomatic::create));
    registry.register_provider(dnspod::NAME, Box::new(dnspod::create));
    registry.register_provider(domeneshop::NAME, Box::new(domeneshop::create));
    registry.register_provider(dondominio::NAME, Box::new(dondominio::create));
    registry.register_provider(dreamhost::NAME, Box::new(dreamhost::create));
    registry.register_provider(duckdns::NAME, Box::new(duckdns::create));
    registry.register_provider(dyn_com::NAME, Box::new(dyn_com::create));
    registry.register_provider(dynv6::NAME, Box::new(dynv6::create));
    registry.register_provider(easydns::NAME, Box::new(easydns::create));
    registry.register_provider(freedns::NAME, Box::new(freedns::create));
    registry.register_provider(gandi::NAME, Box::new(gandi::create));
    registry.register_provider(gcp::NAME, Box::new(gcp::create));
    registry.register_provider(godaddy::NAME, Box::new(godaddy::create));
    registry.register_provider(goip::NAME, Box::new(goip::create));
    registry.register_provider(he::NAME, Box::new(he::create));
    registry.register_provider(hetzner::NAME, Box::new(hetzner::create));
    registry.register_provider(hetznercloud::NAME, Box::new(hetznercloud::create));
    registry.register_provider(hetznercloud::NETWORKING_NAME, Box::new(hetznercloud::create_networking));
    registry.register_provider(infomaniak::NAME, Box::new(infomaniak::create));
    registry.register_provider(ionos::NAME, Box::new(ionos::create));
    registry.register_provider(ipv64::NAME, Box::new(ipv64::create));
    registry.register_provider(linode::NAME, Box::new(linode::create));
    registry.register_provider(loopia::NAME, Box::new(loopia::create));
    registry.register_provider(luadns::NAME, Box::new(luadns::create));
    registry.register_provider(mikrotik::NAME, Box::new(mikrotik::create));
    registry.register_provider(myaddr::NAME, Box::new(myaddr::create));
    registry.register_provider(namecheap::NAME, Box::new(namecheap::create));
    registry.register_provider(namecom::NAME, Box::new(namecom::create));
    registry.register_provider(namesilo::NAME, Box::new(namesilo::create));
    registry.register_provider(netcup::NAME, Box::new(netcup::create));
    registry.register_provider(netlify::NAME, Box::new(netlify::create));
    registry.register_provider(nextdns::NAME, Box::new(nextdns::create));
    registry.register_provider(njalla::NAME, Box::new(njalla::create));
    registry.register_provider(noip::NAME, Box::new(noip::create));
    registry.register_provider(nowdns::NAME, Box::new(nowdns::create));
    registry.register_provider(opendns::NAME, Box::new(opendns::create));
    registry.register_provider(ovh::NAME, Box::new(ovh::create));
    registry.register_provider(porkbun::NAME, Box::new(porkbun::create));
    registry.register_provider(route53::NAME, Box::new(route53::create));
    registry.register_provider(scaleway::NAME, Box::new(scaleway::create));
    registry.register_provider(selfhost::NAME, Box::new(selfhost::create));
    registry.register_provider(servercow::NAME, Box::new(servercow::create));
    registry.register_provider(spaceship::NAME, Box::new(spaceship::create));
    registry.register_provider(spdyn::NAME, Box::new(spdyn::create));
    registry.register_provider(strato::NAME, Box::new(strato::create));
    registry.register_provider(synology::NAME, Box::new(synology::create));
    registry.register_provider(transip::NAME, Box::new(transip::create));
    registry.register_provider(variomedia::NAME, Box::new(variomedia::create));
    registry.register_provider(vercel::NAME, Box::new(vercel::create));
    registry.register_provider(vultr::NAME, Box::new(vultr::create));
    registry.register_provider(zoneedit::NAME, Box::new(zoneedit::create));
}
