// # Interface IP Source
//
// This crate reads the public address straight from the local network
// interfaces, for hosts that hold a globally routable address themselves.
//
// ## Selection
//
// Addresses are enumerated with `getifaddrs(3)` in kernel order and the
// first one that is globally routable and of the requested family wins.
// Loopback, link-local, private, unique-local, shared (CGNAT),
// documentation and unspecified addresses are skipped. On Linux, IPv6
// addresses flagged deprecated in `/proc/net/if_inet6` are skipped too.
//
// ## Platform Support
//
// Unix only. On other platforms the factory refuses to build the source.

use ddns_core::config::{IpStrategy, IpVersion, ResolverConfig};
use ddns_core::traits::{IpSource, IpSourceFactory};
use ddns_core::{Error, ProviderRegistry, Result};

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::debug;

/// One address bound to a local interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddr {
    pub interface: String,
    pub ip: IpAddr,
}

/// Whether `ip` can be reached from the public internet
pub fn is_global_unicast(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_global_v4(v4),
        IpAddr::V6(v6) => is_global_v6(v6),
    }
}

fn is_global_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    let shared = a == 100 && (b & 0xc0) == 64;
    !(ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_documentation()
        || ip.is_broadcast()
        || ip.is_multicast()
        || shared)
}

fn is_global_v6(ip: Ipv6Addr) -> bool {
    let segments = ip.segments();
    let documentation = segments[0] == 0x2001 && segments[1] == 0x0db8;
    !(ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || ip.is_unicast_link_local()
        || ip.is_unique_local()
        || documentation)
}

/// Parse the deprecated IPv6 addresses out of `/proc/net/if_inet6`
///
/// Each line holds the address, index, prefix length, scope, flags and
/// interface name, e.g. `20010db8000000000000000000000001 02 40 00 a0 eth0`.
pub fn parse_deprecated_v6(content: &str) -> Vec<Ipv6Addr> {
    // <linux/if_addr.h>
    const IFA_F_DEPRECATED: u8 = 0x20;

    content
        .lines()
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            let address = u128::from_str_radix(columns.first()?, 16).ok()?;
            let flags = u8::from_str_radix(columns.get(4)?, 16).ok()?;
            (flags & IFA_F_DEPRECATED != 0).then(|| Ipv6Addr::from(address))
        })
        .collect()
}

#[cfg(target_os = "linux")]
fn deprecated_v6() -> Vec<Ipv6Addr> {
    match std::fs::read_to_string("/proc/net/if_inet6") {
        Ok(content) => parse_deprecated_v6(&content),
        Err(_) => Vec::new(),
    }
}

#[cfg(not(target_os = "linux"))]
fn deprecated_v6() -> Vec<Ipv6Addr> {
    Vec::new()
}

/// Pick the first usable address of `version`
pub fn select(
    addrs: &[InterfaceAddr],
    version: IpVersion,
    interface: Option<&str>,
    deprecated: &[Ipv6Addr],
) -> Option<IpAddr> {
    let usable = |addr: &&InterfaceAddr| {
        interface.is_none_or(|name| addr.interface == name)
            && is_global_unicast(addr.ip)
            && !matches!(addr.ip, IpAddr::V6(v6) if deprecated.contains(&v6))
    };
    let first_of = |wanted: IpVersion| {
        addrs
            .iter()
            .filter(usable)
            .map(|addr| addr.ip)
            .find(|ip| wanted.accepts(*ip))
    };

    match version {
        IpVersion::V4OrV6 => first_of(IpVersion::V4).or_else(|| first_of(IpVersion::V6)),
        _ => first_of(version),
    }
}

#[cfg(unix)]
mod os {
    use super::InterfaceAddr;
    use std::ffi::CStr;
    use std::io;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    /// Every address bound to a local interface
    pub fn interface_addrs() -> io::Result<Vec<InterfaceAddr>> {
        let mut addrs = Vec::new();
        let mut head: *mut libc::ifaddrs = std::ptr::null_mut();

        // SAFETY: on success getifaddrs stores a list we release below.
        if unsafe { libc::getifaddrs(&mut head) } != 0 {
            return Err(io::Error::last_os_error());
        }

        let mut current = head as *const libc::ifaddrs;
        while !current.is_null() {
            // SAFETY: non-null entries of the list stay valid until freeifaddrs.
            let entry = unsafe { &*current };
            current = entry.ifa_next as *const _;

            if entry.ifa_addr.is_null() || entry.ifa_name.is_null() {
                continue;
            }
            // SAFETY: the kernel hands out null-terminated names.
            let name = unsafe { CStr::from_ptr(entry.ifa_name) }
                .to_string_lossy()
                .into_owned();

            // SAFETY: ifa_addr is non-null and its family tags the layout.
            let family = i32::from(unsafe { (*entry.ifa_addr).sa_family });
            let ip = if family == libc::AF_INET {
                // SAFETY: AF_INET addresses are sockaddr_in.
                let sin = unsafe { *(entry.ifa_addr as *const libc::sockaddr_in) };
                IpAddr::V4(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)))
            } else if family == libc::AF_INET6 {
                // SAFETY: AF_INET6 addresses are sockaddr_in6.
                let sin6 = unsafe { *(entry.ifa_addr as *const libc::sockaddr_in6) };
                IpAddr::V6(Ipv6Addr::from(sin6.sin6_addr.s6_addr))
            } else {
                continue;
            };

            addrs.push(InterfaceAddr { interface: name, ip });
        }

        // SAFETY: head came from a successful getifaddrs.
        unsafe { libc::freeifaddrs(head) };

        Ok(addrs)
    }
}

/// Local interface IP source
pub struct InterfaceIpSource {
    interface: Option<String>,
}

impl InterfaceIpSource {
    /// Restrict the lookup to `interface` when set
    pub fn new(interface: Option<String>) -> Self {
        Self { interface }
    }
}

#[cfg(unix)]
#[async_trait::async_trait]
impl IpSource for InterfaceIpSource {
    async fn fetch(&self, version: IpVersion) -> Result<IpAddr> {
        let interface = self.interface.clone();

        let found = tokio::task::spawn_blocking(move || -> Result<Option<IpAddr>> {
            let addrs = os::interface_addrs()
                .map_err(|e| Error::ip_source(format!("listing interfaces: {}", e)))?;
            Ok(select(&addrs, version, interface.as_deref(), &deprecated_v6()))
        })
        .await
        .map_err(|e| Error::ip_source(format!("interface lookup task: {}", e)))??;

        match found {
            Some(ip) => {
                debug!(%ip, "interface address selected");
                Ok(ip)
            }
            None => Err(Error::ip_source(match &self.interface {
                Some(name) => format!("no global {} address on interface {}", version, name),
                None => format!("no global {} address on any interface", version),
            })),
        }
    }

    fn strategy(&self) -> IpStrategy {
        IpStrategy::Interface
    }
}

/// Factory for creating interface IP sources
pub struct InterfaceFactory;

#[cfg(unix)]
impl IpSourceFactory for InterfaceFactory {
    fn create(&self, config: &ResolverConfig) -> Result<Box<dyn IpSource>> {
        Ok(Box::new(InterfaceIpSource::new(config.interface.clone())))
    }
}

#[cfg(not(unix))]
impl IpSourceFactory for InterfaceFactory {
    fn create(&self, _config: &ResolverConfig) -> Result<Box<dyn IpSource>> {
        Err(Error::config("interface IP source is only supported on Unix"))
    }
}

/// Register the interface IP source with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_ip_source(IpStrategy::Interface, Box::new(InterfaceFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(interface: &str, ip: &str) -> InterfaceAddr {
        InterfaceAddr {
            interface: interface.to_string(),
            ip: ip.parse().unwrap(),
        }
    }

    #[test]
    fn test_non_global_addresses_are_skipped() {
        for ip in [
            "127.0.0.1",
            "10.1.2.3",
            "192.168.1.10",
            "172.16.0.1",
            "169.254.1.1",
            "100.64.0.1",
            "192.0.2.1",
            "0.0.0.0",
            "::1",
            "fe80::1",
            "fd00::1",
            "2001:db8::1",
            "::",
        ] {
            assert!(!is_global_unicast(ip.parse().unwrap()), "{} is not global", ip);
        }
        assert!(is_global_unicast("93.184.216.34".parse().unwrap()));
        assert!(is_global_unicast("2a00:1450:4001::1".parse().unwrap()));
    }

    #[test]
    fn test_select_first_global_of_family() {
        let addrs = vec![
            addr("lo", "127.0.0.1"),
            addr("eth0", "192.168.1.10"),
            addr("eth0", "fe80::1"),
            addr("eth0", "2a00:1450:4001::1"),
            addr("ppp0", "93.184.216.34"),
        ];

        assert_eq!(
            select(&addrs, IpVersion::V4, None, &[]),
            Some("93.184.216.34".parse().unwrap())
        );
        assert_eq!(
            select(&addrs, IpVersion::V6, None, &[]),
            Some("2a00:1450:4001::1".parse().unwrap())
        );
        assert_eq!(
            select(&addrs, IpVersion::V4OrV6, None, &[]),
            Some("93.184.216.34".parse().unwrap())
        );
        assert_eq!(select(&addrs, IpVersion::V4, Some("eth0"), &[]), None);
    }

    #[test]
    fn test_deprecated_v6_is_skipped() {
        let content = "\
2a001450400100000000000000000001 02 40 00 a0     eth0
2a001450400100000000000000000002 02 40 00 80     eth0
00000000000000000000000000000001 01 80 10 80       lo
";
        let deprecated = parse_deprecated_v6(content);
        assert_eq!(deprecated, vec!["2a00:1450:4001::1".parse::<Ipv6Addr>().unwrap()]);

        let addrs = vec![addr("eth0", "2a00:1450:4001::1"), addr("eth0", "2a00:1450:4001::2")];
        assert_eq!(
            select(&addrs, IpVersion::V6, None, &deprecated),
            Some("2a00:1450:4001::2".parse().unwrap())
        );
    }

    #[test]
    fn test_factory_creation() {
        let source = InterfaceFactory.create(&ResolverConfig::default());
        if cfg!(unix) {
            assert_eq!(source.unwrap().strategy(), IpStrategy::Interface);
        } else {
            assert!(source.is_err());
        }
    }
}
