//! SSRF protection: URL validation for outbound requests.
//!
//! Every outbound fetch (feed refresh, audio download, artwork) passes
//! through [`validate_url`] first. Blocks private/reserved addresses,
//! restricted schemes and ports, and cloud metadata endpoints.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use thiserror::Error;
use tracing::warn;
use url::{Host, Url};

/// Ports permitted for outbound requests.
const ALLOWED_PORTS: &[u16] = &[80, 443, 8080, 8443];

/// Cloud metadata addresses that must always be blocked.
const CLOUD_METADATA_IPS: &[Ipv4Addr] = &[
    Ipv4Addr::new(169, 254, 169, 254), // AWS, GCP metadata
    Ipv4Addr::new(168, 63, 129, 16),   // Azure metadata
];

/// Raised when a URL fails SSRF validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SsrfError {
    #[error("Empty URL")]
    Empty,

    #[error("Invalid URL: {0}")]
    Invalid(String),

    #[error("Blocked URL scheme: {0:?}")]
    BlockedScheme(String),

    #[error("Missing hostname in URL")]
    MissingHost,

    #[error("Blocked port: {0}")]
    BlockedPort(u16),

    #[error("Cannot resolve hostname: {0:?}")]
    Unresolvable(String),

    // Deliberately generic: must not echo the blocked address back.
    #[error("Address is not allowed")]
    BlockedAddress,
}

/// Validate a URL for safe outbound requests.
///
/// Checks scheme, port, and every resolved address against blocklists.
/// Hostnames are resolved; each resulting IP must be public.
///
/// # Errors
/// Returns [`SsrfError`] for:
/// - Non-HTTP(S) schemes and ports outside the allow-list
/// - Unresolvable hostnames
/// - Loopback, link-local, multicast, private (RFC 1918 / ULA), reserved,
///   or cloud-metadata addresses, including IPv4-mapped IPv6 bypass vectors
pub async fn validate_url(url: &str) -> Result<String, SsrfError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(SsrfError::Empty);
    }

    let parsed = Url::parse(url).map_err(|_| SsrfError::Invalid(url.to_string()))?;

    let scheme = parsed.scheme().to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(SsrfError::BlockedScheme(scheme));
    }

    let host = parsed.host().ok_or(SsrfError::MissingHost)?;

    let port = parsed
        .port()
        .unwrap_or(if scheme == "https" { 443 } else { 80 });
    if !ALLOWED_PORTS.contains(&port) {
        return Err(SsrfError::BlockedPort(port));
    }

    match host {
        Host::Ipv4(ip) => check_ip(IpAddr::V4(ip)).inspect_err(|_| {
            warn!("SSRF: blocked IPv4 literal in {url}");
        })?,
        Host::Ipv6(ip) => check_ip(IpAddr::V6(ip)).inspect_err(|_| {
            warn!("SSRF: blocked IPv6 literal in {url}");
        })?,
        Host::Domain(domain) => {
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((domain, port))
                .await
                .map_err(|_| SsrfError::Unresolvable(domain.to_string()))?
                .collect();
            if addrs.is_empty() {
                return Err(SsrfError::Unresolvable(domain.to_string()));
            }
            for addr in addrs {
                check_ip(addr.ip()).inspect_err(|_| {
                    warn!("SSRF: host {domain} resolved to a blocked address");
                })?;
            }
        }
    }

    Ok(url.to_string())
}

/// IPv4 networks that never belong in a podcast feed or enclosure URL:
/// unroutable, private (RFC 1918), carrier-grade NAT, link-local,
/// documentation/benchmark ranges, multicast, and everything reserved above
/// 240.0.0.0. Stored as CIDR `(network, prefix_len)` pairs.
const BLOCKED_IPV4_NETS: &[(Ipv4Addr, u8)] = &[
    (Ipv4Addr::new(0, 0, 0, 0), 8),        // unroutable "this network"
    (Ipv4Addr::new(10, 0, 0, 0), 8),       // private
    (Ipv4Addr::new(100, 64, 0, 0), 10),    // carrier-grade NAT
    (Ipv4Addr::new(127, 0, 0, 0), 8),      // loopback
    (Ipv4Addr::new(169, 254, 0, 0), 16),   // link-local, incl. cloud metadata
    (Ipv4Addr::new(172, 16, 0, 0), 12),    // private
    (Ipv4Addr::new(192, 0, 0, 0), 24),     // protocol assignments
    (Ipv4Addr::new(192, 0, 2, 0), 24),     // documentation
    (Ipv4Addr::new(192, 168, 0, 0), 16),   // private
    (Ipv4Addr::new(198, 18, 0, 0), 15),    // interconnect benchmarking
    (Ipv4Addr::new(198, 51, 100, 0), 24),  // documentation
    (Ipv4Addr::new(203, 0, 113, 0), 24),   // documentation
    (Ipv4Addr::new(224, 0, 0, 0), 4),      // multicast
    (Ipv4Addr::new(240, 0, 0, 0), 4),      // reserved, broadcast
];

/// Check a single resolved address against the blocklists.
fn check_ip(ip: IpAddr) -> Result<(), SsrfError> {
    let blocked = match ip {
        IpAddr::V4(v4) => is_blocked_ipv4(v4),
        IpAddr::V6(v6) => {
            // An IPv4 target can also be spelled as an IPv6 transitional
            // address; apply the IPv4 rules to that spelling as well.
            is_blocked_ipv6(v6) || embedded_ipv4(v6).is_some_and(is_blocked_ipv4)
        }
    };
    if blocked {
        Err(SsrfError::BlockedAddress)
    } else {
        Ok(())
    }
}

fn in_ipv4_net(ip: Ipv4Addr, network: Ipv4Addr, prefix_len: u8) -> bool {
    let mask = u32::MAX << (32 - u32::from(prefix_len));
    u32::from(ip) & mask == u32::from(network) & mask
}

fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    CLOUD_METADATA_IPS.contains(&ip)
        || BLOCKED_IPV4_NETS
            .iter()
            .any(|&(network, prefix_len)| in_ipv4_net(ip, network, prefix_len))
}

/// Non-public IPv6: unspecified, loopback, multicast, link-local
/// (`fe80::/10`), unique-local (`fc00::/7`), and the documentation prefix
/// (`2001:db8::/32`).
fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    if ip.is_unspecified() || ip.is_loopback() || ip.is_multicast() {
        return true;
    }
    let [top, second, ..] = ip.segments();
    top & 0xffc0 == 0xfe80
        || top & 0xfe00 == 0xfc00
        || (top == 0x2001 && second == 0xdb8)
}

/// Unwrap IPv4 addresses carried in IPv6 transitional notation: the mapped
/// form `::ffff:a.b.c.d`, the deprecated compatible form `::a.b.c.d`, and
/// the NAT64 translation prefixes under `64:ff9b`.
fn embedded_ipv4(ip: Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return Some(mapped);
    }

    let segments = ip.segments();
    let tail = {
        let o = ip.octets();
        Ipv4Addr::new(o[12], o[13], o[14], o[15])
    };

    let compatible = segments[..6] == [0; 6] && u32::from(tail) > 1;
    let nat64 = segments[0] == 0x64 && segments[1] == 0xff9b;
    (compatible || nat64).then_some(tail)
}
