//! Reserved address ranges and the safe/unsafe classifier.
//!
//! Classification is a lookup against [`RESERVED_RANGES`]: an address is safe
//! only if it parses and matches none of the entries. There is no partial
//! trust; anything that fails to parse is unsafe.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::IpNet;

/// One reserved network in the classification table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservedRange {
    network: IpAddr,
    prefix_len: u8,
    label: &'static str,
}

impl ReservedRange {
    const fn v4(a: u8, b: u8, c: u8, d: u8, prefix_len: u8, label: &'static str) -> Self {
        Self {
            network: IpAddr::V4(Ipv4Addr::new(a, b, c, d)),
            prefix_len,
            label,
        }
    }

    const fn v6(segments: [u16; 8], prefix_len: u8, label: &'static str) -> Self {
        let [a, b, c, d, e, f, g, h] = segments;
        Self {
            network: IpAddr::V6(Ipv6Addr::new(a, b, c, d, e, f, g, h)),
            prefix_len,
            label,
        }
    }

    /// The network in CIDR form, `None` if the entry itself is malformed.
    pub fn net(&self) -> Option<IpNet> {
        IpNet::new(self.network, self.prefix_len).ok()
    }

    /// Human-readable name of the range, e.g. `"loopback (127.0.0.0/8)"`.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Whether `ip` falls inside this range. A malformed entry matches everything.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match self.net() {
            Some(net) => net.contains(&ip),
            None => true,
        }
    }
}

/// Networks that are never connected to. Entries are disjoint, so order only
/// decides which label is reported.
pub const RESERVED_RANGES: &[ReservedRange] = &[
    ReservedRange::v4(0, 0, 0, 0, 8, "\"this network\" (0.0.0.0/8)"),
    ReservedRange::v4(10, 0, 0, 0, 8, "private-use (10.0.0.0/8)"),
    ReservedRange::v4(100, 64, 0, 0, 10, "carrier-grade NAT (100.64.0.0/10)"),
    ReservedRange::v4(127, 0, 0, 0, 8, "loopback (127.0.0.0/8)"),
    ReservedRange::v4(169, 254, 0, 0, 16, "link-local / cloud metadata (169.254.0.0/16)"),
    ReservedRange::v4(172, 16, 0, 0, 12, "private-use (172.16.0.0/12)"),
    ReservedRange::v4(192, 0, 2, 0, 24, "TEST-NET-1 (192.0.2.0/24)"),
    ReservedRange::v4(192, 168, 0, 0, 16, "private-use (192.168.0.0/16)"),
    ReservedRange::v4(198, 18, 0, 0, 15, "benchmarking (198.18.0.0/15)"),
    ReservedRange::v4(198, 51, 100, 0, 24, "TEST-NET-2 (198.51.100.0/24)"),
    ReservedRange::v4(203, 0, 113, 0, 24, "TEST-NET-3 (203.0.113.0/24)"),
    ReservedRange::v4(224, 0, 0, 0, 4, "multicast (224.0.0.0/4)"),
    ReservedRange::v4(240, 0, 0, 0, 4, "reserved / broadcast (240.0.0.0/4)"),
    ReservedRange::v6([0, 0, 0, 0, 0, 0, 0, 0], 128, "unspecified (::)"),
    ReservedRange::v6([0, 0, 0, 0, 0, 0, 0, 1], 128, "loopback (::1)"),
    ReservedRange::v6([0xfc00, 0, 0, 0, 0, 0, 0, 0], 7, "unique-local (fc00::/7)"),
    ReservedRange::v6([0xfe80, 0, 0, 0, 0, 0, 0, 0], 10, "link-local (fe80::/10)"),
    ReservedRange::v6([0xff00, 0, 0, 0, 0, 0, 0, 0], 8, "multicast (ff00::/8)"),
    ReservedRange::v6([0x2001, 0x0db8, 0, 0, 0, 0, 0, 0], 32, "documentation (2001:db8::/32)"),
];

/// Label of the first reserved range containing `ip`, or `None` if it is public.
///
/// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) are judged by the embedded
/// IPv4 address.
pub fn blocked_reason(ip: IpAddr) -> Option<&'static str> {
    let ip = match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => ip,
        },
        IpAddr::V4(_) => ip,
    };

    RESERVED_RANGES
        .iter()
        .find(|range| range.contains(ip))
        .map(ReservedRange::label)
}

/// Whether `ip` is globally routable and safe to connect to.
pub fn is_ip_safe(ip: IpAddr) -> bool {
    blocked_reason(ip).is_none()
}

/// Classify an address in textual form. Never panics; anything that is not
/// a plain IPv4 or IPv6 literal is unsafe.
pub fn is_safe(address: &str) -> bool {
    if let Ok(v4) = address.parse::<Ipv4Addr>() {
        return is_ip_safe(IpAddr::V4(v4));
    }
    if let Ok(v6) = address.parse::<Ipv6Addr>() {
        return is_ip_safe(IpAddr::V6(v6));
    }
    false
}
