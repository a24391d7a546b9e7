//! IP address anonymization
//!
//! Follows the Google Analytics convention: the last octet of an IPv4
//! address and the last 10 bytes (80 bits) of an IPv6 address are zeroed.

use sha2::{Digest, Sha256};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Number of trailing IPv6 bytes that are zeroed
const IPV6_ZEROED_BYTES: usize = 10;

/// Anonymize an IP address by zeroing its trailing bytes
///
/// - IPv4: zero the last octet
/// - IPv6: zero the last 10 bytes
pub fn anonymize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(addr) => {
            let octets = addr.octets();
            IpAddr::V4(Ipv4Addr::new(octets[0], octets[1], octets[2], 0))
        }
        IpAddr::V6(addr) => {
            let mut octets = addr.octets();
            let keep = octets.len() - IPV6_ZEROED_BYTES;
            octets[keep..].fill(0);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
    }
}

/// Parse and anonymize a textual address; `None` if it is not an IP literal
pub fn anonymize(raw: &str) -> Option<String> {
    let ip = raw.trim().parse::<IpAddr>().ok()?;
    Some(anonymize_ip(ip).to_string())
}

/// Key under which an anonymized address is tracked in grace-period maps.
///
/// Storing a hash rather than the address keeps the map from being joined
/// back to visitor records.
pub fn grace_key(anonymized: &str) -> String {
    format!("{:x}", Sha256::digest(anonymized.as_bytes()))
}
