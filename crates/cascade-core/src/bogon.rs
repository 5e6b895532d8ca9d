//! Pure bogon/private-IP classifier (§4.1). No I/O, no allocation beyond the
//! input string, safe to call on every address before any external source
//! is consulted.

use std::net::Ipv4Addr;

use crate::types::ValidationRecord;

/// Classify an IPv4 address. Never fails: inputs that don't parse as IPv4
/// are treated as bogon by the caller via [`classify_str`].
#[must_use]
pub fn classify(ip: Ipv4Addr) -> ValidationRecord {
    let octets = ip.octets();
    let is_private = is_rfc1918(octets);
    let is_loopback = octets[0] == 127;
    let is_multicast = (224..=239).contains(&octets[0]);
    let is_reserved = is_reserved_range(octets);
    let is_unspecified_block = octets[0] == 0;
    let is_broadcast = ip == Ipv4Addr::new(255, 255, 255, 255);

    let is_bogon =
        is_private || is_loopback || is_multicast || is_reserved || is_unspecified_block || is_broadcast;

    ValidationRecord {
        is_private,
        is_reserved,
        is_loopback,
        is_multicast,
        is_bogon,
    }
}

/// Parse-then-classify. Malformed input is treated as bogon with
/// `is_bogon = true` per §4.1 ("the cascade does not crash on malformed
/// input"); the caller is responsible for recording the parse failure under
/// `failure_reasons`.
pub fn classify_str(ip: &str) -> Result<ValidationRecord, ()> {
    ip.parse::<Ipv4Addr>().map(classify).map_err(|_| ())
}

fn is_rfc1918(o: [u8; 4]) -> bool {
    o[0] == 10 || (o[0] == 172 && (16..=31).contains(&o[1])) || (o[0] == 192 && o[1] == 168)
}

/// Link-local (169.254.0.0/16), IETF protocol assignments and benchmarking
/// (192.0.0.0/24, 198.18.0.0/15), documentation ranges (192.0.2.0/24,
/// 198.51.100.0/24, 203.0.113.0/24), and the 240.0.0.0/4 reserved block.
fn is_reserved_range(o: [u8; 4]) -> bool {
    (o[0] == 169 && o[1] == 254)
        || (o[0] == 192 && o[1] == 0 && o[2] == 0)
        || (o[0] == 198 && (o[1] == 18 || o[1] == 19))
        || (o[0] == 192 && o[1] == 0 && o[2] == 2)
        || (o[0] == 198 && o[1] == 51 && o[2] == 100)
        || (o[0] == 203 && o[1] == 0 && o[2] == 113)
        || o[0] >= 240
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_ip_is_not_bogon() {
        let v = classify("8.8.8.8".parse().unwrap());
        assert!(!v.is_bogon);
        assert!(!v.is_private);
    }

    #[test]
    fn rfc1918_ranges_are_private_bogons() {
        for ip in ["10.1.2.3", "172.16.0.1", "172.31.255.255", "192.168.1.100"] {
            let v = classify(ip.parse().unwrap());
            assert!(v.is_private, "{ip} should be private");
            assert!(v.is_bogon, "{ip} should be bogon");
        }
    }

    #[test]
    fn loopback_is_bogon() {
        let v = classify("127.0.0.1".parse().unwrap());
        assert!(v.is_loopback);
        assert!(v.is_bogon);
    }

    #[test]
    fn multicast_is_bogon() {
        let v = classify("224.0.0.1".parse().unwrap());
        assert!(v.is_multicast);
        assert!(v.is_bogon);
    }

    #[test]
    fn link_local_is_reserved_bogon() {
        let v = classify("169.254.1.1".parse().unwrap());
        assert!(v.is_reserved);
        assert!(v.is_bogon);
    }

    #[test]
    fn unspecified_and_broadcast_are_bogon() {
        assert!(classify("0.0.0.5".parse().unwrap()).is_bogon);
        assert!(classify(Ipv4Addr::new(255, 255, 255, 255)).is_bogon);
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(classify_str("not-an-ip").is_err());
        assert!(classify_str("2001:db8::1").is_err());
    }

    #[test]
    fn outside_172_16_range_is_public() {
        let v = classify("172.32.0.1".parse().unwrap());
        assert!(!v.is_private);
        assert!(!v.is_bogon);
    }
}
