//! Next-free-address search inside one subnet.
//!
//! A linear scan from the network address upward. Subnets are small in
//! practice and allocation is operator-triggered, so no free list is kept.

use std::collections::HashSet;
use std::net::IpAddr;

use crate::cidr;
use crate::error::{Error, Result};

/// Returns the lowest address in `subnet` that is neither the network
/// address, the broadcast/last address, nor in `reserved`.
///
/// # Errors
///
/// Returns [`Error::InvalidCidr`] if `subnet` does not parse and
/// [`Error::AddressExhausted`] if no address qualifies.
pub fn find_available(subnet: &str, reserved: &HashSet<IpAddr>) -> Result<IpAddr> {
    let net = cidr::parse(subnet)?;
    let network = net.network();
    let last = cidr::last_address(&net);

    let mut candidate = network;
    loop {
        if candidate != network && candidate != last && !reserved.contains(&candidate) {
            return Ok(candidate);
        }
        if candidate == last {
            break;
        }
        candidate = cidr::increment(candidate);
        if !net.contains(&candidate) {
            break;
        }
    }

    Err(Error::AddressExhausted(net.trunc().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn set(addrs: &[&str]) -> HashSet<IpAddr> {
        addrs.iter().map(|a| ip(a)).collect()
    }

    #[test]
    fn test_slash30_scenario() {
        assert_eq!(
            find_available("10.0.0.0/30", &set(&["10.0.0.1"])).unwrap(),
            ip("10.0.0.2")
        );
        assert!(matches!(
            find_available("10.0.0.0/30", &set(&["10.0.0.1", "10.0.0.2"])),
            Err(Error::AddressExhausted(_))
        ));
    }

    #[test]
    fn test_first_free_in_slash24() {
        assert_eq!(
            find_available("10.20.30.0/24", &HashSet::new()).unwrap(),
            ip("10.20.30.1")
        );
        assert_eq!(
            find_available("10.20.30.0/24", &set(&["10.20.30.1", "10.20.30.2", "10.20.30.4"]))
                .unwrap(),
            ip("10.20.30.3")
        );
    }

    #[test]
    fn test_host_bits_are_masked() {
        assert_eq!(
            find_available("10.20.30.77/24", &set(&["10.20.30.1"])).unwrap(),
            ip("10.20.30.2")
        );
    }

    #[test]
    fn test_never_returns_broadcast() {
        let reserved: HashSet<IpAddr> = (1..=253u8)
            .map(|last| IpAddr::from([10, 1, 1, last]))
            .collect();
        assert_eq!(
            find_available("10.1.1.0/24", &reserved).unwrap(),
            ip("10.1.1.254")
        );

        let mut full = reserved;
        full.insert(ip("10.1.1.254"));
        assert!(matches!(
            find_available("10.1.1.0/24", &full),
            Err(Error::AddressExhausted(subnet)) if subnet == "10.1.1.0/24"
        ));
    }

    #[test]
    fn test_tiny_subnets_are_exhausted() {
        assert!(matches!(
            find_available("10.0.0.0/31", &HashSet::new()),
            Err(Error::AddressExhausted(_))
        ));
        assert!(matches!(
            find_available("10.0.0.7/32", &HashSet::new()),
            Err(Error::AddressExhausted(_))
        ));
    }

    #[test]
    fn test_ipv6() {
        assert_eq!(
            find_available("fd00:abcd::/64", &set(&["fd00:abcd::1"])).unwrap(),
            ip("fd00:abcd::2")
        );
        assert!(matches!(
            find_available("fd00:abcd::/127", &HashSet::new()),
            Err(Error::AddressExhausted(_))
        ));
    }

    #[test]
    fn test_invalid_subnet() {
        assert!(matches!(
            find_available("10.0.0.0", &HashSet::new()),
            Err(Error::InvalidCidr(_))
        ));
    }
}
