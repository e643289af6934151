//! Subnet arithmetic over IPv4 and IPv6 CIDRs.
//!
//! Everything here is a pure function: addresses are `Copy` values and every
//! helper returns a new address rather than mutating one in place.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::IpNet;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{Error, Result};

/// First byte of every generated ULA prefix (`fd00::/8`, L bit set).
const ULA_PREFIX: u8 = 0xfd;

/// Parses `address/prefix`, accepting host bits in the address part.
///
/// `10.0.0.5/24` parses, and [`IpNet::addr`] keeps `10.0.0.5` while
/// [`IpNet::network`] yields `10.0.0.0`.
pub fn parse(cidr: &str) -> Result<IpNet> {
    cidr.trim()
        .parse::<IpNet>()
        .map_err(|error| Error::InvalidCidr(format!("{}: {}", cidr, error)))
}

pub fn is_valid(cidr: &str) -> bool {
    parse(cidr).is_ok()
}

/// Returns the address portion of a CIDR, ignoring the prefix length.
pub fn address_of(cidr: &str) -> Result<IpAddr> {
    parse(cidr).map(|net| net.addr())
}

/// Network address plus one.
pub fn first_usable(cidr: &str) -> Result<IpAddr> {
    let net = parse(cidr)?;
    Ok(increment(net.network()))
}

/// Network address OR inverted mask.
///
/// For IPv4 this is the broadcast address; IPv6 has no broadcast, but the
/// same construction gives the last address of the subnet, which is kept out
/// of allocation as well.
pub fn broadcast_or_last(cidr: &str) -> Result<IpAddr> {
    let net = parse(cidr)?;
    Ok(last_address(&net))
}

pub(crate) fn last_address(net: &IpNet) -> IpAddr {
    match (net.network(), net.hostmask()) {
        (IpAddr::V4(network), IpAddr::V4(hostmask)) => {
            IpAddr::V4(Ipv4Addr::from(u32::from(network) | u32::from(hostmask)))
        }
        (IpAddr::V6(network), IpAddr::V6(hostmask)) => {
            IpAddr::V6(Ipv6Addr::from(u128::from(network) | u128::from(hostmask)))
        }
        // network() and hostmask() always share a family
        (network, _) => network,
    }
}

/// Adds one to the address as a big-endian byte string.
///
/// Carries from the least-significant byte and wraps silently past the top.
pub fn increment(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V4(v4) => {
            let mut octets = v4.octets();
            increment_bytes(&mut octets);
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        IpAddr::V6(v6) => {
            let mut octets = v6.octets();
            increment_bytes(&mut octets);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
    }
}

fn increment_bytes(bytes: &mut [u8]) {
    for byte in bytes.iter_mut().rev() {
        *byte = byte.wrapping_add(1);
        if *byte != 0 {
            break;
        }
    }
}

/// Host-length prefix for a single address of this family (`/32` or `/128`).
pub fn host_prefix(addr: IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|error| Error::Random(error.to_string()))?;
    Ok(bytes)
}

/// Generates a random IPv6 unique-local `/64` (RFC 4193).
///
/// Layout: `fd`, 5 random bytes of global ID, 2 random bytes of subnet ID,
/// 8 zero bytes of interface ID.
pub fn random_ula_subnet() -> Result<String> {
    let global_id: [u8; 5] = random_bytes()?;
    let subnet_id: [u8; 2] = random_bytes()?;

    let mut octets = [0u8; 16];
    octets[0] = ULA_PREFIX;
    octets[1..6].copy_from_slice(&global_id);
    octets[6..8].copy_from_slice(&subnet_id);

    Ok(format!("{}/64", Ipv6Addr::from(octets)))
}

/// Generates a random `/24` inside `10.0.0.0/8`.
///
/// `10.0.0.0/24` is a common LAN default, so it is remapped to `10.0.1.0/24`.
pub fn random_ipv4_subnet() -> Result<String> {
    let [second, mut third]: [u8; 2] = random_bytes()?;
    if second == 0 && third == 0 {
        third = 1;
    }
    Ok(format!("10.{}.{}.0/24", second, third))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_host_bits() {
        let net = parse("10.0.0.5/24").unwrap();
        assert_eq!(net.addr(), "10.0.0.5".parse::<IpAddr>().unwrap());
        assert_eq!(net.network(), "10.0.0.0".parse::<IpAddr>().unwrap());
        assert_eq!(net.prefix_len(), 24);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse("10.0.0.5"), Err(Error::InvalidCidr(_))));
        assert!(matches!(parse("10.0.0.0/33"), Err(Error::InvalidCidr(_))));
        assert!(matches!(parse("not-a-cidr"), Err(Error::InvalidCidr(_))));
        assert!(!is_valid(""));
        assert!(is_valid("fd00::/64"));
    }

    #[test]
    fn test_address_of() {
        assert_eq!(
            address_of("fd12:3456::1/64").unwrap(),
            "fd12:3456::1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_first_usable() {
        assert_eq!(
            first_usable("10.20.30.0/24").unwrap(),
            IpAddr::V4(Ipv4Addr::new(10, 20, 30, 1))
        );
        assert_eq!(
            first_usable("10.20.30.77/24").unwrap(),
            IpAddr::V4(Ipv4Addr::new(10, 20, 30, 1))
        );
        assert_eq!(
            first_usable("fd01:2:3:4::/64").unwrap(),
            "fd01:2:3:4::1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_broadcast_or_last() {
        assert_eq!(
            broadcast_or_last("192.168.1.0/24").unwrap(),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 255))
        );
        assert_eq!(
            broadcast_or_last("10.0.0.0/30").unwrap(),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3))
        );
        assert_eq!(
            broadcast_or_last("fd00:1::/64").unwrap(),
            "fd00:1::ffff:ffff:ffff:ffff".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_increment_carries() {
        assert_eq!(
            increment(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 255))),
            IpAddr::V4(Ipv4Addr::new(10, 0, 1, 0))
        );
        assert_eq!(
            increment(IpAddr::V4(Ipv4Addr::new(10, 255, 255, 255))),
            IpAddr::V4(Ipv4Addr::new(11, 0, 0, 0))
        );
        assert_eq!(
            increment("fd00::ffff".parse().unwrap()),
            "fd00::1:0".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_increment_wraps() {
        assert_eq!(
            increment(IpAddr::V4(Ipv4Addr::BROADCAST)),
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        );
        assert_eq!(
            increment(IpAddr::V6(Ipv6Addr::from(u128::MAX))),
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        );
    }

    #[test]
    fn test_random_ula_subnet_shape() {
        let subnet = random_ula_subnet().unwrap();
        let net = parse(&subnet).unwrap();
        assert_eq!(net.prefix_len(), 64);
        let IpAddr::V6(addr) = net.addr() else {
            panic!("expected IPv6, got {}", subnet);
        };
        let octets = addr.octets();
        assert_eq!(octets[0], ULA_PREFIX);
        assert_eq!(octets[0] & 0xc0, 0xc0);
        assert!(octets[8..].iter().all(|byte| *byte == 0));
    }

    #[test]
    fn test_random_ula_subnets_do_not_collide() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(random_ula_subnet().unwrap()));
        }
    }

    #[test]
    fn test_random_ipv4_subnet_shape() {
        for _ in 0..1000 {
            let subnet = random_ipv4_subnet().unwrap();
            assert_ne!(subnet, "10.0.0.0/24");
            let net = parse(&subnet).unwrap();
            assert_eq!(net.prefix_len(), 24);
            let IpAddr::V4(addr) = net.addr() else {
                panic!("expected IPv4, got {}", subnet);
            };
            assert_eq!(addr.octets()[0], 10);
            assert_eq!(addr.octets()[3], 0);
        }
    }
}
