use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use wgmesh::{Client, Error, Hooks, Server, cidr, find_available, render};

fn ipv4_subnet() -> impl Strategy<Value = (Ipv4Addr, u8)> {
    (any::<u32>(), 8u8..=32).prop_map(|(bits, prefix)| (Ipv4Addr::from(bits), prefix))
}

fn ipv6_subnet() -> impl Strategy<Value = (Ipv6Addr, u8)> {
    (any::<u128>(), 64u8..=128).prop_map(|(bits, prefix)| (Ipv6Addr::from(bits), prefix))
}

fn test_server() -> Server {
    let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    Server {
        address: vec!["fd00:1::1/64".to_string(), "10.8.0.1/24".to_string()],
        listen_port: 51820,
        private_key: "server-private".to_string(),
        public_key: "server-public".to_string(),
        endpoint: "vpn.example.com:51820".to_string(),
        persistent_keepalive: 25,
        created: at,
        updated: at,
        ..Default::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2000))]

    #[test]
    fn first_usable_is_inside_and_not_network((addr, prefix) in ipv4_subnet()) {
        let subnet = format!("{}/{}", addr, prefix);
        let net = cidr::parse(&subnet).unwrap();
        let first = cidr::first_usable(&subnet).unwrap();

        prop_assert_ne!(first, net.network());
        if prefix < 32 {
            prop_assert!(net.contains(&first));
        }
    }

    #[test]
    fn ipv4_broadcast_is_network_or_inverted_mask((addr, prefix) in ipv4_subnet()) {
        let subnet = format!("{}/{}", addr, prefix);
        let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
        let expected = Ipv4Addr::from((u32::from(addr) & mask) | !mask);

        prop_assert_eq!(cidr::broadcast_or_last(&subnet).unwrap(), IpAddr::V4(expected));
    }

    #[test]
    fn increment_matches_integer_addition(bits: u32) {
        let next = cidr::increment(IpAddr::V4(Ipv4Addr::from(bits)));
        prop_assert_eq!(next, IpAddr::V4(Ipv4Addr::from(bits.wrapping_add(1))));
    }

    #[test]
    fn increment_matches_integer_addition_v6(bits: u128) {
        let next = cidr::increment(IpAddr::V6(Ipv6Addr::from(bits)));
        prop_assert_eq!(next, IpAddr::V6(Ipv6Addr::from(bits.wrapping_add(1))));
    }

    #[test]
    fn find_available_skips_network_last_and_reserved(
        (addr, prefix) in (any::<u32>(), 24u8..=32).prop_map(|(b, p)| (Ipv4Addr::from(b), p)),
        offsets in prop::collection::vec(0u32..256, 0..64)
    ) {
        let subnet = format!("{}/{}", addr, prefix);
        let net = cidr::parse(&subnet).unwrap();
        let network = net.network();
        let last = cidr::broadcast_or_last(&subnet).unwrap();

        let (base, top) = match (network, last) {
            (IpAddr::V4(low), IpAddr::V4(high)) => (u32::from(low), u32::from(high)),
            _ => unreachable!(),
        };
        let reserved: HashSet<IpAddr> = offsets
            .iter()
            .map(|offset| IpAddr::V4(Ipv4Addr::from(base.wrapping_add(*offset))))
            .filter(|candidate| net.contains(candidate))
            .collect();

        match find_available(&subnet, &reserved) {
            Ok(found) => {
                prop_assert!(net.contains(&found));
                prop_assert_ne!(found, network);
                prop_assert_ne!(found, last);
                prop_assert!(!reserved.contains(&found));

                // Lowest qualifying address wins.
                let mut probe = cidr::increment(network);
                while probe != found {
                    prop_assert!(reserved.contains(&probe));
                    probe = cidr::increment(probe);
                }
            }
            Err(Error::AddressExhausted(_)) => {
                let host_count = u64::from(top - base).saturating_sub(1);
                let reserved_hosts = reserved
                    .iter()
                    .filter(|candidate| **candidate != network && **candidate != last)
                    .count() as u64;
                prop_assert_eq!(reserved_hosts, host_count);
            }
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }

    #[test]
    fn find_available_ipv6_never_returns_edges(
        (addr, prefix) in ipv6_subnet(),
        taken in 0usize..8
    ) {
        let subnet = format!("{}/{}", addr, prefix);
        let net = cidr::parse(&subnet).unwrap();

        let mut reserved = HashSet::new();
        let mut probe = cidr::increment(net.network());
        for _ in 0..taken {
            reserved.insert(probe);
            probe = cidr::increment(probe);
        }

        if let Ok(found) = find_available(&subnet, &reserved) {
            prop_assert!(net.contains(&found));
            prop_assert_ne!(found, net.network());
            prop_assert_ne!(found, cidr::broadcast_or_last(&subnet).unwrap());
            prop_assert!(!reserved.contains(&found));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn render_ignores_input_order(
        peers in prop::collection::vec((any::<bool>(), 0i64..5, any::<u16>()), 0..12)
    ) {
        let clients: Vec<Client> = peers
            .iter()
            .enumerate()
            .map(|(index, (enable, created, keepalive))| {
                let at = Utc.timestamp_opt(1_700_000_000 + created, 0).unwrap();
                Client {
                    id: format!("client-{:02}", index),
                    name: format!("peer-{}", index),
                    enable: *enable,
                    ignore_persistent_keepalive: keepalive % 3 == 0,
                    keepalive_interval: u32::from(*keepalive),
                    public_key: format!("public-{}", index),
                    allowed_ips: vec![format!("10.8.0.{}/32", index + 2)],
                    address: vec![format!("10.8.0.{}/32", index + 2)],
                    created: at,
                    updated: at,
                    ..Default::default()
                }
            })
            .collect();
        let mut reversed = clients.clone();
        reversed.reverse();

        let server = test_server();
        let hooks = Hooks::default();
        let forward = render(&clients, &server, &hooks).unwrap();
        let backward = render(&reversed, &server, &hooks).unwrap();

        prop_assert_eq!(&forward, &backward);
        prop_assert_eq!(
            forward.matches("[Peer]").count(),
            clients.iter().filter(|client| client.enable).count()
        );
    }
}
