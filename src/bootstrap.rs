//! First-run construction of the server record.

use chrono::Utc;

use crate::cidr;
use crate::config::Config;
use crate::error::Result;
use crate::keys::KeyPair;
use crate::model::Server;

/// Builds a brand-new server record: fresh key pair, a random ULA `/64` and
/// a random `10.x.y.0/24`, with the first usable address of each as the
/// server's tunnel address and DNS.
///
/// Nothing is persisted here. See [`Mesh::get_or_create_server`](crate::Mesh::get_or_create_server).
pub fn new_server(config: &Config) -> Result<Server> {
    let keys = KeyPair::generate();

    let ipv6_subnet = cidr::random_ula_subnet()?;
    let ipv6 = cidr::first_usable(&ipv6_subnet)?;

    let ipv4_subnet = cidr::random_ipv4_subnet()?;
    let ipv4 = cidr::first_usable(&ipv4_subnet)?;

    let now = Utc::now();
    Ok(Server {
        address: vec![format!("{}/64", ipv6), format!("{}/24", ipv4)],
        listen_port: config.listen_port,
        mtu: config.mtu,
        private_key: keys.private_key,
        public_key: keys.public_key,
        endpoint: config.default_endpoint.clone(),
        persistent_keepalive: config.persistent_keepalive,
        dns: vec![ipv6.to_string(), ipv4.to_string()],
        allowed_ips: vec![ipv6_subnet, ipv4_subnet],
        table: String::new(),
        updated_by: String::new(),
        created: now,
        updated: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys;
    use std::net::IpAddr;

    #[test]
    fn test_new_server_shape() {
        let server = new_server(&Config::default()).unwrap();

        assert!(server.validate().is_ok());
        assert!(keys::validate_key(&server.private_key).is_ok());
        assert_eq!(
            KeyPair::from_private_key(&server.private_key)
                .unwrap()
                .public_key,
            server.public_key
        );
        assert_eq!(server.listen_port, 51820);
        assert_eq!(server.persistent_keepalive, 25);
        assert_eq!(server.created, server.updated);

        assert_eq!(server.address.len(), 2);
        assert!(server.address[0].ends_with("/64"));
        assert!(server.address[1].ends_with("/24"));
        assert!(server.address[0].starts_with("fd"));
        assert!(server.address[1].starts_with("10."));
    }

    #[test]
    fn test_server_address_is_first_usable_of_subnet() {
        let server = new_server(&Config::default()).unwrap();

        for (address, subnet) in server.address.iter().zip(&server.allowed_ips) {
            let addr = cidr::address_of(address).unwrap();
            let net = cidr::parse(subnet).unwrap();
            assert!(net.contains(&addr));
            assert_eq!(addr, cidr::increment(net.network()));
        }

        let dns: Vec<IpAddr> = server.dns.iter().map(|d| d.parse().unwrap()).collect();
        let addresses: Vec<IpAddr> = server
            .address
            .iter()
            .map(|a| cidr::address_of(a).unwrap())
            .collect();
        assert_eq!(dns, addresses);
    }

    #[test]
    fn test_uses_config_defaults() {
        let config = Config {
            default_endpoint: "vpn.example.org:4500".to_string(),
            listen_port: 4500,
            mtu: 1380,
            ..Default::default()
        };
        let server = new_server(&config).unwrap();
        assert_eq!(server.endpoint, "vpn.example.org:4500");
        assert_eq!(server.listen_port, 4500);
        assert_eq!(server.mtu, 1380);
    }
}
