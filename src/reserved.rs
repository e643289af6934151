//! Addresses currently held by the server and its clients.

use std::collections::HashSet;
use std::net::IpAddr;

use tracing::warn;

use crate::cidr;
use crate::model::{Client, Server};

/// Collects the address part of every `Address` CIDR on the server and on
/// every client, enabled or not.
///
/// Malformed entries are logged and skipped; one bad record must not block
/// allocation for everyone else.
pub fn reserved_addresses(server: &Server, clients: &[Client]) -> HashSet<IpAddr> {
    let mut reserved = HashSet::new();

    for client in clients {
        for entry in &client.address {
            match cidr::address_of(entry) {
                Ok(addr) => {
                    reserved.insert(addr);
                }
                Err(error) => warn!(
                    "Skipping malformed address on client {} ({}): {}",
                    client.id, client.name, error
                ),
            }
        }
    }

    for entry in &server.address {
        match cidr::address_of(entry) {
            Ok(addr) => {
                reserved.insert(addr);
            }
            Err(error) => warn!("Skipping malformed server address: {}", error),
        }
    }

    reserved
}
