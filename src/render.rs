//! WireGuard configuration synthesis.
//!
//! Rendering is a pure function of the record snapshot it is handed: no
//! clock reads, no randomness, and clients are sorted before output, so the
//! same records always give the same bytes.

use std::fmt::{self, Write};
use std::net::Ipv6Addr;

use chrono::{DateTime, Utc};

use crate::config::Hooks;
use crate::error::{Error, Result};
use crate::model::{Client, Server};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Renders the server-side daemon config: one `[Interface]` block and one
/// `[Peer]` block per enabled client.
pub fn render(clients: &[Client], server: &Server, hooks: &Hooks) -> Result<String> {
    let mut enabled: Vec<&Client> = clients.iter().filter(|client| client.enable).collect();
    enabled.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));

    let mut out = String::new();
    write_server(&mut out, &enabled, server, hooks)
        .map_err(|error| Error::Render(format!("formatting server config: {}", error)))?;
    Ok(out)
}

/// Renders the config file a client installs on its own side, with the
/// server as its single peer.
pub fn render_client(client: &Client, server: &Server) -> Result<String> {
    let mut out = String::new();
    write_client(&mut out, client, server).map_err(|error| {
        Error::Render(format!("formatting config for client {}: {}", client.id, error))
    })?;
    Ok(out)
}

/// `AllowedIPs` for the client's peer block on the server: its own
/// `AllowedIPs`, plus its `LANIPs` when it fronts a site.
pub fn peer_allowed_ips(client: &Client) -> Vec<&str> {
    let mut allowed: Vec<&str> = client.allowed_ips.iter().map(String::as_str).collect();
    if client.site2site {
        for lan in &client.lan_ips {
            if !allowed.contains(&lan.as_str()) {
                allowed.push(lan);
            }
        }
    }
    allowed
}

/// Keepalive seconds for a client, or `None` to omit the directive.
///
/// Disabled wins; an ignored server default falls back to the client's own
/// interval; otherwise the server default applies when non-zero.
pub fn peer_keepalive(client: &Client, server_default: u16) -> Option<u32> {
    if client.keepalive_disabled {
        None
    } else if client.ignore_persistent_keepalive {
        (client.keepalive_interval > 0).then_some(client.keepalive_interval)
    } else {
        (server_default > 0).then_some(u32::from(server_default))
    }
}

/// `host:port` of a site-to-site peer reachable at a fixed endpoint.
///
/// The port is `site2SiteEndpointPort`, falling back to the server's listen
/// port when unset. IPv6 literals are bracketed.
pub fn peer_endpoint(client: &Client, server: &Server) -> Option<String> {
    if !client.site2site || client.site2site_endpoint.is_empty() {
        return None;
    }
    let port = if client.site2site_endpoint_port != 0 {
        client.site2site_endpoint_port
    } else {
        u32::from(server.listen_port)
    };
    let host = client.site2site_endpoint.trim();
    if host.parse::<Ipv6Addr>().is_ok() {
        Some(format!("[{}]:{}", host, port))
    } else {
        Some(format!("{}:{}", host, port))
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

fn write_list(out: &mut String, key: &str, values: &[impl AsRef<str>]) -> fmt::Result {
    if values.is_empty() {
        return Ok(());
    }
    let joined: Vec<&str> = values.iter().map(AsRef::as_ref).collect();
    writeln!(out, "{} = {}", key, joined.join(", "))
}

fn write_hook(out: &mut String, key: &str, command: Option<&String>) -> fmt::Result {
    match command.map(|cmd| cmd.trim()).filter(|cmd| !cmd.is_empty()) {
        Some(cmd) => writeln!(out, "{} = {}", key, cmd),
        None => Ok(()),
    }
}

fn write_server(
    out: &mut String,
    clients: &[&Client],
    server: &Server,
    hooks: &Hooks,
) -> fmt::Result {
    writeln!(out, "# Generated by wgmesh. Local edits are overwritten.")?;
    writeln!(
        out,
        "# Updated: {} / Created: {}",
        timestamp(&server.updated),
        timestamp(&server.created)
    )?;
    writeln!(out, "[Interface]")?;
    write_list(out, "Address", &server.address)?;
    writeln!(out, "ListenPort = {}", server.listen_port)?;
    writeln!(out, "PrivateKey = {}", server.private_key)?;
    if server.mtu > 0 {
        writeln!(out, "MTU = {}", server.mtu)?;
    }
    if !server.table.is_empty() {
        writeln!(out, "Table = {}", server.table)?;
    }
    write_hook(out, "PreUp", hooks.pre_up.as_ref())?;
    write_hook(out, "PostUp", hooks.post_up.as_ref())?;
    write_hook(out, "PreDown", hooks.pre_down.as_ref())?;
    write_hook(out, "PostDown", hooks.post_down.as_ref())?;

    for client in clients {
        writeln!(out)?;
        write_peer_comment(out, client)?;
        writeln!(out, "[Peer]")?;
        writeln!(out, "PublicKey = {}", client.public_key)?;
        if !client.preshared_key.is_empty() {
            writeln!(out, "PresharedKey = {}", client.preshared_key)?;
        }
        write_list(out, "AllowedIPs", &peer_allowed_ips(client))?;
        if let Some(endpoint) = peer_endpoint(client, server) {
            writeln!(out, "Endpoint = {}", endpoint)?;
        }
        if let Some(keepalive) = peer_keepalive(client, server.persistent_keepalive) {
            writeln!(out, "PersistentKeepalive = {}", keepalive)?;
        }
    }

    Ok(())
}

/// Comment text with control characters blanked, so it stays one line.
fn comment_text(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

fn write_peer_comment(out: &mut String, client: &Client) -> fmt::Result {
    write!(out, "# {}", comment_text(&client.name))?;
    if !client.email.is_empty() {
        write!(out, " / {}", comment_text(&client.email))?;
    }
    writeln!(
        out,
        " / Updated: {} / Created: {}",
        timestamp(&client.updated),
        timestamp(&client.created)
    )
}

fn write_client(out: &mut String, client: &Client, server: &Server) -> fmt::Result {
    write_peer_comment(out, client)?;
    writeln!(out, "[Interface]")?;
    write_list(out, "Address", &client.address)?;
    // Empty when the peer keeps its own private key.
    if !client.private_key.is_empty() {
        writeln!(out, "PrivateKey = {}", client.private_key)?;
    }
    if client.site2site
        && client.site2site_endpoint_options_enabled
        && client.site2site_endpoint_listen_port != 0
    {
        writeln!(out, "ListenPort = {}", client.site2site_endpoint_listen_port)?;
    }
    if client.use_remote_dns {
        write_list(out, "DNS", &server.dns)?;
    }
    if server.mtu > 0 {
        writeln!(out, "MTU = {}", server.mtu)?;
    }
    if !client.table.is_empty() {
        writeln!(out, "Table = {}", client.table)?;
    }

    writeln!(out)?;
    writeln!(out, "[Peer]")?;
    writeln!(out, "PublicKey = {}", server.public_key)?;
    if !client.preshared_key.is_empty() {
        writeln!(out, "PresharedKey = {}", client.preshared_key)?;
    }
    write_list(out, "AllowedIPs", &server.allowed_ips)?;
    writeln!(out, "Endpoint = {}", server.endpoint)?;
    if let Some(keepalive) = peer_keepalive(client, server.persistent_keepalive) {
        writeln!(out, "PersistentKeepalive = {}", keepalive)?;
    }

    Ok(())
}
