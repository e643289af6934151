//! The mesh control plane.
//!
//! [`Mesh`] is the single entry point the API layer talks to. It owns the
//! process configuration, the record store, and the two locks that keep the
//! address space and the generated file consistent.
//!
//! # Locking
//!
//! - `write_lock` is held across every mutation together with the
//!   regeneration that follows it: persist → snapshot → render → atomic
//!   write. Client creation also allocates addresses under it, so two
//!   concurrent creations cannot claim the same free address.
//! - `bootstrap` is a one-time guard around first-run server creation.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, MutexGuard, OnceCell};
use tracing::{debug, info, warn};

use crate::allocator::find_available;
use crate::bootstrap::new_server;
use crate::cidr;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::file::write_atomic;
use crate::keys::{self, KeyPair};
use crate::model::{Client, Server};
use crate::render::{render, render_client};
use crate::reserved::reserved_addresses;
use crate::store::Store;

/// Address-space manager and config generator for one WireGuard interface.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use wgmesh::{Config, JsonStore, Mesh};
///
/// # async fn example() -> wgmesh::Result<()> {
/// let config = Arc::new(Config::default());
/// let store = JsonStore::open(&config.records_file).await?;
/// let mesh = Mesh::new(config, store);
///
/// let server = mesh.get_or_create_server().await?;
/// let address = mesh.allocate_address(&server.allowed_ips[1]).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Mesh<S> {
    config: Arc<Config>,
    store: S,
    write_lock: Mutex<()>,
    bootstrap: OnceCell<()>,
}

impl<S: Store> Mesh<S> {
    pub fn new(config: Arc<Config>, store: S) -> Self {
        Self {
            config,
            store,
            write_lock: Mutex::new(()),
            bootstrap: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the server record, creating it on first use.
    ///
    /// Creation generates keys and subnets, persists the record, and writes
    /// the config file. It runs at most once per `Mesh`; call this during
    /// startup, before serving requests.
    pub async fn get_or_create_server(&self) -> Result<Server> {
        if let Some(server) = self.store.load_server().await? {
            return Ok(server);
        }

        self.bootstrap
            .get_or_try_init(|| self.bootstrap_server())
            .await?;

        self.store
            .load_server()
            .await?
            .ok_or_else(|| Error::NotFound("server".to_string()))
    }

    async fn bootstrap_server(&self) -> Result<()> {
        let guard = self.write_lock.lock().await;

        if self.store.load_server().await?.is_some() {
            return Ok(());
        }

        let server = new_server(&self.config)?;
        self.store.save_server(&server).await?;
        info!(
            "Created server record with addresses {} (public key {})",
            server.address.join(", "),
            server.public_key
        );

        self.regenerate_locked(&guard).await
    }

    /// Validates and stores a new server record.
    ///
    /// The stored key pair and creation time are kept regardless of what the
    /// caller sent.
    pub async fn update_server(&self, mut server: Server) -> Result<Server> {
        let guard = self.write_lock.lock().await;

        let current = self
            .store
            .load_server()
            .await?
            .ok_or_else(|| Error::NotFound("server".to_string()))?;

        if let Err(error) = server.validate() {
            warn!("Rejected server update: {}", error);
            return Err(error);
        }

        server.private_key = current.private_key;
        server.public_key = current.public_key;
        server.created = current.created;
        server.updated = Utc::now();

        self.store.save_server(&server).await?;
        info!("Updated server record");

        self.regenerate_locked(&guard).await?;

        self.store
            .load_server()
            .await?
            .ok_or_else(|| Error::NotFound("server".to_string()))
    }

    /// Rewrites the config file from the current records.
    pub async fn regenerate(&self) -> Result<()> {
        let guard = self.write_lock.lock().await;
        self.regenerate_locked(&guard).await
    }

    /// Snapshot → render → atomic write. Callers must hold `write_lock`.
    async fn regenerate_locked(&self, _guard: &MutexGuard<'_, ()>) -> Result<()> {
        let path = self.config.wg_config_path().ok_or_else(|| {
            Error::Render("WireGuard config file path is not set".to_string())
        })?;

        let server = self
            .store
            .load_server()
            .await?
            .ok_or_else(|| Error::NotFound("server".to_string()))?;
        let clients = self.store.load_all_clients().await?;

        let contents = render(&clients, &server, &self.config.hooks)?;
        write_atomic(&path, contents.as_bytes())
            .await
            .map_err(|error| Error::Render(format!("writing {}: {}", path.display(), error)))?;

        info!(
            "Regenerated {} ({} of {} clients enabled)",
            path.display(),
            clients.iter().filter(|client| client.enable).count(),
            clients.len()
        );
        Ok(())
    }

    /// Raw bytes of the last generated config file.
    pub async fn read_generated_config(&self) -> Result<Vec<u8>> {
        let path = self.config.wg_config_path().ok_or_else(|| {
            Error::Render("WireGuard config file path is not set".to_string())
        })?;
        Ok(tokio::fs::read(&path).await?)
    }

    /// Every address currently held by the server or a client.
    pub async fn reserved_addresses(&self) -> Result<HashSet<IpAddr>> {
        let server = self.get_or_create_server().await?;
        let clients = self.store.load_all_clients().await?;
        Ok(reserved_addresses(&server, &clients))
    }

    /// Finds a free address in `subnet` without claiming it.
    ///
    /// The result is advisory: another caller may take it before it is
    /// saved. [`Mesh::create_client`] allocates and saves under one lock
    /// and is the race-free path.
    pub async fn allocate_address(&self, subnet: &str) -> Result<IpAddr> {
        self.get_or_create_server().await?;
        let guard = self.write_lock.lock().await;
        let server = self.load_server_locked(&guard).await?;
        let clients = self.store.load_all_clients().await?;
        find_available(subnet, &reserved_addresses(&server, &clients))
    }

    /// Server record as seen under `write_lock`, after bootstrap has run.
    async fn load_server_locked(&self, _guard: &MutexGuard<'_, ()>) -> Result<Server> {
        self.store
            .load_server()
            .await?
            .ok_or_else(|| Error::NotFound("server".to_string()))
    }

    pub async fn read_client(&self, id: &str) -> Result<Client> {
        self.store.load_client(id).await
    }

    /// All clients, oldest first (ties broken by id).
    pub async fn list_clients(&self) -> Result<Vec<Client>> {
        let mut clients = self.store.load_all_clients().await?;
        clients.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        Ok(clients)
    }

    /// Creates a client, filling in what the caller left empty.
    ///
    /// - `id` is always freshly generated.
    /// - A supplied private key determines the public key. A public key
    ///   supplied alone is kept, for peers that hold their own private key.
    ///   With neither, a fresh pair is generated.
    /// - A missing preshared key is generated.
    /// - An empty `address` gets one free address per server subnet, as a
    ///   `/32` or `/128`.
    /// - An empty `allowed_ips` defaults to the assigned addresses.
    ///
    /// Addresses supplied by the caller must not already be in use.
    pub async fn create_client(&self, mut client: Client) -> Result<Client> {
        self.get_or_create_server().await?;
        let guard = self.write_lock.lock().await;
        let server = self.load_server_locked(&guard).await?;

        client.id = uuid::Uuid::new_v4().to_string();

        if !resolve_keys(&mut client)? {
            let pair = KeyPair::generate();
            client.private_key = pair.private_key;
            client.public_key = pair.public_key;
        }
        if client.preshared_key.is_empty() {
            client.preshared_key = keys::generate_preshared_key()?;
        }

        let clients = self.store.load_all_clients().await?;
        let mut reserved = reserved_addresses(&server, &clients);

        if client.address.is_empty() {
            for subnet in &server.address {
                let addr = find_available(subnet, &reserved)?;
                reserved.insert(addr);
                client.address.push(format!("{}/{}", addr, cidr::host_prefix(addr)));
            }
        } else {
            check_conflicts(&client, &reserved)?;
        }

        if client.allowed_ips.is_empty() {
            client.allowed_ips = client.address.clone();
        }

        let now = Utc::now();
        client.created = now;
        client.updated = now;

        if let Err(error) = client.validate() {
            warn!("Rejected new client {:?}: {}", client.name, error);
            return Err(error);
        }

        self.store.save_client(&client).await?;
        info!(
            "Created client {} ({}) with addresses {}",
            client.id,
            client.name,
            client.address.join(", ")
        );

        self.regenerate_locked(&guard).await?;
        Ok(client)
    }

    /// Replaces a client in place.
    ///
    /// The id and creation audit fields never change. A supplied private key
    /// always determines the public key. Without one, the stored pair is kept
    /// unless a different public key is supplied, which then replaces the
    /// pair and leaves the private key with the peer.
    pub async fn update_client(&self, id: &str, mut client: Client) -> Result<Client> {
        self.get_or_create_server().await?;
        let guard = self.write_lock.lock().await;
        let server = self.load_server_locked(&guard).await?;

        let current = self.store.load_client(id).await?;

        client.id = current.id.clone();
        client.created = current.created;
        client.created_by = current.created_by.clone();
        if client.private_key.is_empty() && client.public_key == current.public_key {
            client.public_key.clear();
        }
        if !resolve_keys(&mut client)? {
            client.private_key = current.private_key.clone();
            client.public_key = current.public_key.clone();
        }

        let others: Vec<Client> = self
            .store
            .load_all_clients()
            .await?
            .into_iter()
            .filter(|other| other.id != current.id)
            .collect();
        check_conflicts(&client, &reserved_addresses(&server, &others))?;

        if let Err(error) = client.validate() {
            warn!("Rejected update to client {}: {}", id, error);
            return Err(error);
        }

        client.updated = Utc::now();
        self.store.save_client(&client).await?;
        info!("Updated client {} ({})", client.id, client.name);

        self.regenerate_locked(&guard).await?;
        Ok(client)
    }

    /// Turns a client's peer block on or off.
    pub async fn set_client_enabled(&self, id: &str, enable: bool) -> Result<Client> {
        let guard = self.write_lock.lock().await;

        let mut client = self.store.load_client(id).await?;
        if client.enable == enable {
            debug!("Client {} already has enable={}", id, enable);
            return Ok(client);
        }

        client.enable = enable;
        client.updated = Utc::now();
        self.store.save_client(&client).await?;
        info!(
            "{} client {} ({})",
            if enable { "Enabled" } else { "Disabled" },
            client.id,
            client.name
        );

        self.regenerate_locked(&guard).await?;
        Ok(client)
    }

    /// Removes a client. Its addresses become free on the next allocation.
    pub async fn delete_client(&self, id: &str) -> Result<()> {
        let guard = self.write_lock.lock().await;

        self.store.delete_client(id).await?;
        info!("Deleted client {}", id);

        self.regenerate_locked(&guard).await
    }

    /// The config file a client installs on its own side.
    pub async fn client_config(&self, id: &str) -> Result<String> {
        let server = self.get_or_create_server().await?;
        let client = self.store.load_client(id).await?;
        render_client(&client, &server)
    }

    /// Runs the configured reload command through `sh -c`.
    ///
    /// Does nothing when no command is configured.
    pub async fn reload(&self) -> Result<()> {
        let Some(command) = self.config.reload_command.as_deref() else {
            debug!("No reload command configured");
            return Ok(());
        };

        info!("Executing reload command: {}", command);
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|error| Error::Reload(format!("{}: {}", command, error)))?;

        if !output.status.success() {
            return Err(Error::Reload(format!(
                "{} exited with {}: {}",
                command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        if !output.stdout.is_empty() {
            debug!(
                "Reload command output: {}",
                String::from_utf8_lossy(&output.stdout).trim()
            );
        }
        Ok(())
    }
}

/// Settles the client's key pair from what the caller supplied.
///
/// A private key always wins and its public half is derived from it. A
/// public key alone is checked and kept. Returns `false` when neither is set.
fn resolve_keys(client: &mut Client) -> Result<bool> {
    if !client.private_key.is_empty() {
        client.public_key = KeyPair::from_private_key(&client.private_key)?.public_key;
        Ok(true)
    } else if !client.public_key.is_empty() {
        keys::validate_key(&client.public_key)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Rejects a client whose addresses are already held by someone else.
fn check_conflicts(client: &Client, reserved: &HashSet<IpAddr>) -> Result<()> {
    let conflicts: Vec<String> = client
        .address
        .iter()
        .filter_map(|entry| cidr::address_of(entry).ok())
        .filter(|addr| reserved.contains(addr))
        .map(|addr| format!("address {} is already in use", addr))
        .collect();

    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidInput(conflicts))
    }
}
