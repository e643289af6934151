//! # wgmesh
//!
//! Address-space manager and config generator for a WireGuard VPN server.
//!
//! ## Features
//!
//! - Dual-stack bootstrap: random ULA `/64` plus random `10.x.y.0/24`
//! - Collision-free allocation of client tunnel addresses
//! - Deterministic rendering of the interface config with lifecycle hooks
//! - Atomic config writes (readers see the old or the new file, never a mix)
//! - Client lifecycle: create, update, enable/disable, delete
//! - Per-client config rendering for the peer side
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use wgmesh::{Config, JsonStore, Mesh, Client};
//!
//! #[tokio::main]
//! async fn main() -> wgmesh::Result<()> {
//!     let config = Arc::new(Config::load_or_create("config.json")?);
//!     let store = JsonStore::open(&config.records_file).await?;
//!     let mesh = Mesh::new(config, store);
//!
//!     mesh.get_or_create_server().await?;
//!     let client = mesh
//!         .create_client(Client {
//!             name: "laptop".to_string(),
//!             enable: true,
//!             ..Default::default()
//!         })
//!         .await?;
//!     println!("{}", mesh.client_config(&client.id).await?);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`Config`] - Process configuration (output path, hooks, defaults)
//! - [`Mesh`] - Locking, bootstrap, and the regenerate-after-write rule
//! - [`Store`] - Record persistence ([`JsonStore`], [`MemoryStore`])
//! - [`cidr`] - Subnet arithmetic and random subnet generation
//! - [`find_available`] - Next free address in a subnet
//! - [`render()`] - Interface config text

pub mod allocator;
pub mod bootstrap;
pub mod cidr;
pub mod config;
pub mod error;
pub mod file;
pub mod keys;
pub mod mesh;
pub mod model;
pub mod render;
pub mod reserved;
pub mod store;

pub use allocator::find_available;
pub use config::{Config, Hooks};
pub use error::{Error, Result};
pub use keys::KeyPair;
pub use mesh::Mesh;
pub use model::{Client, Server};
pub use render::{render, render_client};
pub use reserved::reserved_addresses;
pub use store::{JsonStore, MemoryStore, Records, Store};
