//! Record persistence.
//!
//! The mesh treats persistence as a key-value collaborator reached through
//! the [`Store`] trait. Two implementations ship with the crate:
//!
//! - [`JsonStore`] keeps every record in one JSON file, rewritten atomically
//!   on each change.
//! - [`MemoryStore`] keeps records in memory only.
//!
//! # Thread Safety
//!
//! Both stores use a [`RwLock`] over the record set. [`JsonStore`] adds a
//! [`Mutex`] around file writes so two saves never interleave.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::{Error, Result};
use crate::file::write_atomic;
use crate::model::{Client, Server};

/// Load/save/delete access to Server and Client records.
///
/// A missing server is `Ok(None)`; a missing client is [`Error::NotFound`].
pub trait Store: Send + Sync {
    fn load_server(&self) -> impl Future<Output = Result<Option<Server>>> + Send;

    fn save_server(&self, server: &Server) -> impl Future<Output = Result<()>> + Send;

    fn load_client(&self, id: &str) -> impl Future<Output = Result<Client>> + Send;

    fn load_all_clients(&self) -> impl Future<Output = Result<Vec<Client>>> + Send;

    fn save_client(&self, client: &Client) -> impl Future<Output = Result<()>> + Send;

    fn delete_client(&self, id: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Serialized record set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Records {
    pub server: Option<Server>,
    /// Clients indexed by id.
    #[serde(default)]
    pub clients: BTreeMap<String, Client>,
}

impl Records {
    fn client(&self, id: &str) -> Result<Client> {
        self.clients
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("client {}", id)))
    }
}

/// File-backed store holding every record in one JSON document.
#[derive(Debug)]
pub struct JsonStore {
    records: RwLock<Records>,
    path: PathBuf,
    /// Mutex to prevent concurrent file writes.
    save_lock: Mutex<()>,
}

impl JsonStore {
    /// Opens the store, loading existing records if the file exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file exists but cannot be read or parsed.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = Self::load_records(&path).await?;
        debug!(
            "Opened record store {} ({} clients)",
            path.display(),
            records.clients.len()
        );
        Ok(Self {
            records: RwLock::new(records),
            path,
            save_lock: Mutex::new(()),
        })
    }

    async fn load_records(path: &Path) -> Result<Records> {
        if !path.exists() {
            return Ok(Records::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|error| Error::Storage(format!("reading {}: {}", path.display(), error)))?;
        serde_json::from_str(&content)
            .map_err(|error| Error::Storage(format!("parsing {}: {}", path.display(), error)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `change` to a copy of the records, writes the copy, and only
    /// then publishes it, so a failed write leaves memory and disk unchanged.
    async fn commit<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Records) -> Result<()>,
    {
        let _lock = self.save_lock.lock().await;
        let mut next = self.records.read().await.clone();
        change(&mut next)?;

        let content = serde_json::to_string_pretty(&next)
            .map_err(|error| Error::Storage(error.to_string()))?;
        write_atomic(&self.path, content.as_bytes())
            .await
            .map_err(|error| Error::Storage(format!("writing {}: {}", self.path.display(), error)))?;

        *self.records.write().await = next;
        Ok(())
    }
}

impl Store for JsonStore {
    async fn load_server(&self) -> Result<Option<Server>> {
        Ok(self.records.read().await.server.clone())
    }

    async fn save_server(&self, server: &Server) -> Result<()> {
        let server = server.clone();
        self.commit(move |records| {
            records.server = Some(server);
            Ok(())
        })
        .await
    }

    async fn load_client(&self, id: &str) -> Result<Client> {
        self.records.read().await.client(id)
    }

    async fn load_all_clients(&self) -> Result<Vec<Client>> {
        Ok(self.records.read().await.clients.values().cloned().collect())
    }

    async fn save_client(&self, client: &Client) -> Result<()> {
        let client = client.clone();
        self.commit(move |records| {
            records.clients.insert(client.id.clone(), client);
            Ok(())
        })
        .await
    }

    async fn delete_client(&self, id: &str) -> Result<()> {
        self.commit(|records| {
            records
                .clients
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| Error::NotFound(format!("client {}", id)))
        })
        .await
    }
}

/// In-memory store. Records are lost when it is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Records) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }
}

impl Store for MemoryStore {
    async fn load_server(&self) -> Result<Option<Server>> {
        Ok(self.records.read().await.server.clone())
    }

    async fn save_server(&self, server: &Server) -> Result<()> {
        self.records.write().await.server = Some(server.clone());
        Ok(())
    }

    async fn load_client(&self, id: &str) -> Result<Client> {
        self.records.read().await.client(id)
    }

    async fn load_all_clients(&self) -> Result<Vec<Client>> {
        Ok(self.records.read().await.clients.values().cloned().collect())
    }

    async fn save_client(&self, client: &Client) -> Result<()> {
        self.records
            .write()
            .await
            .clients
            .insert(client.id.clone(), client.clone());
        Ok(())
    }

    async fn delete_client(&self, id: &str) -> Result<()> {
        self.records
            .write()
            .await
            .clients
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("client {}", id)))
    }
}
