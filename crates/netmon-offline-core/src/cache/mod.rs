//! Versioned cache store.
//!
//! A store holds named cache versions; each version maps a `RequestKey` to a
//! stored response snapshot. Two backends are provided:
//! - `MemoryStorage`: in-process, used by tests and short-lived hosts
//! - `DiskStorage`: persistent, survives restarts of the host
//!
//! The store also remembers which version was last activated, so a new
//! host can tell an activated version from one that is only installed.
//!
//! Only GET-derived entries are ever stored. Writes are last-write-wins per
//! key with no locking across concurrent writers.

pub mod disk;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{OfflineError, Result};
use crate::http::{RequestKey, Response};

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

/// Backend for named cache versions.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the named version if it does not exist yet.
    async fn open(&self, name: &str) -> Result<()>;

    async fn has(&self, name: &str) -> Result<bool>;

    /// Names of every stored version.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Remove a version with all of its entries. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Store a response under `key`, replacing any previous entry.
    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()>;

    async fn match_request(&self, name: &str, key: &RequestKey) -> Result<Option<Response>>;

    /// Keys stored in a version, empty if the version does not exist.
    async fn entry_keys(&self, name: &str) -> Result<Vec<RequestKey>>;

    /// Record `name` as the version that last completed activation.
    async fn mark_activated(&self, name: &str) -> Result<()>;

    /// The version recorded by `mark_activated`, if any.
    async fn activated(&self) -> Result<Option<String>>;
}

/// Reject keys the store must never hold.
pub(crate) fn ensure_storable(key: &RequestKey) -> Result<()> {
    if key.is_get() {
        Ok(())
    } else {
        Err(OfflineError::Cache(format!("refusing to store non-GET entry {}", key)))
    }
}

/// Handle to one opened cache version.
#[derive(Clone)]
pub struct Cache {
    storage: Arc<dyn CacheStorage>,
    name: String,
}

impl Cache {
    /// Open (creating if absent) the version called `name`.
    pub async fn open(storage: Arc<dyn CacheStorage>, name: &str) -> Result<Self> {
        storage.open(name).await?;
        Ok(Self {
            storage,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn put(&self, key: &RequestKey, response: &Response) -> Result<()> {
        self.storage.put(&self.name, key, response).await
    }

    pub async fn match_request(&self, key: &RequestKey) -> Result<Option<Response>> {
        self.storage.match_request(&self.name, key).await
    }

    pub async fn keys(&self) -> Result<Vec<RequestKey>> {
        self.storage.entry_keys(&self.name).await
    }
}
