use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::{ensure_storable, CacheStorage};
use crate::error::Result;
use crate::http::{RequestKey, Response};

#[derive(Debug, Clone)]
struct StoredEntry {
    response: Response,
    cached_at: DateTime<Utc>,
}

/// In-process cache store. Contents are lost when the value is dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    versions: RwLock<HashMap<String, HashMap<RequestKey, StoredEntry>>>,
    activated: RwLock<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<()> {
        self.versions
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.versions.read().await.contains_key(name))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.versions.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.versions.write().await.remove(name).is_some())
    }

    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()> {
        ensure_storable(key)?;
        let entry = StoredEntry {
            response: response.clone(),
            cached_at: Utc::now(),
        };
        self.versions
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .insert(key.clone(), entry);
        Ok(())
    }

    async fn match_request(&self, name: &str, key: &RequestKey) -> Result<Option<Response>> {
        let versions = self.versions.read().await;
        let entry = versions.get(name).and_then(|entries| entries.get(key));
        if let Some(entry) = entry {
            debug!(cache = name, key = %key, cached_at = %entry.cached_at, "Memory cache hit");
        }
        Ok(entry.map(|e| e.response.clone()))
    }

    async fn entry_keys(&self, name: &str) -> Result<Vec<RequestKey>> {
        let versions = self.versions.read().await;
        let mut keys: Vec<RequestKey> = versions
            .get(name)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    async fn mark_activated(&self, name: &str) -> Result<()> {
        *self.activated.write().await = Some(name.to_string());
        Ok(())
    }

    async fn activated(&self) -> Result<Option<String>> {
        Ok(self.activated.read().await.clone())
    }
}
