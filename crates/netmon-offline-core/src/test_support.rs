//! Test doubles for the worker's seams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::cache::{CacheStorage, MemoryStorage};
use crate::clients::Clients;
use crate::error::{OfflineError, Result};
use crate::http::{Request, RequestKey, Response};
use crate::network::Network;
use crate::notify::{Notification, NotificationId, Notifier};

pub const ORIGIN: &str = "http://127.0.0.1:5000/";

pub fn url(path: &str) -> url::Url {
    url::Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

/// Network answering from a fixed route table, switchable offline.
pub struct ScriptedNetwork {
    online: AtomicBool,
    routes: Mutex<HashMap<String, Response>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            routes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn route(&self, path: &str, response: Response) {
        self.routes.lock().unwrap().insert(path.to_string(), response);
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        self.requests
            .lock()
            .unwrap()
            .push(format!("{} {}", request.method, request.url.path()));
        if !self.online.load(Ordering::SeqCst) {
            return Err(OfflineError::Unreachable("network disabled".to_string()));
        }
        let route = self.routes.lock().unwrap().get(request.url.path()).cloned();
        Ok(route.unwrap_or_else(|| Response::text(StatusCode::NOT_FOUND, "not found")))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    fail: bool,
    shown: Mutex<Vec<Notification>>,
    closed: Mutex<Vec<NotificationId>>,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn shown(&self) -> Vec<Notification> {
        self.shown.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<NotificationId> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn show(&self, notification: &Notification) -> Result<()> {
        if self.fail {
            return Err(OfflineError::InvalidRequest("notifications blocked".to_string()));
        }
        self.shown.lock().unwrap().push(notification.clone());
        Ok(())
    }

    async fn close(&self, notification: &Notification) -> Result<()> {
        self.closed.lock().unwrap().push(notification.id);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingClients {
    fail_claim: bool,
    claims: AtomicUsize,
    opened: Mutex<Vec<String>>,
}

impl RecordingClients {
    pub fn failing_claim() -> Self {
        Self {
            fail_claim: true,
            ..Default::default()
        }
    }

    pub fn claims(&self) -> usize {
        self.claims.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clients for RecordingClients {
    async fn claim(&self) -> Result<()> {
        if self.fail_claim {
            return Err(OfflineError::InvalidRequest("claim refused".to_string()));
        }
        self.claims.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<()> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// Memory store whose `delete` fails for one version name.
pub struct StubbornStorage {
    inner: MemoryStorage,
    undeletable: String,
}

impl StubbornStorage {
    pub fn new(undeletable: &str) -> Self {
        Self {
            inner: MemoryStorage::new(),
            undeletable: undeletable.to_string(),
        }
    }
}

#[async_trait]
impl CacheStorage for StubbornStorage {
    async fn open(&self, name: &str) -> Result<()> {
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> Result<bool> {
        self.inner.has(name).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        if name == self.undeletable {
            return Err(OfflineError::Cache(format!("{} is locked", name)));
        }
        self.inner.delete(name).await
    }

    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()> {
        self.inner.put(name, key, response).await
    }

    async fn match_request(&self, name: &str, key: &RequestKey) -> Result<Option<Response>> {
        self.inner.match_request(name, key).await
    }

    async fn entry_keys(&self, name: &str) -> Result<Vec<RequestKey>> {
        self.inner.entry_keys(name).await
    }

    async fn mark_activated(&self, name: &str) -> Result<()> {
        self.inner.mark_activated(name).await
    }

    async fn activated(&self) -> Result<Option<String>> {
        self.inner.activated().await
    }
}

/// Memory store whose reads always fail. Writes still land.
#[derive(Default)]
pub struct UnreadableStorage {
    inner: MemoryStorage,
}

impl UnreadableStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryStorage {
        &self.inner
    }
}

#[async_trait]
impl CacheStorage for UnreadableStorage {
    async fn open(&self, name: &str) -> Result<()> {
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> Result<bool> {
        self.inner.has(name).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        self.inner.delete(name).await
    }

    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()> {
        self.inner.put(name, key, response).await
    }

    async fn match_request(&self, _name: &str, key: &RequestKey) -> Result<Option<Response>> {
        Err(OfflineError::Cache(format!("entry {} is corrupt", key)))
    }

    async fn entry_keys(&self, name: &str) -> Result<Vec<RequestKey>> {
        self.inner.entry_keys(name).await
    }

    async fn mark_activated(&self, name: &str) -> Result<()> {
        self.inner.mark_activated(name).await
    }

    async fn activated(&self) -> Result<Option<String>> {
        self.inner.activated().await
    }
}
